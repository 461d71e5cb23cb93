use std::{future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use uuid::Uuid;

use crate::{
	CircuitBreaker, Embedder, Error, MemoryStore, Result, ScoredMemory,
	breaker::{VECTOR_SEARCH, VECTOR_WRITE},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
	Vector,
	/// Newest memories in the room, served when vector search is unavailable.
	Recent,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub mode: SearchMode,
	pub items: Vec<ScoredMemory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
	Written,
	/// The write was refused and the stored embedding was cleared for the next reconciliation.
	Cleared,
	/// No embedding could be produced; the stored embedding is untouched.
	Deferred,
}

/// Read and write path used while the system is live. Shares breakers and the embedding cache
/// with the reconciler.
pub struct MemoryService {
	store: Arc<dyn MemoryStore>,
	embedder: Arc<Embedder>,
	search_breaker: Arc<CircuitBreaker>,
	write_breaker: Arc<CircuitBreaker>,
	/// Bounds the fallback store calls, which run outside either breaker.
	store_timeout: Duration,
}
impl MemoryService {
	pub fn new(
		store: Arc<dyn MemoryStore>,
		embedder: Arc<Embedder>,
		search_breaker: Arc<CircuitBreaker>,
		write_breaker: Arc<CircuitBreaker>,
		store_timeout: Duration,
	) -> Self {
		Self { store, embedder, search_breaker, write_breaker, store_timeout }
	}

	/// A target-width embedding for `text`, or `None` when embeddings are disabled, the provider
	/// is unavailable, or it answers with another width.
	pub async fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
		match self.embedder.embed(text).await {
			Ok(vector) if vector.len() == self.embedder.target_dim() as usize => Some(vector),
			Ok(vector) => {
				tracing::warn!(
					returned_dim = vector.len(),
					target_dim = self.embedder.target_dim(),
					"Provider returned the wrong width."
				);

				None
			},
			Err(err) => {
				tracing::debug!(error = %err, "Embedding unavailable.");

				None
			},
		}
	}

	/// Similarity search within a room. Falls back to the newest memories when the query cannot
	/// be embedded or vector search fails for any reason.
	pub async fn search(&self, room_id: Uuid, query: &str, limit: u32) -> Result<SearchResponse> {
		let Some(embedding) = self.embed_text(query).await else {
			return self.recent(room_id, limit).await;
		};

		self.search_breaker
			.call_or_else(
				|| async {
					let items =
						self.store.search_by_embedding(room_id, &embedding, limit).await?;

					Ok(SearchResponse { mode: SearchMode::Vector, items })
				},
				|| self.recent(room_id, limit),
			)
			.await
	}

	/// Embeds `text` and stores it for `memory_id`. A refused write clears the embedding instead.
	pub async fn store_embedding(&self, memory_id: Uuid, text: &str) -> Result<WriteOutcome> {
		let Some(embedding) = self.embed_text(text).await else {
			return Ok(WriteOutcome::Deferred);
		};

		self.write_breaker
			.call_or_else(
				|| async {
					self.store.update_embedding(memory_id, &embedding).await?;

					Ok(WriteOutcome::Written)
				},
				|| async {
					let ids = [memory_id];

					self.bounded(VECTOR_WRITE, self.store.clear_embeddings(&ids)).await?;

					Ok(WriteOutcome::Cleared)
				},
			)
			.await
	}

	async fn recent(&self, room_id: Uuid, limit: u32) -> Result<SearchResponse> {
		let records =
			self.bounded(VECTOR_SEARCH, self.store.fetch_recent_by_room(room_id, limit)).await?;

		Ok(SearchResponse {
			mode: SearchMode::Recent,
			items: records.into_iter().map(ScoredMemory::from).collect(),
		})
	}

	async fn bounded<T, F>(&self, resource: &'static str, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let Ok(result) = tokio::time::timeout(self.store_timeout, fut).await else {
			let timeout_ms = u64::try_from(self.store_timeout.as_millis()).unwrap_or(u64::MAX);

			tracing::warn!(resource, timeout_ms, "Fallback store call timed out.");

			return Err(Error::Timeout { resource: resource.to_string(), timeout_ms });
		};

		result
	}
}
