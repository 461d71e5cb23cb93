//! Embedding reconciliation for agent memory stores.
//!
//! Every provider and store call runs behind a [`CircuitBreaker`]. [`Reconciler`] repairs rows
//! whose embedding width disagrees with the configured target, and [`MemoryService`] keeps the
//! live read and write paths answering while a dependency is down.

pub mod breaker;
pub mod content;
pub mod convert;
pub mod embedder;
pub mod memory;
pub mod reconcile;
pub mod store;

mod error;

pub use breaker::{BreakerSettings, BreakerSnapshot, Breakers, CircuitBreaker, CircuitState};
pub use content::MemoryContent;
pub use embedder::Embedder;
pub use error::{Error, Result};
pub use memory::{MemoryService, SearchMode, SearchResponse, WriteOutcome};
pub use reconcile::{CancelFlag, Discovery, ReconcileSettings, Reconciler, RunFailure, RunReport};
pub use store::{EmbeddingRecord, MemoryRecord, MemoryStore, PgMemoryStore, ScoredMemory};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use rembed_cache::CacheManager;
use rembed_config::{Config, EmbeddingProviderConfig};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	/// Returns one vector per input, in input order.
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// OpenAI-compatible HTTP embeddings.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpEmbeddingProvider;

impl EmbeddingProvider for HttpEmbeddingProvider {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(rembed_providers::embedding::embed(cfg, texts).await?) })
	}
}

/// Shared wiring for the reconciler and the live memory path. Both views hand out the same
/// breakers, so an outage seen by one is seen by the other.
pub struct RembedService {
	pub cfg: Config,
	pub store: Arc<dyn MemoryStore>,
	pub embedder: Arc<Embedder>,
	pub breakers: Breakers,
}
impl RembedService {
	pub fn new(
		cfg: Config,
		store: Arc<dyn MemoryStore>,
		provider: Arc<dyn EmbeddingProvider>,
		cache: Option<CacheManager>,
	) -> Self {
		let breakers = Breakers::from_config(&cfg);
		let mut embedder = Embedder::new(
			provider,
			cfg.providers.embedding.clone(),
			&cfg.embeddings,
			breakers.provider.clone(),
		);

		if let Some(cache) = cache {
			let ttl = Duration::from_secs(cfg.cache.embedding_ttl_secs);

			embedder = embedder.with_cache(cache, Some(ttl));
		}

		Self { cfg, store, embedder: Arc::new(embedder), breakers }
	}

	pub fn reconciler(&self) -> Reconciler {
		Reconciler::new(
			self.store.clone(),
			self.embedder.clone(),
			self.breakers.vector_search.clone(),
			self.breakers.vector_write.clone(),
			ReconcileSettings::from_config(&self.cfg),
		)
	}

	pub fn memory(&self) -> MemoryService {
		MemoryService::new(
			self.store.clone(),
			self.embedder.clone(),
			self.breakers.vector_search.clone(),
			self.breakers.vector_write.clone(),
			Duration::from_millis(self.cfg.reconcile.store_timeout_ms),
		)
	}
}
