use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{BoxFuture, MemoryContent, Result};
use rembed_storage::{
	db::Db,
	models::{EmbeddingRow, MemoryRow, ScoredMemoryRow},
	queries,
};

/// A memory whose stored embedding is present.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
	pub id: Uuid,
	pub content: MemoryContent,
	pub embedding: Vec<f32>,
}
impl EmbeddingRecord {
	pub fn dimension(&self) -> u32 {
		u32::try_from(self.embedding.len()).unwrap_or(u32::MAX)
	}
}
impl From<EmbeddingRow> for EmbeddingRecord {
	fn from(row: EmbeddingRow) -> Self {
		Self { id: row.id, content: MemoryContent::from_value(row.content), embedding: row.vec }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryRecord {
	pub id: Uuid,
	pub agent_id: String,
	pub room_id: Uuid,
	pub content: MemoryContent,
	#[serde(serialize_with = "serialize_rfc3339")]
	pub created_at: OffsetDateTime,
}
impl From<MemoryRow> for MemoryRecord {
	fn from(row: MemoryRow) -> Self {
		Self {
			id: row.id,
			agent_id: row.agent_id,
			room_id: row.room_id,
			content: MemoryContent::from_value(row.content),
			created_at: row.created_at,
		}
	}
}

/// A search hit. `similarity` is absent for results served by the recency fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMemory {
	#[serde(flatten)]
	pub memory: MemoryRecord,
	pub similarity: Option<f32>,
}
impl From<ScoredMemoryRow> for ScoredMemory {
	fn from(row: ScoredMemoryRow) -> Self {
		Self {
			memory: MemoryRecord {
				id: row.id,
				agent_id: row.agent_id,
				room_id: row.room_id,
				content: MemoryContent::from_value(row.content),
				created_at: row.created_at,
			},
			similarity: Some(row.similarity),
		}
	}
}
impl From<MemoryRecord> for ScoredMemory {
	fn from(memory: MemoryRecord) -> Self {
		Self { memory, similarity: None }
	}
}

/// The vector-capable memory store. Implementations surface store failures through
/// [`crate::Error`], keeping connectivity, dimension, and unsupported-function errors apart.
pub trait MemoryStore
where
	Self: Send + Sync,
{
	/// Counts present embeddings whose width is not `target_dim`, keyed by width and limited to
	/// `only_dims` when it is non-empty. Fails with [`crate::Error::Unsupported`] when the server
	/// cannot compute widths.
	fn count_mismatched<'a>(
		&'a self,
		target_dim: u32,
		only_dims: &'a [u32],
	) -> BoxFuture<'a, Result<BTreeMap<u32, u64>>>;

	/// Up to `limit` of the records [`MemoryStore::count_mismatched`] counts, ordered by id and
	/// starting strictly after `after`.
	fn find_mismatched<'a>(
		&'a self,
		target_dim: u32,
		only_dims: &'a [u32],
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<EmbeddingRecord>>>;

	/// Up to `limit` present embeddings, any width.
	fn sample_embeddings(&self, limit: u32) -> BoxFuture<'_, Result<Vec<EmbeddingRecord>>>;

	/// Sets each listed embedding to absent and returns how many rows changed.
	fn clear_embeddings<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<u64>>;

	fn update_embedding<'a>(&'a self, id: Uuid, embedding: &'a [f32]) -> BoxFuture<'a, Result<()>>;

	fn fetch_recent_by_room(
		&self,
		room_id: Uuid,
		limit: u32,
	) -> BoxFuture<'_, Result<Vec<MemoryRecord>>>;

	fn search_by_embedding<'a>(
		&'a self,
		room_id: Uuid,
		embedding: &'a [f32],
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ScoredMemory>>>;
}

fn serialize_rfc3339<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;

	serializer.serialize_str(&formatted)
}

/// [`MemoryStore`] over Postgres with pgvector.
pub struct PgMemoryStore {
	db: Db,
}
impl PgMemoryStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	pub fn db(&self) -> &Db {
		&self.db
	}
}

impl MemoryStore for PgMemoryStore {
	fn count_mismatched<'a>(
		&'a self,
		target_dim: u32,
		only_dims: &'a [u32],
	) -> BoxFuture<'a, Result<BTreeMap<u32, u64>>> {
		Box::pin(async move {
			let rows =
				queries::count_mismatched_embeddings(&self.db.pool, target_dim, only_dims).await?;

			Ok(rows
				.into_iter()
				.map(|row| {
					(
						u32::try_from(row.dim).unwrap_or_default(),
						u64::try_from(row.count).unwrap_or_default(),
					)
				})
				.collect())
		})
	}

	fn find_mismatched<'a>(
		&'a self,
		target_dim: u32,
		only_dims: &'a [u32],
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<EmbeddingRecord>>> {
		Box::pin(async move {
			let rows = queries::select_mismatched_embeddings(
				&self.db.pool,
				target_dim,
				only_dims,
				after,
				limit,
			)
			.await?;

			Ok(rows.into_iter().map(EmbeddingRecord::from).collect())
		})
	}

	fn sample_embeddings(&self, limit: u32) -> BoxFuture<'_, Result<Vec<EmbeddingRecord>>> {
		Box::pin(async move {
			let rows = queries::sample_embeddings(&self.db.pool, limit).await?;

			Ok(rows.into_iter().map(EmbeddingRecord::from).collect())
		})
	}

	fn clear_embeddings<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(queries::clear_embeddings(&self.db.pool, ids).await?) })
	}

	fn update_embedding<'a>(&'a self, id: Uuid, embedding: &'a [f32]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(queries::update_embedding(&self.db.pool, id, embedding).await?) })
	}

	fn fetch_recent_by_room(
		&self,
		room_id: Uuid,
		limit: u32,
	) -> BoxFuture<'_, Result<Vec<MemoryRecord>>> {
		Box::pin(async move {
			let rows = queries::fetch_recent_by_room(&self.db.pool, room_id, limit).await?;

			Ok(rows.into_iter().map(MemoryRecord::from).collect())
		})
	}

	fn search_by_embedding<'a>(
		&'a self,
		room_id: Uuid,
		embedding: &'a [f32],
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ScoredMemory>>> {
		Box::pin(async move {
			let rows =
				queries::search_by_embedding(&self.db.pool, room_id, embedding, limit).await?;

			Ok(rows.into_iter().map(ScoredMemory::from).collect())
		})
	}
}
