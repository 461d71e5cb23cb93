use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemoryRow {
	pub id: Uuid,
	pub agent_id: String,
	pub room_id: Uuid,
	pub content: Value,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoredMemoryRow {
	pub id: Uuid,
	pub agent_id: String,
	pub room_id: Uuid,
	pub content: Value,
	pub created_at: OffsetDateTime,
	pub similarity: f32,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EmbeddingTextRow {
	pub(crate) id: Uuid,
	pub(crate) content: Value,
	pub(crate) vec_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct DimensionCount {
	pub dim: i32,
	pub count: i64,
}

/// A stored embedding decoded from pgvector text.
#[derive(Debug, Clone)]
pub struct EmbeddingRow {
	pub id: Uuid,
	pub content: Value,
	pub vec: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct NewMemory {
	pub id: Uuid,
	pub agent_id: String,
	pub room_id: Uuid,
	pub content: Value,
	pub embedding: Option<Vec<f32>>,
}
