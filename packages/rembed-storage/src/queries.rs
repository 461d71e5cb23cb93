use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
	Error, Result,
	models::{
		DimensionCount, EmbeddingRow, EmbeddingTextRow, MemoryRow, NewMemory, ScoredMemoryRow,
	},
	vector,
};

pub async fn insert_memory(pool: &PgPool, memory: &NewMemory) -> Result<()> {
	let vec_text = memory.embedding.as_deref().map(vector::format_vector_text);

	sqlx::query(
		"\
INSERT INTO memories (id, agent_id, room_id, content, embedding)
VALUES ($1, $2, $3, $4, $5::text::vector)",
	)
	.bind(memory.id)
	.bind(memory.agent_id.as_str())
	.bind(memory.room_id)
	.bind(&memory.content)
	.bind(vec_text)
	.execute(pool)
	.await?;

	Ok(())
}

/// Per-width counts of rows whose stored width differs from `target_dim`, optionally limited to
/// `only_dims`.
pub async fn count_mismatched_embeddings(
	pool: &PgPool,
	target_dim: u32,
	only_dims: &[u32],
) -> Result<Vec<DimensionCount>> {
	let target_dim = to_i32(target_dim, "target_dim")?;
	let only_dims = to_i32_dims(only_dims)?;
	let rows = sqlx::query_as(
		"\
SELECT
	vector_dims(embedding) AS dim,
	count(*) AS count
FROM memories
WHERE embedding IS NOT NULL
	AND vector_dims(embedding) <> $1
	AND (cardinality($2::int4[]) = 0 OR vector_dims(embedding) = ANY($2::int4[]))
GROUP BY vector_dims(embedding)
ORDER BY vector_dims(embedding) ASC",
	)
	.bind(target_dim)
	.bind(only_dims)
	.fetch_all(pool)
	.await?;

	Ok(rows)
}

/// One keyset page of mismatched rows, ordered by id and starting after `after`.
///
/// Repaired or cleared rows stop matching, and rows left behind keep ids at or below the last
/// page boundary, so walking pages with the last id seen never revisits a row.
pub async fn select_mismatched_embeddings(
	pool: &PgPool,
	target_dim: u32,
	only_dims: &[u32],
	after: Option<Uuid>,
	limit: u32,
) -> Result<Vec<EmbeddingRow>> {
	let target_dim = to_i32(target_dim, "target_dim")?;
	let only_dims = to_i32_dims(only_dims)?;
	let rows: Vec<EmbeddingTextRow> = sqlx::query_as(
		"\
SELECT
	id,
	content,
	embedding::text AS vec_text
FROM memories
WHERE embedding IS NOT NULL
	AND vector_dims(embedding) <> $1
	AND (cardinality($2::int4[]) = 0 OR vector_dims(embedding) = ANY($2::int4[]))
	AND ($3::uuid IS NULL OR id > $3)
ORDER BY id ASC
LIMIT $4",
	)
	.bind(target_dim)
	.bind(only_dims)
	.bind(after)
	.bind(i64::from(limit))
	.fetch_all(pool)
	.await?;

	decode_embedding_rows(rows)
}

/// Bounded scan of stored embeddings for servers that cannot compute widths in SQL.
pub async fn sample_embeddings(pool: &PgPool, limit: u32) -> Result<Vec<EmbeddingRow>> {
	let rows: Vec<EmbeddingTextRow> = sqlx::query_as(
		"\
SELECT
	id,
	content,
	embedding::text AS vec_text
FROM memories
WHERE embedding IS NOT NULL
ORDER BY created_at ASC, id ASC
LIMIT $1",
	)
	.bind(i64::from(limit))
	.fetch_all(pool)
	.await?;

	decode_embedding_rows(rows)
}

pub async fn clear_embeddings(pool: &PgPool, ids: &[Uuid]) -> Result<u64> {
	clear_embeddings_exec(pool, ids).await
}

pub async fn update_embedding(pool: &PgPool, id: Uuid, embedding: &[f32]) -> Result<()> {
	let vec_text = vector::format_vector_text(embedding);
	let result = sqlx::query(
		"\
UPDATE memories
SET
	embedding = $1::text::vector,
	updated_at = now()
WHERE id = $2",
	)
	.bind(vec_text)
	.bind(id)
	.execute(pool)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("Memory {id} does not exist.")));
	}

	Ok(())
}

/// Non-vector read path: newest memories in a room.
pub async fn fetch_recent_by_room(
	pool: &PgPool,
	room_id: Uuid,
	limit: u32,
) -> Result<Vec<MemoryRow>> {
	let rows = sqlx::query_as(
		"\
SELECT
	id,
	agent_id,
	room_id,
	content,
	created_at
FROM memories
WHERE room_id = $1
ORDER BY created_at DESC, id DESC
LIMIT $2",
	)
	.bind(room_id)
	.bind(i64::from(limit))
	.fetch_all(pool)
	.await?;

	Ok(rows)
}

/// Cosine similarity search within a room. pgvector rejects the query outright when any compared
/// row has a different width than `embedding`.
pub async fn search_by_embedding(
	pool: &PgPool,
	room_id: Uuid,
	embedding: &[f32],
	limit: u32,
) -> Result<Vec<ScoredMemoryRow>> {
	let vec_text = vector::format_vector_text(embedding);
	let rows = sqlx::query_as(
		"\
SELECT
	id,
	agent_id,
	room_id,
	content,
	created_at,
	(1 - (embedding <=> $2::text::vector))::real AS similarity
FROM memories
WHERE room_id = $1 AND embedding IS NOT NULL
ORDER BY embedding <=> $2::text::vector ASC
LIMIT $3",
	)
	.bind(room_id)
	.bind(vec_text)
	.bind(i64::from(limit))
	.fetch_all(pool)
	.await?;

	Ok(rows)
}

async fn clear_embeddings_exec<'e, E>(executor: E, ids: &[Uuid]) -> Result<u64>
where
	E: Executor<'e, Database = Postgres>,
{
	if ids.is_empty() {
		return Ok(0);
	}

	let result = sqlx::query(
		"\
UPDATE memories
SET
	embedding = NULL,
	updated_at = now()
WHERE id = ANY($1)",
	)
	.bind(ids)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

fn decode_embedding_rows(rows: Vec<EmbeddingTextRow>) -> Result<Vec<EmbeddingRow>> {
	rows.into_iter()
		.map(|row| {
			let vec = vector::parse_vector_text(&row.vec_text)?;

			Ok(EmbeddingRow { id: row.id, content: row.content, vec })
		})
		.collect()
}

fn to_i32(value: u32, label: &str) -> Result<i32> {
	i32::try_from(value)
		.map_err(|_| Error::InvalidArgument(format!("{label} value {value} exceeds supported range.")))
}

fn to_i32_dims(dims: &[u32]) -> Result<Vec<i32>> {
	dims.iter().map(|dim| to_i32(*dim, "outdated_dims")).collect()
}
