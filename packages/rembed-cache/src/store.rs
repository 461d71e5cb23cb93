use sqlx::PgPool;

use crate::{BoxFuture, CacheAdapter, Result};

/// Persists `(agent_id, key, value)` rows in the `cache` table.
#[derive(Debug, Clone)]
pub struct StoreAdapter {
	pool: PgPool,
	agent_id: String,
}
impl StoreAdapter {
	pub fn new(pool: PgPool, agent_id: impl Into<String>) -> Self {
		Self { pool, agent_id: agent_id.into() }
	}

	pub fn agent_id(&self) -> &str {
		&self.agent_id
	}

	async fn read(&self, key: &str) -> Result<Option<String>> {
		let value: Option<String> =
			sqlx::query_scalar("SELECT value FROM cache WHERE agent_id = $1 AND key = $2")
				.bind(self.agent_id.as_str())
				.bind(key)
				.fetch_optional(&self.pool)
				.await?;

		Ok(value)
	}

	async fn write(&self, key: &str, value: String) -> Result<()> {
		sqlx::query(
			"\
INSERT INTO cache (agent_id, key, value, created_at)
VALUES ($1, $2, $3, now())
ON CONFLICT (agent_id, key) DO UPDATE
SET
	value = EXCLUDED.value,
	created_at = EXCLUDED.created_at",
		)
		.bind(self.agent_id.as_str())
		.bind(key)
		.bind(value)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<()> {
		sqlx::query("DELETE FROM cache WHERE agent_id = $1 AND key = $2")
			.bind(self.agent_id.as_str())
			.bind(key)
			.execute(&self.pool)
			.await?;

		Ok(())
	}
}
impl CacheAdapter for StoreAdapter {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(self.read(key))
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.write(key, value))
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.remove(key))
	}
}
