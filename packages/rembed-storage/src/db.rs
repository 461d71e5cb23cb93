use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{Error, Result, schema};

const SCHEMA_LOCK_ID: i64 = 7_120_115;

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &rembed_config::Postgres) -> Result<Self> {
		let pool = PgPoolOptions::new()
			.max_connections(cfg.pool_max_conns)
			.acquire_timeout(Duration::from_secs(10))
			.connect(&cfg.dsn)
			.await?;

		Ok(Self { pool })
	}

	/// Fails with [`Error::MissingExtension`] when pgvector is not installed on the server.
	pub async fn ensure_schema(&self) -> Result<()> {
		let available: bool = sqlx::query_scalar(
			"SELECT EXISTS (SELECT 1 FROM pg_available_extensions WHERE name = 'vector')",
		)
		.fetch_one(&self.pool)
		.await?;

		if !available {
			return Err(Error::MissingExtension("vector".to_string()));
		}

		let sql = schema::render_schema();
		// Advisory locks are held per connection. Use a single transaction so the lock is scoped to
		// one connection and automatically released when the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(SCHEMA_LOCK_ID).execute(&mut *tx).await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}
