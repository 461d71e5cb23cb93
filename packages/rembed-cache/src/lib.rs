//! Key-value caching with pluggable backends.
//!
//! Adapters only move strings in and out of their medium. Expiry lives in [`CacheManager`], which
//! wraps every value in a small JSON envelope before handing it to the adapter.

pub mod file;
pub mod manager;
pub mod memory;
pub mod store;

mod error;

pub use error::{Error, Result};
pub use file::FileAdapter;
pub use manager::{CacheManager, Clock, SystemClock};
pub use memory::MemoryAdapter;
pub use store::StoreAdapter;

use std::{future::Future, pin::Pin, sync::Arc};

use sqlx::PgPool;

use rembed_config::CacheBackend;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait CacheAdapter
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

	fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>>;

	/// Removing a missing key succeeds.
	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Builds the adapter selected by `[cache] backend`. The store backend reuses the caller's pool.
pub fn build_adapter(
	cfg: &rembed_config::Cache,
	pool: Option<PgPool>,
) -> Result<Arc<dyn CacheAdapter>> {
	match cfg.backend {
		CacheBackend::Memory => Ok(Arc::new(MemoryAdapter::new())),
		CacheBackend::File => Ok(Arc::new(FileAdapter::new(cfg.root_dir.clone()))),
		CacheBackend::Store => {
			let pool = pool.ok_or_else(|| Error::InvalidConfig {
				message: "cache.backend = store requires a Postgres pool.".to_string(),
			})?;

			Ok(Arc::new(StoreAdapter::new(pool, cfg.agent_id.clone())))
		},
	}
}
