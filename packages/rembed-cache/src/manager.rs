use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::runtime::Handle;

use crate::{CacheAdapter, Error, Result};

pub trait Clock
where
	Self: Send + Sync,
{
	fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

#[derive(Serialize)]
struct EnvelopeRef<'a, V> {
	value: &'a V,
	expires_at: Option<i64>,
}

#[derive(Deserialize)]
struct Envelope<V> {
	value: V,
	expires_at: Option<i64>,
}

/// TTL-aware front for any [`CacheAdapter`].
///
/// Expired entries read as absent and are evicted in the background. Eviction is best-effort; a
/// failed delete is logged and the next read simply tries again.
#[derive(Clone)]
pub struct CacheManager {
	adapter: Arc<dyn CacheAdapter>,
	clock: Arc<dyn Clock>,
}
impl CacheManager {
	pub fn new(adapter: Arc<dyn CacheAdapter>) -> Self {
		Self::with_clock(adapter, Arc::new(SystemClock))
	}

	/// Builds the adapter selected by `[cache] backend` and wraps it.
	pub fn from_config(cfg: &rembed_config::Cache, pool: Option<PgPool>) -> Result<Self> {
		Ok(Self::new(crate::build_adapter(cfg, pool)?))
	}

	pub fn with_clock(adapter: Arc<dyn CacheAdapter>, clock: Arc<dyn Clock>) -> Self {
		Self { adapter, clock }
	}

	pub async fn get<V>(&self, key: &str) -> Result<Option<V>>
	where
		V: DeserializeOwned,
	{
		let Some(raw) = self.adapter.get(key).await? else {
			return Ok(None);
		};
		let envelope: Envelope<V> = match serde_json::from_str(&raw) {
			Ok(envelope) => envelope,
			Err(err) => {
				tracing::warn!(error = %err, cache_key = key, "Discarding undecodable cache entry.");

				self.evict(key);

				return Ok(None);
			},
		};

		if let Some(expires_at) = envelope.expires_at
			&& expires_at <= unix_millis(self.clock.now())
		{
			self.evict(key);

			return Ok(None);
		}

		Ok(Some(envelope.value))
	}

	/// A missing or zero `ttl` stores the value without expiry.
	pub async fn set<V>(&self, key: &str, value: &V, ttl: Option<Duration>) -> Result<()>
	where
		V: Serialize,
	{
		let expires_at = ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| {
			let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

			unix_millis(self.clock.now()).saturating_add(ttl_ms)
		});
		let raw = serde_json::to_string(&EnvelopeRef { value, expires_at })
			.map_err(|err| Error::Encode { message: err.to_string() })?;

		self.adapter.set(key, raw).await
	}

	pub async fn delete(&self, key: &str) -> Result<()> {
		self.adapter.delete(key).await
	}

	fn evict(&self, key: &str) {
		let Ok(handle) = Handle::try_current() else {
			tracing::debug!(cache_key = key, "No runtime available for cache eviction.");

			return;
		};
		let adapter = self.adapter.clone();
		let key = key.to_string();

		handle.spawn(async move {
			if let Err(err) = adapter.delete(&key).await {
				tracing::debug!(error = %err, cache_key = key.as_str(), "Cache eviction failed.");
			}
		});
	}
}

fn unix_millis(ts: OffsetDateTime) -> i64 {
	i64::try_from(ts.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
