use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub embeddings: Embeddings,
	#[serde(default)]
	pub reconcile: Reconcile,
	#[serde(default)]
	pub circuit_breaker: CircuitBreaker,
	#[serde(default)]
	pub cache: Cache,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	/// Provider inputs are cut to this many characters before the request is built.
	#[serde(default = "default_max_input_chars")]
	pub max_input_chars: usize,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Embeddings {
	pub target_dim: u32,
	/// Widths known to be stale. Empty means every width other than `target_dim` is reconciled.
	#[serde(default)]
	pub outdated_dims: Vec<u32>,
	/// Skip every provider call and serve reads from the non-vector path.
	#[serde(default)]
	pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Reconcile {
	pub batch_size: u32,
	/// Upper bound on rows fetched when the store cannot compute vector widths itself.
	pub discovery_sample_limit: u32,
	pub store_timeout_ms: u64,
	/// Zero-pad widths that neither divide nor exceed the target instead of failing them.
	pub pad_indivisible: bool,
}
impl Default for Reconcile {
	fn default() -> Self {
		Self {
			batch_size: 50,
			discovery_sample_limit: 1_000,
			store_timeout_ms: 10_000,
			pad_indivisible: false,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreaker {
	pub failure_threshold: u32,
	pub cooldown_ms: u64,
}
impl Default for CircuitBreaker {
	fn default() -> Self {
		Self { failure_threshold: 5, cooldown_ms: 60_000 }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
	Memory,
	File,
	Store,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub backend: CacheBackend,
	pub root_dir: PathBuf,
	pub agent_id: String,
	/// Zero keeps cached embeddings until they are deleted explicitly.
	pub embedding_ttl_secs: u64,
}
impl Default for Cache {
	fn default() -> Self {
		Self {
			backend: CacheBackend::Memory,
			root_dir: PathBuf::from(".cache/rembed"),
			agent_id: "default".to_string(),
			embedding_ttl_secs: 86_400,
		}
	}
}

fn default_max_input_chars() -> usize {
	8_000
}
