mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, CacheBackend, CircuitBreaker, Config, EmbeddingProviderConfig, Embeddings, Postgres,
	Providers, Reconcile, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.embeddings.target_dim == 0 {
		return Err(Error::Validation {
			message: "embeddings.target_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.embeddings.target_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match embeddings.target_dim.".to_string(),
		});
	}
	if cfg.embeddings.outdated_dims.contains(&cfg.embeddings.target_dim) {
		return Err(Error::Validation {
			message: "embeddings.outdated_dims must not contain embeddings.target_dim.".to_string(),
		});
	}
	if cfg.embeddings.outdated_dims.contains(&0) {
		return Err(Error::Validation {
			message: "embeddings.outdated_dims entries must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.max_input_chars == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.max_input_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if !cfg.embeddings.disabled && cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty unless embeddings.disabled is true."
				.to_string(),
		});
	}
	if cfg.reconcile.batch_size == 0 {
		return Err(Error::Validation {
			message: "reconcile.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.reconcile.discovery_sample_limit == 0 {
		return Err(Error::Validation {
			message: "reconcile.discovery_sample_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.reconcile.store_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "reconcile.store_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.circuit_breaker.failure_threshold == 0 {
		return Err(Error::Validation {
			message: "circuit_breaker.failure_threshold must be greater than zero.".to_string(),
		});
	}
	if cfg.circuit_breaker.cooldown_ms == 0 {
		return Err(Error::Validation {
			message: "circuit_breaker.cooldown_ms must be greater than zero.".to_string(),
		});
	}

	match cfg.cache.backend {
		CacheBackend::File if cfg.cache.root_dir.as_os_str().is_empty() => {
			return Err(Error::Validation {
				message: "cache.root_dir must be non-empty when cache.backend is file.".to_string(),
			});
		},
		CacheBackend::Store if cfg.cache.agent_id.trim().is_empty() => {
			return Err(Error::Validation {
				message: "cache.agent_id must be non-empty when cache.backend is store."
					.to_string(),
			});
		},
		_ => {},
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.embeddings.outdated_dims.sort_unstable();
	cfg.embeddings.outdated_dims.dedup();

	let agent_id = cfg.cache.agent_id.trim();

	if agent_id.len() != cfg.cache.agent_id.len() {
		cfg.cache.agent_id = agent_id.to_string();
	}
}
