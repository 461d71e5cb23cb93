use std::{sync::Arc, time::Duration};

use serde_json::json;

use crate::{CircuitBreaker, EmbeddingProvider, Error, Result};
use rembed_cache::CacheManager;
use rembed_config::EmbeddingProviderConfig;
use rembed_providers::embedding::truncate_input;

/// Single-text embedding behind the provider breaker, with an optional result cache.
///
/// Only vectors at the target width are cached. A provider that returns another width is handed
/// back to the caller unchanged so it can decide what to do with it.
pub struct Embedder {
	provider: Arc<dyn EmbeddingProvider>,
	cfg: EmbeddingProviderConfig,
	breaker: Arc<CircuitBreaker>,
	cache: Option<EmbeddingCache>,
	target_dim: u32,
	disabled: bool,
}
impl Embedder {
	pub fn new(
		provider: Arc<dyn EmbeddingProvider>,
		cfg: EmbeddingProviderConfig,
		embeddings: &rembed_config::Embeddings,
		breaker: Arc<CircuitBreaker>,
	) -> Self {
		Self {
			provider,
			cfg,
			breaker,
			cache: None,
			target_dim: embeddings.target_dim,
			disabled: embeddings.disabled,
		}
	}

	/// A zero or missing `ttl` caches without expiry.
	pub fn with_cache(mut self, manager: CacheManager, ttl: Option<Duration>) -> Self {
		self.cache = Some(EmbeddingCache { manager, ttl });

		self
	}

	pub fn target_dim(&self) -> u32 {
		self.target_dim
	}

	pub fn is_disabled(&self) -> bool {
		self.disabled
	}

	pub fn breaker(&self) -> &CircuitBreaker {
		&self.breaker
	}

	/// Fails with [`Error::EmbeddingsDisabled`] without touching the provider or its breaker when
	/// embeddings are turned off.
	pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		if self.disabled {
			return Err(Error::EmbeddingsDisabled);
		}

		let input = truncate_input(text, self.cfg.max_input_chars);
		let key = cache_key(&self.cfg.model, self.target_dim, input);

		if let Some(hit) = self.cached(&key).await {
			tracing::debug!(cache_key_prefix = &key[..12], "Embedding cache hit.");

			return Ok(hit);
		}

		let texts = vec![input.to_string()];
		let mut vectors = self.breaker.call(|| self.provider.embed(&self.cfg, &texts)).await?;

		if vectors.len() != 1 {
			return Err(Error::Provider {
				message: format!("Expected one embedding, got {}.", vectors.len()),
			});
		}

		let vector = vectors.pop().unwrap_or_default();

		if vector.len() == self.target_dim as usize {
			self.remember(&key, &vector).await;
		}

		Ok(vector)
	}

	async fn cached(&self, key: &str) -> Option<Vec<f32>> {
		let cache = self.cache.as_ref()?;

		match cache.manager.get::<Vec<f32>>(key).await {
			Ok(Some(vector)) if vector.len() == self.target_dim as usize => Some(vector),
			Ok(_) => None,
			Err(err) => {
				tracing::warn!(error = %err, "Embedding cache read failed.");

				None
			},
		}
	}

	async fn remember(&self, key: &str, vector: &[f32]) {
		let Some(cache) = self.cache.as_ref() else {
			return;
		};

		if let Err(err) = cache.manager.set(key, &vector, cache.ttl).await {
			tracing::warn!(error = %err, "Embedding cache write failed.");
		}
	}
}

struct EmbeddingCache {
	manager: CacheManager,
	ttl: Option<Duration>,
}

/// Stable key for one embedding request. Model and width are part of the key so a config change
/// never serves vectors of the old shape.
pub fn cache_key(model: &str, target_dim: u32, text: &str) -> String {
	let payload = json!({ "kind": "embedding", "model": model, "dim": target_dim, "text": text });

	blake3::hash(payload.to_string().as_bytes()).to_hex().to_string()
}
