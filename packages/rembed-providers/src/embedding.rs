use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Client for OpenAI-compatible `/embeddings` endpoints. Reuses one connection pool per config.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
	client: Client,
	cfg: rembed_config::EmbeddingProviderConfig,
}
impl EmbeddingClient {
	pub fn new(cfg: rembed_config::EmbeddingProviderConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { client, cfg })
	}

	pub fn config(&self) -> &rembed_config::EmbeddingProviderConfig {
		&self.cfg
	}

	pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let inputs: Vec<String> = texts
			.iter()
			.map(|text| truncate_input(text, self.cfg.max_input_chars).to_string())
			.collect();
		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body = serde_json::json!({
			"model": self.cfg.model,
			"input": inputs,
			"dimensions": self.cfg.dimensions,
		});
		let res = self
			.client
			.post(url)
			.headers(crate::auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;
		let vectors = parse_embedding_response(json)?;

		if vectors.len() != texts.len() {
			return Err(Error::InvalidResponse {
				message: format!(
					"Embedding response returned {} vectors for {} inputs.",
					vectors.len(),
					texts.len()
				),
			});
		}

		Ok(vectors)
	}
}

pub async fn embed(
	cfg: &rembed_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	EmbeddingClient::new(cfg.clone())?.embed(texts).await
}

/// Cuts `text` to at most `max_chars` characters without splitting a code point.
pub fn truncate_input(text: &str, max_chars: usize) -> &str {
	match text.char_indices().nth(max_chars) {
		Some((idx, _)) => &text[..idx],
		None => text,
	}
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse {
				message: "Embedding item missing embedding array.".to_string(),
			}
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
