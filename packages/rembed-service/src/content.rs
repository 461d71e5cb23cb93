use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shortest extracted text worth embedding, in characters.
pub const MIN_TEXT_CHARS: usize = 3;
/// Cap on the serialized-content fallback, in characters.
pub const SERIALIZED_TEXT_CHARS: usize = 500;

/// Structured memory payload. Known text fields are lifted out; everything else rides in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContent {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl MemoryContent {
	/// Lenient decode of a stored `content` column. Objects whose known fields are not strings keep
	/// every key in `extra`; a bare string becomes `text`; any other value is kept under `value`.
	pub fn from_value(value: Value) -> Self {
		match value {
			Value::Object(map) => serde_json::from_value(Value::Object(map.clone()))
				.unwrap_or_else(|_| Self { extra: map, ..Self::default() }),
			Value::String(text) => Self { text: Some(text), ..Self::default() },
			Value::Null => Self::default(),
			other => {
				let mut extra = Map::new();

				extra.insert("value".to_string(), other);

				Self { extra, ..Self::default() }
			},
		}
	}

	pub fn to_value(&self) -> Value {
		serde_json::to_value(self).unwrap_or(Value::Null)
	}

	/// Picks the text to embed: `text`, then `message`, then `title` with `description`, then
	/// `description`, then the serialized content capped at [`SERIALIZED_TEXT_CHARS`]. Returns
	/// `None` when the chosen text is shorter than [`MIN_TEXT_CHARS`] after trimming.
	pub fn extract_text(&self) -> Option<String> {
		let candidate = if let Some(text) = non_blank(&self.text) {
			text.to_string()
		} else if let Some(message) = non_blank(&self.message) {
			message.to_string()
		} else if let (Some(title), Some(description)) =
			(non_blank(&self.title), non_blank(&self.description))
		{
			format!("{title} {description}")
		} else if let Some(description) = non_blank(&self.description) {
			description.to_string()
		} else {
			self.serialized_fallback()?
		};
		let trimmed = candidate.trim();

		if trimmed.chars().count() < MIN_TEXT_CHARS {
			return None;
		}

		Some(trimmed.to_string())
	}

	fn serialized_fallback(&self) -> Option<String> {
		if self.is_empty() {
			return None;
		}

		// Going through `Value` sorts keys, so equal content always yields the same text.
		let serialized = serde_json::to_string(&self.to_value()).ok()?;

		Some(serialized.chars().take(SERIALIZED_TEXT_CHARS).collect())
	}

	fn is_empty(&self) -> bool {
		self.text.is_none()
			&& self.message.is_none()
			&& self.title.is_none()
			&& self.description.is_none()
			&& self.extra.is_empty()
	}
}

fn non_blank(field: &Option<String>) -> Option<&str> {
	field.as_deref().map(str::trim).filter(|value| !value.is_empty())
}
