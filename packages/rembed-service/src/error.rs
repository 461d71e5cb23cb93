pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Dimension mismatch: {message}")]
	DimensionMismatch { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Embeddings are disabled.")]
	EmbeddingsDisabled,
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Store unreachable: {message}")]
	StoreConnectivity { message: String },
	#[error("Unsupported by store: {message}")]
	Unsupported { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Circuit {resource} is open.")]
	CircuitOpen { resource: String },
	#[error("Call to {resource} timed out after {timeout_ms} ms.")]
	Timeout { resource: String, timeout_ms: u64 },
	#[error("Cache error: {message}")]
	Cache { message: String },
}
impl Error {
	/// Data-quality failures. Breakers resolve these per call and never count them.
	pub fn is_dimension_mismatch(&self) -> bool {
		matches!(self, Self::DimensionMismatch { .. })
	}

	/// Failures that end a reconciliation run instead of a single record.
	pub fn is_store_connectivity(&self) -> bool {
		matches!(self, Self::StoreConnectivity { .. })
	}
}
impl From<rembed_storage::Error> for Error {
	fn from(err: rembed_storage::Error) -> Self {
		if err.is_connectivity() {
			return Self::StoreConnectivity { message: err.to_string() };
		}
		if err.is_dimension_mismatch() {
			return Self::DimensionMismatch { message: err.to_string() };
		}
		if err.is_undefined_function() {
			return Self::Unsupported { message: err.to_string() };
		}

		match err {
			rembed_storage::Error::MissingExtension(name) => Self::Configuration {
				message: format!("Postgres extension {name:?} is required."),
			},
			rembed_storage::Error::NotFound(message) => Self::NotFound { message },
			rembed_storage::Error::InvalidArgument(message) => Self::Storage { message },
			rembed_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
		}
	}
}
impl From<rembed_providers::Error> for Error {
	fn from(err: rembed_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
impl From<rembed_cache::Error> for Error {
	fn from(err: rembed_cache::Error) -> Self {
		Self::Cache { message: err.to_string() }
	}
}
