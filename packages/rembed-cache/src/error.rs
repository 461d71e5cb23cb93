pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cache file operation failed at {path:?}.")]
	Io { path: std::path::PathBuf, source: std::io::Error },
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Failed to encode cache value: {message}")]
	Encode { message: String },
	#[error("{message}")]
	InvalidConfig { message: String },
}
