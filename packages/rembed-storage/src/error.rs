#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Required Postgres extension {0:?} is not available.")]
	MissingExtension(String),
}
impl Error {
	/// The store itself is unreachable, as opposed to one statement failing.
	pub fn is_connectivity(&self) -> bool {
		let Self::Sqlx(err) = self else {
			return false;
		};

		match err {
			sqlx::Error::Io(_)
			| sqlx::Error::Tls(_)
			| sqlx::Error::PoolTimedOut
			| sqlx::Error::PoolClosed
			| sqlx::Error::WorkerCrashed => true,
			sqlx::Error::Database(db) => db.code().is_some_and(|code| {
				// Class 08 is connection exceptions; 57P0x covers server shutdown.
				code.starts_with("08") || code.starts_with("57P0")
			}),
			_ => false,
		}
	}

	/// pgvector refused a vector because its width disagrees with its operand or column.
	pub fn is_dimension_mismatch(&self) -> bool {
		let Self::Sqlx(sqlx::Error::Database(db)) = self else {
			return false;
		};
		let message = db.message().to_ascii_lowercase();

		message.contains("different vector dimensions")
			|| (message.contains("expected") && message.contains("dimensions"))
	}

	/// The server lacks a function the query relies on, such as `vector_dims`.
	pub fn is_undefined_function(&self) -> bool {
		let Self::Sqlx(sqlx::Error::Database(db)) = self else {
			return false;
		};

		db.code().is_some_and(|code| code == "42883")
	}
}
