use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
	sync::atomic::{AtomicU64, Ordering},
};

use tokio::fs;

use crate::{BoxFuture, CacheAdapter, Error, Result};

/// One file per key under `root`. Keys are hashed, so any string is a valid key.
#[derive(Debug)]
pub struct FileAdapter {
	root: PathBuf,
	write_seq: AtomicU64,
}
impl FileAdapter {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into(), write_seq: AtomicU64::new(0) }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// `<root>/<2 hex chars>/<blake3 hex>.json`
	pub fn path_for(&self, key: &str) -> PathBuf {
		let digest = blake3::hash(key.as_bytes()).to_hex();
		let digest = digest.as_str();

		self.root.join(&digest[..2]).join(format!("{digest}.json"))
	}

	async fn read(&self, key: &str) -> Result<Option<String>> {
		let path = self.path_for(key);

		match fs::read_to_string(&path).await {
			Ok(raw) => Ok(Some(raw)),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
			Err(err) => Err(Error::Io { path, source: err }),
		}
	}

	async fn write(&self, key: &str, value: String) -> Result<()> {
		let path = self.path_for(key);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|err| Error::Io { path: parent.to_path_buf(), source: err })?;
		}

		// Write aside and rename; readers never see a partial file.
		let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
		let tmp = path.with_extension(format!("tmp.{}.{seq}", std::process::id()));

		fs::write(&tmp, value).await.map_err(|err| Error::Io { path: tmp.clone(), source: err })?;

		if let Err(err) = fs::rename(&tmp, &path).await {
			let _ = fs::remove_file(&tmp).await;

			return Err(Error::Io { path, source: err });
		}

		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<()> {
		let path = self.path_for(key);

		match fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
			Err(err) => Err(Error::Io { path, source: err }),
		}
	}
}
impl CacheAdapter for FileAdapter {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(self.read(key))
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.write(key, value))
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.remove(key))
	}
}
