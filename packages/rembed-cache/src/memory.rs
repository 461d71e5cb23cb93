use std::{collections::HashMap, sync::RwLock};

use crate::{BoxFuture, CacheAdapter, Result};

/// Process-local adapter. Entries die with the process.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
	entries: RwLock<HashMap<String, String>>,
}
impl MemoryAdapter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.read().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl CacheAdapter for MemoryAdapter {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
		let value = self.entries.read().unwrap_or_else(|err| err.into_inner()).get(key).cloned();

		Box::pin(async move { Ok(value) })
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
		self.entries.write().unwrap_or_else(|err| err.into_inner()).insert(key.to_string(), value);

		Box::pin(async { Ok(()) })
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
		self.entries.write().unwrap_or_else(|err| err.into_inner()).remove(key);

		Box::pin(async { Ok(()) })
	}
}
