//! Persistence adapters: the durable key-value collaborator of the store.

use std::path::PathBuf;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors raised by a persistence adapter.
///
/// The store treats every variant as fail-soft: logged, never propagated.
#[derive(Debug, Error)]
pub enum PersistError {
	/// Underlying I/O failure.
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),

	/// Backend-specific failure.
	#[error("{0}")]
	Backend(String),
}

/// Durable key-value storage for serialized namespace records.
///
/// Keys follow the `"{namespace}_state"` convention; values are JSON bodies.
pub trait PersistenceAdapter: Send + Sync {
	/// Reads the record for `key`, `None` when absent.
	fn load(&self, key: &str) -> Result<Option<String>, PersistError>;

	/// Writes the record for `key`, replacing any previous value.
	fn store(&self, key: &str, value: &str) -> Result<(), PersistError>;

	/// Removes the record for `key`. Missing records are not an error.
	fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// In-memory adapter for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
	records: RwLock<FxHashMap<String, String>>,
}

impl MemoryAdapter {
	/// Creates an empty adapter.
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds a record, bypassing the store. Test convenience.
	pub fn seed(&self, key: &str, value: &str) {
		self.records.write().insert(key.to_string(), value.to_string());
	}
}

impl PersistenceAdapter for MemoryAdapter {
	fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
		Ok(self.records.read().get(key).cloned())
	}

	fn store(&self, key: &str, value: &str) -> Result<(), PersistError> {
		self.records.write().insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), PersistError> {
		self.records.write().remove(key);
		Ok(())
	}
}

/// File-backed adapter storing one JSON file per record under a base directory.
#[derive(Debug)]
pub struct JsonFileAdapter {
	dir: PathBuf,
}

impl JsonFileAdapter {
	/// Creates the adapter, creating the base directory if needed.
	pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
		let dir = dir.into();
		std::fs::create_dir_all(&dir)?;
		Ok(Self { dir })
	}

	fn path_for(&self, key: &str) -> PathBuf {
		// Record keys are "{namespace}_state"; namespaces are plain module
		// ids, so the key is already a safe file stem.
		self.dir.join(format!("{key}.json"))
	}
}

impl PersistenceAdapter for JsonFileAdapter {
	fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
		match std::fs::read_to_string(self.path_for(key)) {
			Ok(body) => Ok(Some(body)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	fn store(&self, key: &str, value: &str) -> Result<(), PersistError> {
		std::fs::write(self.path_for(key), value)?;
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), PersistError> {
		match std::fs::remove_file(self.path_for(key)) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn file_adapter_round_trips_records() {
		let dir = tempfile::tempdir().unwrap();
		let adapter = JsonFileAdapter::new(dir.path().join("state")).unwrap();

		assert!(adapter.load("engram_state").unwrap().is_none());
		adapter.store("engram_state", r#"{"x":1}"#).unwrap();
		assert_eq!(adapter.load("engram_state").unwrap().as_deref(), Some(r#"{"x":1}"#));

		adapter.remove("engram_state").unwrap();
		assert!(adapter.load("engram_state").unwrap().is_none());
		// removing again is not an error
		adapter.remove("engram_state").unwrap();
	}
}
