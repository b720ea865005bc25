//! Best-effort key/value persistence.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for state storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No data directory for this platform
    #[error("no data directory available")]
    NoDataDir,
}

/// Keyed JSON storage.
pub trait StateStorage {
    fn get_data(&self, key: &str) -> Result<Option<Value>, StorageError>;

    fn set_data(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

/// Storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RefCell<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStorage for MemoryStorage {
    fn get_data(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.data.borrow().get(key).cloned())
    }

    fn set_data(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.data.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

/// Storage backed by one JSON object in a file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `state.json` in the platform data directory.
    pub fn open_default() -> Result<Self, StorageError> {
        Self::default_path().map(Self::new).ok_or(StorageError::NoDataDir)
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "keybind-engine").map(|d| d.data_dir().join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl StateStorage for FileStorage {
    fn get_data(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.read()?.remove(key))
    }

    fn set_data(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut data = self.read()?;
        data.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
