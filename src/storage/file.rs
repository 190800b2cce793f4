//! JSON file store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{validate_key, Storage, StorageError};

/// Stores each key as `<root>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl Storage for FileStore {
    fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let io_err = |source| StorageError::Io { key: key.to_string(), source };

        fs::create_dir_all(&self.root).map_err(io_err)?;
        let content = serde_json::to_string_pretty(value)
            .map_err(|source| StorageError::Serialization { key: key.to_string(), source })?;

        // Sibling temp file, then rename over the target.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        tracing::debug!(key, path = %path.display(), "record saved");
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { key: key.to_string(), source }),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StorageError::Serialization { key: key.to_string(), source })
    }
}
