//! In-memory store.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

use super::{validate_key, Storage, StorageError};

/// Process-local store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Storage for MemoryStore {
    fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        validate_key(key)?;
        self.records.write().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        validate_key(key)?;
        Ok(self.records.read().get(key).cloned())
    }
}
