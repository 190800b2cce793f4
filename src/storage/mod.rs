//! Durable storage for conversation records.
//!
//! Everything the pipeline persists is a JSON value under a flat string key.
//! Writes are whole-object overwrites; the latest write wins.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Storage error types.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("I/O error for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error for key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Key/value store for JSON records.
pub trait Storage: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    fn save(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Load the value stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<Value>, StorageError>;
}

/// Serialize and store a typed record.
pub fn save_record<T: Serialize>(
    storage: &dyn Storage,
    key: &str,
    record: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(record)
        .map_err(|source| StorageError::Serialization { key: key.to_string(), source })?;
    storage.save(key, &value)
}

/// Load and deserialize a typed record.
pub fn load_record<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    storage
        .load(key)?
        .map(|value| {
            serde_json::from_value(value)
                .map_err(|source| StorageError::Serialization { key: key.to_string(), source })
        })
        .transpose()
}

/// Store a record, logging and discarding any failure.
///
/// Audit writes must never interrupt the pipeline.
pub fn persist_quietly<T: Serialize>(storage: &dyn Storage, key: &str, record: &T) {
    if let Err(e) = save_record(storage, key, record) {
        tracing::warn!(key, error = %e, "failed to persist record");
    }
}

/// Reject keys that could escape a storage namespace.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key.len() <= 200
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Storage key builders, namespaced by conversation id.
pub mod keys {
    /// Persisted result of one domain analysis.
    pub fn domain_analysis(domain: &str, conversation_id: &str) -> String {
        format!("{domain}_analysis_{conversation_id}")
    }

    /// Prompt sent to one domain expert.
    pub fn domain_prompt(domain: &str, conversation_id: &str) -> String {
        format!("{domain}_prompt_{conversation_id}")
    }

    pub fn planner_prompt(conversation_id: &str) -> String {
        format!("workflow_prompt_{conversation_id}")
    }

    pub fn integration(conversation_id: &str) -> String {
        format!("integration_{conversation_id}")
    }

    /// Generated prompt for one workflow step.
    pub fn step_prompt(step_id: &str, conversation_id: &str) -> String {
        format!("{step_id}_prompt_{conversation_id}")
    }

    pub fn system_state(conversation_id: &str) -> String {
        format!("system_state_{conversation_id}")
    }
}
