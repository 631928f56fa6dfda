//! Storage Adapter: async key/value persistence over a fixed set of keys.
//!
//! Every context reads and writes through a `Storage` backend. Writes replace
//! whole values (last writer wins); there is no locking or versioning.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod file;
pub mod memory;
pub mod store;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use store::{ExtensionStore, SelectedTextRecord, StoredText};

/// The closed set of keys the extension persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageKey {
    GeminiApiKey,
    ResumeData,
    ResumeLastUpdated,
    SelectedText,
    SelectionTimestamp,
}

impl StorageKey {
    #[cfg(test)]
    pub const ALL: [StorageKey; 5] = [
        StorageKey::GeminiApiKey,
        StorageKey::ResumeData,
        StorageKey::ResumeLastUpdated,
        StorageKey::SelectedText,
        StorageKey::SelectionTimestamp,
    ];

    /// The persisted name of the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::GeminiApiKey => "geminiApiKey",
            StorageKey::ResumeData => "resumeData",
            StorageKey::ResumeLastUpdated => "resumeLastUpdated",
            StorageKey::SelectedText => "selectedText",
            StorageKey::SelectionTimestamp => "selectionTimestamp",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch of key/value pairs read from or written to storage.
pub type StorageMap = BTreeMap<StorageKey, Value>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Stored value for '{key}' has an unexpected shape: {source}")]
    Decode {
        key: StorageKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Async key/value persistence. Keys missing from storage are simply absent
/// from the returned map.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, keys: &[StorageKey]) -> Result<StorageMap, StorageError>;

    /// Writes every pair in `items` as a single update.
    async fn set(&self, items: StorageMap) -> Result<(), StorageError>;

    async fn remove(&self, keys: &[StorageKey]) -> Result<(), StorageError>;
}
