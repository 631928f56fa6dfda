use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Storage, StorageError, StorageKey, StorageMap};

/// Storage persisted as a single JSON object on disk.
///
/// Each update rewrites the whole document through a temp file in the same
/// directory, then renames it over the original. Entries under names outside
/// `StorageKey` are carried through untouched.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(|b| b.is_ascii_whitespace()) => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: Map<String, Value>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(&Value::Object(document))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, &bytes))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;
        debug!("Storage written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, keys: &[StorageKey]) -> Result<StorageMap, StorageError> {
        let _guard = self.lock.lock().await;
        let document = self.read_document().await?;
        Ok(keys
            .iter()
            .filter_map(|k| document.get(k.as_str()).map(|v| (*k, v.clone())))
            .collect())
    }

    async fn set(&self, items: StorageMap) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        for (key, value) in items {
            document.insert(key.as_str().to_string(), value);
        }
        self.write_document(document).await
    }

    async fn remove(&self, keys: &[StorageKey]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        let before = document.len();
        for key in keys {
            document.remove(key.as_str());
        }
        if document.len() == before {
            return Ok(());
        }
        self.write_document(document).await
    }
}

fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::at_path(dir.path().join("storage.json"));

        let got = storage.get(&StorageKey::ALL).await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_values_survive_a_new_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let storage = FileStorage::at_path(&path);
        storage
            .set(StorageMap::from([
                (StorageKey::SelectedText, json!("Senior Rust Engineer")),
                (StorageKey::SelectionTimestamp, json!(1_700_000_000_000_i64)),
            ]))
            .await
            .unwrap();

        let reopened = FileStorage::at_path(&path);
        let got = reopened
            .get(&[StorageKey::SelectedText, StorageKey::SelectionTimestamp])
            .await
            .unwrap();
        assert_eq!(got[&StorageKey::SelectedText], json!("Senior Rust Engineer"));
        assert_eq!(
            got[&StorageKey::SelectionTimestamp],
            json!(1_700_000_000_000_i64)
        );
    }

    #[tokio::test]
    async fn test_file_uses_persisted_key_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let storage = FileStorage::at_path(&path);
        storage
            .set(StorageMap::from([(StorageKey::GeminiApiKey, json!("abc"))]))
            .await
            .unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw, json!({"geminiApiKey": "abc"}));
    }

    #[tokio::test]
    async fn test_foreign_entries_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"theme": "dark", "selectedText": "old"}"#).unwrap();

        let storage = FileStorage::at_path(&path);
        storage
            .set(StorageMap::from([(StorageKey::SelectedText, json!("new"))]))
            .await
            .unwrap();
        storage.remove(&[StorageKey::GeminiApiKey]).await.unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], json!("dark"));
        assert_eq!(raw["selectedText"], json!("new"));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = FileStorage::at_path(&path);
        let err = storage.get(&StorageKey::ALL).await.unwrap_err();
        assert!(matches!(err, StorageError::Serde(_)));
    }
}
