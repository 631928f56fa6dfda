use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Storage, StorageError, StorageKey, StorageMap};

/// In-process storage. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<StorageMap>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, keys: &[StorageKey]) -> Result<StorageMap, StorageError> {
        let items = self.items.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| items.get(k).map(|v| (*k, v.clone())))
            .collect())
    }

    async fn set(&self, items: StorageMap) -> Result<(), StorageError> {
        self.items.write().await.extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[StorageKey]) -> Result<(), StorageError> {
        let mut items = self.items.write().await;
        for key in keys {
            items.remove(key);
        }
        Ok(())
    }
}
