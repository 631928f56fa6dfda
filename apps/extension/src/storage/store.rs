//! Typed facade over the raw key/value `Storage`, one method per stored record.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{Storage, StorageError, StorageKey, StorageMap};
use crate::resume::models::ResumeRecord;

/// A captured page selection. A new capture replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedTextRecord {
    pub text: String,
    pub captured_at_ms: i64,
}

/// The persisted selection as reported back to the popup.
/// `selected_text` is empty and `timestamp` is null when nothing is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredText {
    pub selected_text: String,
    pub timestamp: Option<i64>,
}

#[derive(Clone)]
pub struct ExtensionStore {
    backend: Arc<dyn Storage>,
}

impl ExtensionStore {
    pub fn new(backend: Arc<dyn Storage>) -> Self {
        Self { backend }
    }

    // ── API key ────────────────────────────────────────────────────────────

    /// The saved Gemini API key. A blank stored value counts as absent.
    pub async fn api_key(&self) -> Result<Option<String>, StorageError> {
        let mut items = self.backend.get(&[StorageKey::GeminiApiKey]).await?;
        let key: Option<String> = decode(&mut items, StorageKey::GeminiApiKey)?;
        Ok(key.filter(|k| !k.trim().is_empty()))
    }

    pub async fn save_api_key(&self, api_key: &str) -> Result<(), StorageError> {
        self.backend
            .set(StorageMap::from([(StorageKey::GeminiApiKey, json!(api_key))]))
            .await
    }

    // ── Resume ─────────────────────────────────────────────────────────────

    pub async fn resume(&self) -> Result<Option<ResumeRecord>, StorageError> {
        let mut items = self.backend.get(&[StorageKey::ResumeData]).await?;
        decode(&mut items, StorageKey::ResumeData)
    }

    /// Replaces the stored resume wholesale and stamps it with the current time.
    pub async fn save_resume(&self, record: &ResumeRecord) -> Result<DateTime<Utc>, StorageError> {
        let now = Utc::now();
        self.backend
            .set(StorageMap::from([
                (StorageKey::ResumeData, serde_json::to_value(record)?),
                (
                    StorageKey::ResumeLastUpdated,
                    json!(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
                ),
            ]))
            .await?;
        info!("Resume data saved to storage");
        Ok(now)
    }

    pub async fn resume_last_updated(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let mut items = self.backend.get(&[StorageKey::ResumeLastUpdated]).await?;
        decode(&mut items, StorageKey::ResumeLastUpdated)
    }

    /// True only when a resume is stored and both `name` and `email` are set.
    pub async fn has_usable_resume(&self) -> Result<bool, StorageError> {
        Ok(self.resume().await?.is_some_and(|r| r.is_usable()))
    }

    pub async fn clear_resume(&self) -> Result<(), StorageError> {
        self.backend
            .remove(&[StorageKey::ResumeData, StorageKey::ResumeLastUpdated])
            .await?;
        info!("Resume data cleared from storage");
        Ok(())
    }

    // ── Selected text ──────────────────────────────────────────────────────

    pub async fn stored_selection(&self) -> Result<StoredText, StorageError> {
        let mut items = self
            .backend
            .get(&[StorageKey::SelectedText, StorageKey::SelectionTimestamp])
            .await?;
        let selected_text: Option<String> = decode(&mut items, StorageKey::SelectedText)?;
        let timestamp: Option<i64> = decode(&mut items, StorageKey::SelectionTimestamp)?;
        Ok(StoredText {
            selected_text: selected_text.unwrap_or_default(),
            timestamp,
        })
    }

    pub async fn save_selection(&self, record: &SelectedTextRecord) -> Result<(), StorageError> {
        self.backend
            .set(StorageMap::from([
                (StorageKey::SelectedText, json!(record.text)),
                (StorageKey::SelectionTimestamp, json!(record.captured_at_ms)),
            ]))
            .await
    }

    pub async fn clear_selection(&self) -> Result<(), StorageError> {
        self.backend
            .remove(&[StorageKey::SelectedText, StorageKey::SelectionTimestamp])
            .await
    }
}

fn decode<T: DeserializeOwned>(
    items: &mut StorageMap,
    key: StorageKey,
) -> Result<Option<T>, StorageError> {
    match items.remove(&key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StorageError::Decode { key, source }),
    }
}
