//! Background context: relays page messages to the popup and persists
//! selections so a popup opened later can recover them.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::messaging::{
    preview, ContextId, Delivery, Envelope, Message, MessageHandler, Messenger, Reply,
};
use crate::storage::{ExtensionStore, SelectedTextRecord, StoredText};

pub struct BackgroundService {
    store: ExtensionStore,
    messenger: Messenger,
}

impl BackgroundService {
    pub fn new(store: ExtensionStore, messenger: Messenger) -> Self {
        Self { store, messenger }
    }

    async fn on_job_text(&self, text: String) {
        debug!("Job text received from page: {}", preview(&text));
        self.forward_to_popup(Message::JobText(text)).await;
    }

    /// Writes the selection through to storage before forwarding it, so the
    /// capture survives even when the popup is closed.
    async fn on_selected_text(&self, text: String) {
        info!(
            "Selected text received ({} characters): {}",
            text.chars().count(),
            preview(&text)
        );

        let record = SelectedTextRecord {
            text: text.clone(),
            captured_at_ms: Utc::now().timestamp_millis(),
        };
        match self.store.save_selection(&record).await {
            Ok(()) => debug!("Selected text stored"),
            Err(e) => warn!("Failed to store selected text: {e}"),
        }

        if self.forward_to_popup(Message::SelectedText(text)).await == Delivery::NotDelivered {
            info!("Popup not open, text stored for later retrieval");
        }
    }

    async fn stored_text(&self) -> StoredText {
        self.store.stored_selection().await.unwrap_or_else(|e| {
            warn!("Failed to read stored selection: {e}");
            StoredText::default()
        })
    }

    async fn forward_to_popup(&self, message: Message) -> Delivery {
        self.messenger
            .send(ContextId::Background, ContextId::Popup, message)
            .await
    }
}

#[async_trait]
impl MessageHandler for BackgroundService {
    async fn handle(&mut self, envelope: Envelope) {
        let (from, message, responder) = envelope.into_parts();
        match message {
            Message::JobText(text) => self.on_job_text(text).await,
            Message::SelectedText(text) => self.on_selected_text(text).await,
            Message::GetStoredText => {
                let stored = self.stored_text().await;
                match responder {
                    Some(responder) => {
                        if !responder.send(Reply::StoredText(stored)) {
                            debug!("{from} stopped waiting for GET_STORED_TEXT");
                        }
                    }
                    None => debug!("GET_STORED_TEXT from {from} had no reply channel"),
                }
            }
            Message::StartSelection => debug!("Ignoring START_SELECTION from {from}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::TabId;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    async fn start() -> (Messenger, ExtensionStore) {
        let messenger = Messenger::new();
        let store = ExtensionStore::new(Arc::new(MemoryStorage::new()));
        let inbox = messenger.connect(ContextId::Background).await;
        tokio::spawn(inbox.run(BackgroundService::new(store.clone(), messenger.clone())));
        (messenger, store)
    }

    async fn stored_text(messenger: &Messenger) -> StoredText {
        match messenger
            .request(ContextId::Popup, ContextId::Background, Message::GetStoredText)
            .await
            .unwrap()
        {
            Reply::StoredText(stored) => stored,
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_stored_text_is_empty_initially() {
        let (messenger, _store) = start().await;
        assert_eq!(stored_text(&messenger).await, StoredText::default());
    }

    #[tokio::test]
    async fn test_selection_is_recoverable_without_popup_listening() {
        let (messenger, store) = start().await;
        let tab = ContextId::Tab(TabId(1));

        let before = Utc::now().timestamp_millis();
        messenger
            .send(
                tab,
                ContextId::Background,
                Message::SelectedText("Staff Engineer, Payments".to_string()),
            )
            .await;

        // Requests are handled after the preceding send, in delivery order.
        let stored = stored_text(&messenger).await;
        assert_eq!(stored.selected_text, "Staff Engineer, Payments");
        assert!(stored.timestamp.unwrap() >= before);
        assert_eq!(store.stored_selection().await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_selection_is_forwarded_to_open_popup() {
        let (messenger, _store) = start().await;
        let mut popup = messenger.connect(ContextId::Popup).await;

        messenger
            .send(
                ContextId::Tab(TabId(2)),
                ContextId::Background,
                Message::SelectedText("Rust role".to_string()),
            )
            .await;

        let envelope = popup.recv().await.unwrap();
        assert_eq!(envelope.from, ContextId::Background);
        assert_eq!(envelope.message, Message::SelectedText("Rust role".to_string()));
    }

    #[tokio::test]
    async fn test_job_text_is_forwarded_but_not_stored() {
        let (messenger, store) = start().await;
        let mut popup = messenger.connect(ContextId::Popup).await;

        messenger
            .send(
                ContextId::Tab(TabId(3)),
                ContextId::Background,
                Message::JobText("Whole page".to_string()),
            )
            .await;

        let envelope = popup.recv().await.unwrap();
        assert_eq!(envelope.message, Message::JobText("Whole page".to_string()));
        assert_eq!(store.stored_selection().await.unwrap(), StoredText::default());
    }

    #[tokio::test]
    async fn test_later_selection_overwrites_earlier() {
        let (messenger, _store) = start().await;
        for text in ["first capture", "second capture"] {
            messenger
                .send(
                    ContextId::Tab(TabId(1)),
                    ContextId::Background,
                    Message::SelectedText(text.to_string()),
                )
                .await;
        }
        assert_eq!(stored_text(&messenger).await.selected_text, "second capture");
    }
}
