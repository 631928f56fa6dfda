//! Cross-Context Messenger: typed envelopes passed between the background,
//! popup, and page contexts.
//!
//! Contexts share no memory. A context connects to the `Messenger`, receives
//! an `Inbox`, and handles envelopes one at a time in delivery order. Sending
//! to a context that is not listening is reported as `Delivery::NotDelivered`,
//! never as an error.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

pub mod bus;

pub use bus::{Inbox, Messenger};

use crate::storage::StoredText;

// ────────────────────────────────────────────────────────────────────────────
// Addressing
// ────────────────────────────────────────────────────────────────────────────

/// Identifier of a browser tab hosting a page context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An independent execution context of the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    Background,
    Popup,
    Tab(TabId),
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Background => f.write_str("background"),
            ContextId::Popup => f.write_str("popup"),
            ContextId::Tab(id) => write!(f, "tab:{id}"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Message and reply types
// ────────────────────────────────────────────────────────────────────────────

/// The closed set of message kinds. Wire form is `{"type": TAG, "data": payload}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Full page text, sent by the content script when a page loads.
    JobText(String),
    /// A trimmed, non-empty selection captured on a page.
    SelectedText(String),
    /// Request for the persisted selection. Always answered with `Reply::StoredText`.
    GetStoredText,
    /// Ask a page to enter selection mode. Answered with `Reply::SelectionStarted`.
    StartSelection,
}

impl Message {
    pub fn tag(&self) -> &'static str {
        match self {
            Message::JobText(_) => "JOB_TEXT",
            Message::SelectedText(_) => "SELECTED_TEXT",
            Message::GetStoredText => "GET_STORED_TEXT",
            Message::StartSelection => "START_SELECTION",
        }
    }

    /// Only `GET_STORED_TEXT` obliges the receiver to reply; other replies are best-effort.
    pub fn expects_reply(&self) -> bool {
        matches!(self, Message::GetStoredText)
    }
}

/// Outcome of a `START_SELECTION` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionStarted {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SelectionStarted {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    StoredText(StoredText),
    SelectionStarted(SelectionStarted),
}

/// Shortens text for log lines, keeping the first 100 characters.
pub(crate) fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 100;
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Envelopes
// ────────────────────────────────────────────────────────────────────────────

/// Reply channel for one request. Consumed on use, so at most one reply is sent.
#[derive(Debug)]
pub struct Responder(oneshot::Sender<Reply>);

impl Responder {
    /// Returns false when the requester has stopped waiting.
    pub fn send(self, reply: Reply) -> bool {
        self.0.send(reply).is_ok()
    }
}

/// A message in flight, with its sender and an optional reply channel.
///
/// Dropping an envelope that still holds a responder resolves the caller's
/// request with `MessengerError::NoReply`.
#[derive(Debug)]
pub struct Envelope {
    pub from: ContextId,
    pub message: Message,
    responder: Option<Responder>,
}

impl Envelope {
    pub fn new(from: ContextId, message: Message) -> Self {
        Self {
            from,
            message,
            responder: None,
        }
    }

    pub(crate) fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Whether the sender is awaiting a reply.
    #[cfg(test)]
    pub fn awaits_reply(&self) -> bool {
        self.responder.is_some()
    }

    pub fn into_parts(self) -> (ContextId, Message, Option<Responder>) {
        (self.from, self.message, self.responder)
    }

    /// Sends the reply. Returns false if nobody is waiting or a reply was already sent.
    pub fn reply(&mut self, reply: Reply) -> bool {
        match self.responder.take() {
            Some(responder) => responder.send(reply),
            None => false,
        }
    }
}

/// Result of a fire-and-forget send. Callers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    NotDelivered,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessengerError {
    #[error("Receiving end does not exist: {to} is not listening")]
    NotDelivered { to: ContextId },

    #[error("{to} closed the reply channel without responding")]
    NoReply { to: ContextId },
}

/// Per-context message handler. Runs on the context's own task, one envelope at a time.
#[async_trait]
pub trait MessageHandler: Send {
    async fn handle(&mut self, envelope: Envelope);
}
