//! The DOM operations a content script needs from the page it runs in.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("Page has no document body")]
    NoDocumentBody,

    #[error("DOM operation failed: {0}")]
    Dom(String),
}

/// Handle to an overlay element installed on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlayId(pub u32);

/// User input observed on a page while selection triggers are registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PageEvent {
    /// Mouse button released.
    PointerUp,
    /// Key pressed; `key` uses DOM key names such as `Enter` or `Escape`.
    KeyDown { key: String },
}

impl PageEvent {
    #[cfg(test)]
    pub fn key(key: impl Into<String>) -> Self {
        PageEvent::KeyDown { key: key.into() }
    }
}

pub trait Page: Send + Sync {
    fn url(&self) -> String;

    /// Visible text of the whole document.
    fn body_text(&self) -> String;

    /// Enables text selection and the text cursor on the document body.
    fn apply_selection_styles(&mut self) -> Result<(), PageError>;

    /// Restores the body's original selection and cursor styles.
    fn restore_selection_styles(&mut self);

    fn install_overlay(&mut self, banner: &str) -> Result<OverlayId, PageError>;

    fn remove_overlay(&mut self, overlay: OverlayId);

    /// Registers the pointer-release and key-press listeners.
    fn register_triggers(&mut self) -> Result<(), PageError>;

    fn deregister_triggers(&mut self);

    /// The user's current selection, untrimmed.
    fn selection_text(&self) -> String;

    /// Removes all selection ranges.
    fn clear_selection(&mut self);
}

// ────────────────────────────────────────────────────────────────────────────
// SimulatedPage: in-process page used by the runtime and tests
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PageDom {
    url: String,
    title: String,
    body_text: String,
    selection: String,
    selection_styles: bool,
    overlays: Vec<(OverlayId, String)>,
    next_overlay: u32,
    trigger_sets: usize,
    body_detached: bool,
}

/// Observable state of a `SimulatedPage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub selection: String,
    pub selection_styles: bool,
    pub overlay_count: usize,
    pub overlay_banner: Option<String>,
    /// Number of registered pointer/key listener pairs.
    pub trigger_sets: usize,
}

/// A page held in memory. Clones share the same document, so a driver can
/// change the user's selection while the content script owns another clone.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPage {
    dom: Arc<Mutex<PageDom>>,
}

impl SimulatedPage {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        body_text: impl Into<String>,
    ) -> Self {
        Self {
            dom: Arc::new(Mutex::new(PageDom {
                url: url.into(),
                title: title.into(),
                body_text: body_text.into(),
                ..PageDom::default()
            })),
        }
    }

    /// Sets the user's selection, as a mouse drag would.
    pub fn select_text(&self, text: impl Into<String>) {
        self.dom().selection = text.into();
    }

    /// Removes the document body, as while a page is still loading or being torn down.
    #[cfg(test)]
    pub fn detach_body(&self) {
        self.dom().body_detached = true;
    }

    pub fn snapshot(&self) -> PageSnapshot {
        let dom = self.dom();
        PageSnapshot {
            url: dom.url.clone(),
            title: dom.title.clone(),
            selection: dom.selection.clone(),
            selection_styles: dom.selection_styles,
            overlay_count: dom.overlays.len(),
            overlay_banner: dom.overlays.last().map(|(_, banner)| banner.clone()),
            trigger_sets: dom.trigger_sets,
        }
    }

    fn dom(&self) -> MutexGuard<'_, PageDom> {
        self.dom.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Page for SimulatedPage {
    fn url(&self) -> String {
        self.dom().url.clone()
    }

    fn body_text(&self) -> String {
        self.dom().body_text.clone()
    }

    fn apply_selection_styles(&mut self) -> Result<(), PageError> {
        let mut dom = self.dom();
        if dom.body_detached {
            return Err(PageError::NoDocumentBody);
        }
        dom.selection_styles = true;
        Ok(())
    }

    fn restore_selection_styles(&mut self) {
        self.dom().selection_styles = false;
    }

    fn install_overlay(&mut self, banner: &str) -> Result<OverlayId, PageError> {
        let mut dom = self.dom();
        if dom.body_detached {
            return Err(PageError::NoDocumentBody);
        }
        dom.next_overlay += 1;
        let id = OverlayId(dom.next_overlay);
        dom.overlays.push((id, banner.to_string()));
        Ok(id)
    }

    fn remove_overlay(&mut self, overlay: OverlayId) {
        self.dom().overlays.retain(|(id, _)| *id != overlay);
    }

    fn register_triggers(&mut self) -> Result<(), PageError> {
        self.dom().trigger_sets += 1;
        Ok(())
    }

    fn deregister_triggers(&mut self) {
        let mut dom = self.dom();
        dom.trigger_sets = dom.trigger_sets.saturating_sub(1);
    }

    fn selection_text(&self) -> String {
        self.dom().selection.clone()
    }

    fn clear_selection(&mut self) {
        self.dom().selection.clear();
    }
}
