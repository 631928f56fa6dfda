//! Selection Session: the page-context state machine that captures a text
//! selection and reports it back to the extension.
//!
//! States are `Idle` and `Active`. Activation installs the overlay banner,
//! selection styles, and pointer/key triggers. The session finishes on a
//! pointer release with a non-empty selection, or on `Enter`/`Escape`
//! whether or not anything is selected. Finishing always tears down
//! everything activation installed and clears the page selection.

use tracing::{debug, info};

pub mod content_script;
pub mod handlers;
pub mod page;

pub use content_script::ContentScript;
pub use page::{Page, PageError, PageEvent, PageSnapshot, SimulatedPage};

use page::OverlayId;

pub const OVERLAY_BANNER: &str =
    "📝 Select text with your mouse, then press Enter or Escape to finish";

/// How a finished session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finish {
    /// A trimmed, non-empty selection was captured.
    Captured(String),
    /// Finished from the keyboard with nothing selected.
    Empty,
}

/// An active selection session. Owns what activation installed on the page
/// and removes it in `finish`.
#[derive(Debug)]
pub struct SelectionSession {
    overlay: OverlayId,
}

impl SelectionSession {
    /// Installs the selection affordances. On failure, anything already
    /// installed is removed again before the error is returned.
    pub fn activate(page: &mut dyn Page) -> Result<Self, PageError> {
        info!("Starting text selection mode on page: {}", page.url());

        page.apply_selection_styles()?;

        let overlay = match page.install_overlay(OVERLAY_BANNER) {
            Ok(overlay) => overlay,
            Err(e) => {
                page.restore_selection_styles();
                return Err(e);
            }
        };

        if let Err(e) = page.register_triggers() {
            page.remove_overlay(overlay);
            page.restore_selection_styles();
            return Err(e);
        }

        Ok(Self { overlay })
    }

    /// Decides whether `event` ends the session. Does not touch the page.
    pub fn on_event(&self, page: &dyn Page, event: &PageEvent) -> Option<Finish> {
        match event {
            PageEvent::PointerUp => {
                let selection = page.selection_text();
                let text = selection.trim();
                (!text.is_empty()).then(|| Finish::Captured(text.to_string()))
            }
            PageEvent::KeyDown { key } if is_finish_key(key) => {
                let selection = page.selection_text();
                let text = selection.trim();
                if text.is_empty() {
                    Some(Finish::Empty)
                } else {
                    Some(Finish::Captured(text.to_string()))
                }
            }
            PageEvent::KeyDown { .. } => None,
        }
    }

    /// Removes the overlay, restores styles, deregisters triggers, and clears the selection.
    pub fn finish(self, page: &mut dyn Page) {
        debug!("Ending text selection mode");
        page.remove_overlay(self.overlay);
        page.restore_selection_styles();
        page.deregister_triggers();
        page.clear_selection();
    }
}

fn is_finish_key(key: &str) -> bool {
    matches!(key, "Enter" | "Escape")
}

/// Selection mode of one page. At most one session is active at a time.
#[derive(Debug, Default)]
pub enum SelectionState {
    #[default]
    Idle,
    Active(SelectionSession),
}

impl SelectionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SelectionState::Active(_))
    }
}
