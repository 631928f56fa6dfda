//! Popup Controller: the popup context. Orchestrates storage, messaging,
//! and both model pipelines in response to user actions, and reduces every
//! outcome to a `PopupView` with a status line.
//!
//! Nothing here fails outward: pipeline and storage errors become statuses.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cover_letter::{CoverLetterError, CoverLetterGenerator};
use crate::messaging::{
    preview, ContextId, Envelope, Message, MessageHandler, Messenger, MessengerError, Reply,
    SelectionStarted, TabId,
};
use crate::resume::{ResumeFile, ResumeParser, ResumeRecord};
use crate::storage::ExtensionStore;

pub mod handlers;

const INTERNAL_PAGE_PREFIXES: [&str; 2] = ["chrome://", "chrome-extension://"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

impl Status {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            message: message.into(),
        }
    }
}

/// Everything the popup renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupView {
    pub selected_text: String,
    /// Full text of the last page that announced itself.
    pub page_text: String,
    pub status: Option<Status>,
    pub cover_letter: Option<String>,
    pub has_api_key: bool,
    pub show_settings: bool,
    pub show_resume_uploader: bool,
    pub is_selecting: bool,
    pub is_generating: bool,
    pub is_uploading: bool,
    pub resume: Option<ResumeRecord>,
    pub resume_last_updated: Option<DateTime<Utc>>,
    /// Parsed upload awaiting review before it is saved.
    pub resume_draft: Option<ResumeRecord>,
    pub upload_error: Option<String>,
}

/// The tab a popup action targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTab {
    pub id: TabId,
    pub url: String,
}

impl ActiveTab {
    fn is_internal_page(&self) -> bool {
        self.url.is_empty()
            || INTERNAL_PAGE_PREFIXES
                .iter()
                .any(|prefix| self.url.starts_with(prefix))
    }
}

/// Clones share one view, so the message listener and user actions see the
/// same state.
#[derive(Clone)]
pub struct PopupController {
    store: ExtensionStore,
    messenger: Messenger,
    resume_parser: ResumeParser,
    generator: CoverLetterGenerator,
    view: Arc<Mutex<PopupView>>,
}

impl PopupController {
    pub fn new(
        store: ExtensionStore,
        messenger: Messenger,
        resume_parser: ResumeParser,
        generator: CoverLetterGenerator,
    ) -> Self {
        Self {
            store,
            messenger,
            resume_parser,
            generator,
            view: Arc::new(Mutex::new(PopupView::default())),
        }
    }

    pub fn view(&self) -> PopupView {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, PopupView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `change` and returns the resulting view.
    fn update(&self, change: impl FnOnce(&mut PopupView)) -> PopupView {
        let mut view = self.lock();
        change(&mut view);
        view.clone()
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Loads the key, the resume, and any selection captured while closed.
    pub async fn initialize(&self) -> PopupView {
        let api_key = self.store.api_key().await.unwrap_or_else(|e| {
            warn!("Failed to load API key: {e}");
            None
        });
        if api_key.is_some() {
            info!("API key loaded");
        } else {
            info!("No API key found, showing settings");
        }

        let resume = self.store.resume().await.unwrap_or_else(|e| {
            warn!("Failed to load resume data: {e}");
            None
        });
        let last_updated = self.store.resume_last_updated().await.unwrap_or_else(|e| {
            warn!("Failed to load resume timestamp: {e}");
            None
        });
        match &resume {
            Some(resume) => info!("Resume data loaded: {}", resume.name),
            None => info!("No resume data found, user needs to upload resume"),
        }

        let restored = match self
            .messenger
            .request(ContextId::Popup, ContextId::Background, Message::GetStoredText)
            .await
        {
            Ok(Reply::StoredText(stored)) if !stored.selected_text.trim().is_empty() => {
                info!(
                    "Restored selected text from storage: {}",
                    preview(&stored.selected_text)
                );
                Some(stored.selected_text)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("No stored text retrieved: {e}");
                None
            }
        };

        self.update(|view| {
            view.has_api_key = api_key.is_some();
            view.show_settings = api_key.is_none();
            view.resume = resume;
            view.resume_last_updated = last_updated;
            if let Some(text) = restored {
                view.selected_text = text;
                view.status = Some(Status::info("Previous text selection restored!"));
            }
        })
    }

    // ── Settings ───────────────────────────────────────────────────────────

    pub async fn save_api_key(&self, api_key: &str) -> PopupView {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return self.update(|view| {
                view.status = Some(Status::error("❌ Please enter a valid API key"));
            });
        }

        match self.store.save_api_key(api_key).await {
            Ok(()) => self.update(|view| {
                view.has_api_key = true;
                view.show_settings = false;
                view.status = Some(Status::success(
                    "✅ API key saved! You can now generate cover letters.",
                ));
            }),
            Err(e) => {
                warn!("Failed to save API key: {e}");
                self.update(|view| {
                    view.status = Some(Status::error("❌ Failed to save API key"));
                })
            }
        }
    }

    // ── Selection ──────────────────────────────────────────────────────────

    /// Asks the tab's content script to enter selection mode. Every call is
    /// forwarded: a session can end on the page without the popup hearing
    /// about it, and the page ignores a start while already active.
    pub async fn start_selection(&self, tab: &ActiveTab) -> PopupView {
        self.update(|view| {
            view.is_selecting = true;
            view.status = Some(Status::info("Starting text selection mode..."));
        });

        if tab.is_internal_page() {
            return self.selection_failed("Error: Cannot select text on Chrome internal pages");
        }

        debug!("Sending START_SELECTION to tab {}", tab.id);
        let reply = self
            .messenger
            .request(ContextId::Popup, ContextId::Tab(tab.id), Message::StartSelection)
            .await;

        match reply {
            Ok(Reply::SelectionStarted(SelectionStarted { success: true, .. })) => {
                self.update(|view| {
                    view.status = Some(Status::info(
                        "✋ Go to the page and select text. The popup will stay open to receive your selection.",
                    ));
                })
            }
            Ok(Reply::SelectionStarted(SelectionStarted {
                error: Some(error), ..
            })) => self.selection_failed(format!("Error: {error}")),
            Ok(_) => self.selection_failed("Error: Could not start text selection"),
            Err(MessengerError::NotDelivered { .. }) => {
                self.selection_failed("Error: Content script not loaded. Try refreshing the page.")
            }
            Err(e) => {
                warn!("Error starting text selection: {e}");
                self.selection_failed("Error: Could not start text selection")
            }
        }
    }

    fn selection_failed(&self, message: impl Into<String>) -> PopupView {
        self.update(|view| {
            view.is_selecting = false;
            view.status = Some(Status::error(message));
        })
    }

    /// Handles a message from another context.
    pub fn on_message(&self, message: Message) -> PopupView {
        match message {
            Message::SelectedText(text) => {
                info!("Popup received selected text: {}", preview(&text));
                self.update(|view| {
                    view.selected_text = text;
                    view.is_selecting = false;
                    view.status = Some(Status::success("Text captured successfully!"));
                })
            }
            Message::JobText(text) => {
                debug!("Popup received page text: {}", preview(&text));
                self.update(|view| view.page_text = text)
            }
            Message::GetStoredText | Message::StartSelection => {
                debug!("Popup ignores {}", message.tag());
                self.view()
            }
        }
    }

    /// Discards the selection, the letter, and the persisted capture.
    pub async fn clear_text(&self) -> PopupView {
        if let Err(e) = self.store.clear_selection().await {
            warn!("Failed to clear stored selection: {e}");
        }
        self.update(|view| {
            view.selected_text.clear();
            view.status = None;
            view.cover_letter = None;
        })
    }

    // ── Cover letter ───────────────────────────────────────────────────────

    /// Generates a letter for the current selection. Calling again regenerates.
    pub async fn generate_cover_letter(&self) -> PopupView {
        let (job_text, busy) = {
            let view = self.lock();
            (view.selected_text.clone(), view.is_generating)
        };
        if busy {
            debug!("Cover letter generation already in progress");
            return self.view();
        }

        if job_text.trim().is_empty() {
            return self.generation_failed(&CoverLetterError::EmptyJobText);
        }

        let api_key = match self.store.api_key().await {
            Ok(Some(key)) => key,
            Ok(None) => return self.generation_failed(&CoverLetterError::MissingApiKey),
            Err(e) => {
                warn!("Failed to load API key: {e}");
                return self.generation_failed(&CoverLetterError::MissingApiKey);
            }
        };

        let resume = match self.store.resume().await {
            Ok(resume) => resume.filter(ResumeRecord::is_usable),
            Err(e) => {
                warn!("Failed to load resume data: {e}");
                None
            }
        };
        let Some(resume) = resume else {
            return self.update(|view| {
                view.show_resume_uploader = true;
                view.status = Some(Status::info(
                    "📄 Please upload your resume first for personalized cover letters!",
                ));
            });
        };

        self.update(|view| {
            view.is_generating = true;
            view.cover_letter = None;
            view.status = Some(Status::info("🤖 Generating personalized cover letter..."));
        });

        let result = self
            .generator
            .generate(Some(&api_key), &job_text, Some(&resume))
            .await;

        match result {
            Ok(letter) => self.update(|view| {
                view.is_generating = false;
                view.cover_letter = Some(letter);
                view.status = Some(Status::success("✅ Cover letter generated successfully!"));
            }),
            Err(e) => {
                self.update(|view| view.is_generating = false);
                self.generation_failed(&e)
            }
        }
    }

    fn generation_failed(&self, error: &CoverLetterError) -> PopupView {
        self.update(|view| {
            if error.opens_settings() {
                view.show_settings = true;
            }
            let status = match error {
                CoverLetterError::EmptyJobText => Status::info(error.user_message()),
                _ => Status::error(error.user_message()),
            };
            view.status = Some(status);
        })
    }

    // ── Resume ─────────────────────────────────────────────────────────────

    /// Parses an uploaded file into a draft for review. Nothing is saved.
    pub async fn upload_resume(&self, file: ResumeFile) -> PopupView {
        self.update(|view| {
            view.is_uploading = true;
            view.show_resume_uploader = true;
            view.upload_error = None;
            view.status = Some(Status::info("📄 Uploading and parsing resume with AI..."));
        });

        let api_key = self.store.api_key().await.unwrap_or_else(|e| {
            warn!("Failed to load API key: {e}");
            None
        });
        let result = self
            .resume_parser
            .parse_resume_file(api_key.as_deref(), &file)
            .await;

        self.update(|view| {
            view.is_uploading = false;
            match result {
                Ok(record) => {
                    view.resume_draft = Some(record);
                    view.status = Some(Status::success(
                        "✅ Resume parsed successfully! Please review and edit as needed.",
                    ));
                }
                Err(e) => {
                    warn!(
                        "Error parsing resume: {e} ({})",
                        e.detail().unwrap_or("no detail")
                    );
                    if e.opens_settings() {
                        view.show_settings = true;
                    }
                    let message = e.user_message();
                    view.status = Some(Status::error(format!("❌ Error: {message}")));
                    view.upload_error = Some(message);
                }
            }
        })
    }

    /// Saves a reviewed or manually entered resume, replacing the stored one.
    pub async fn save_resume(&self, record: ResumeRecord) -> PopupView {
        let record = record.normalized();
        if !record.is_usable() {
            return self.update(|view| {
                view.status = Some(Status::error("❌ Please provide at least name and email"));
            });
        }

        match self.store.save_resume(&record).await {
            Ok(saved_at) => self.update(|view| {
                view.resume = Some(record);
                view.resume_last_updated = Some(saved_at);
                view.resume_draft = None;
                view.upload_error = None;
                view.show_resume_uploader = false;
                view.status = Some(Status::success(
                    "✅ Resume data saved! You can now generate personalized cover letters.",
                ));
            }),
            Err(e) => {
                warn!("Failed to save resume data: {e}");
                self.update(|view| {
                    view.status = Some(Status::error("❌ Failed to save resume data"));
                })
            }
        }
    }

    pub async fn clear_resume(&self) -> PopupView {
        match self.store.clear_resume().await {
            Ok(()) => self.update(|view| {
                view.resume = None;
                view.resume_last_updated = None;
                view.status = Some(Status::info("Resume data cleared"));
            }),
            Err(e) => {
                warn!("Failed to clear resume data: {e}");
                self.update(|view| {
                    view.status = Some(Status::error("❌ Failed to clear resume data"));
                })
            }
        }
    }
}

#[async_trait]
impl MessageHandler for PopupController {
    async fn handle(&mut self, envelope: Envelope) {
        debug!("Popup received {} from {}", envelope.message.tag(), envelope.from);
        let (_, message, _) = envelope.into_parts();
        self.on_message(message);
    }
}
