//! Extension runtime: hosts the background, popup, and page contexts as
//! independent tasks that share nothing but the `Messenger` and storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::background::BackgroundService;
use crate::cover_letter::CoverLetterGenerator;
use crate::errors::AppError;
use crate::llm_client::GenerativeModel;
use crate::messaging::{ContextId, Messenger, TabId};
use crate::popup::{ActiveTab, PopupController, PopupView};
use crate::resume::ResumeParser;
use crate::selection::{ContentScript, PageEvent, PageSnapshot, SimulatedPage};
use crate::storage::ExtensionStore;

struct OpenPopup {
    controller: PopupController,
    listener: JoinHandle<()>,
}

struct TabHandle {
    page: SimulatedPage,
    events: mpsc::UnboundedSender<PageEvent>,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    pub page: PageSnapshot,
}

pub struct ExtensionRuntime {
    store: ExtensionStore,
    messenger: Messenger,
    resume_parser: ResumeParser,
    generator: CoverLetterGenerator,
    popup: Mutex<Option<OpenPopup>>,
    tabs: Mutex<HashMap<TabId, TabHandle>>,
    next_tab: AtomicU32,
    background: JoinHandle<()>,
}

impl ExtensionRuntime {
    /// Starts the background context. Popup and tabs are opened on demand.
    pub async fn start(store: ExtensionStore, model: Arc<dyn GenerativeModel>) -> Self {
        let messenger = Messenger::new();
        let inbox = messenger.connect(ContextId::Background).await;
        let background = tokio::spawn(
            inbox.run(BackgroundService::new(store.clone(), messenger.clone())),
        );
        info!("Background context started");

        Self {
            store,
            messenger,
            resume_parser: ResumeParser::new(model.clone()),
            generator: CoverLetterGenerator::new(model),
            popup: Mutex::new(None),
            tabs: Mutex::new(HashMap::new()),
            next_tab: AtomicU32::new(1),
            background,
        }
    }

    pub fn store(&self) -> &ExtensionStore {
        &self.store
    }

    // ── Popup ──────────────────────────────────────────────────────────────

    /// Opens the popup, or returns the current view if it is already open.
    pub async fn open_popup(&self) -> PopupView {
        let mut popup = self.popup.lock().await;
        if let Some(open) = popup.as_ref() {
            return open.controller.view();
        }

        let controller = PopupController::new(
            self.store.clone(),
            self.messenger.clone(),
            self.resume_parser.clone(),
            self.generator.clone(),
        );
        let inbox = self.messenger.connect(ContextId::Popup).await;
        let listener = tokio::spawn(inbox.run(controller.clone()));
        let view = controller.initialize().await;
        *popup = Some(OpenPopup {
            controller,
            listener,
        });
        info!("Popup opened");
        view
    }

    /// Closes the popup. Its state is discarded; storage is kept.
    pub async fn close_popup(&self) -> bool {
        let Some(open) = self.popup.lock().await.take() else {
            return false;
        };
        self.messenger.disconnect(ContextId::Popup).await;
        open.listener.abort();
        info!("Popup closed");
        true
    }

    pub async fn is_popup_open(&self) -> bool {
        self.messenger.is_connected(ContextId::Popup).await
    }

    pub async fn popup(&self) -> Result<PopupController, AppError> {
        self.popup
            .lock()
            .await
            .as_ref()
            .map(|open| open.controller.clone())
            .ok_or(AppError::PopupClosed)
    }

    // ── Tabs ───────────────────────────────────────────────────────────────

    /// Opens a page and injects the content script, which announces the page text.
    pub async fn open_tab(
        &self,
        url: impl Into<String>,
        title: impl Into<String>,
        body_text: impl Into<String>,
    ) -> TabInfo {
        let id = TabId(self.next_tab.fetch_add(1, Ordering::Relaxed));
        let page = SimulatedPage::new(url, title, body_text);

        let inbox = self.messenger.connect(ContextId::Tab(id)).await;
        let (events, events_rx) = mpsc::unbounded_channel();
        let script = ContentScript::new(id, page.clone(), self.messenger.clone());
        let task = tokio::spawn(script.run(inbox, events_rx));

        let info = TabInfo {
            id,
            page: page.snapshot(),
        };
        self.tabs
            .lock()
            .await
            .insert(id, TabHandle { page, events, task });
        info!("Tab {id} opened: {}", info.page.url);
        info
    }

    pub async fn close_tab(&self, id: TabId) -> Result<(), AppError> {
        let handle = self
            .tabs
            .lock()
            .await
            .remove(&id)
            .ok_or(AppError::TabNotFound(id))?;
        self.messenger.disconnect(ContextId::Tab(id)).await;
        handle.task.abort();
        info!("Tab {id} closed");
        Ok(())
    }

    pub async fn tab(&self, id: TabId) -> Result<TabInfo, AppError> {
        let tabs = self.tabs.lock().await;
        let handle = tabs.get(&id).ok_or(AppError::TabNotFound(id))?;
        Ok(TabInfo {
            id,
            page: handle.page.snapshot(),
        })
    }

    pub async fn active_tab(&self, id: TabId) -> Result<ActiveTab, AppError> {
        let tab = self.tab(id).await?;
        Ok(ActiveTab {
            id,
            url: tab.page.url,
        })
    }

    /// Sets the user's selection on a page, as a mouse drag would.
    pub async fn select_text(&self, id: TabId, text: &str) -> Result<TabInfo, AppError> {
        let tabs = self.tabs.lock().await;
        let handle = tabs.get(&id).ok_or(AppError::TabNotFound(id))?;
        handle.page.select_text(text);
        Ok(TabInfo {
            id,
            page: handle.page.snapshot(),
        })
    }

    /// Queues a pointer or key event for the page's content script.
    pub async fn dispatch_event(&self, id: TabId, event: PageEvent) -> Result<(), AppError> {
        let tabs = self.tabs.lock().await;
        let handle = tabs.get(&id).ok_or(AppError::TabNotFound(id))?;
        if handle.events.send(event).is_err() {
            debug!("Content script on tab {id} has stopped; event dropped");
        }
        Ok(())
    }
}

impl Drop for ExtensionRuntime {
    fn drop(&mut self) {
        self.background.abort();
        if let Some(open) = self.popup.get_mut().take() {
            open.listener.abort();
        }
        for (_, handle) in self.tabs.get_mut().drain() {
            handle.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{LlmError, Part};
    use crate::popup::Status;
    use crate::resume::ResumeRecord;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StaticModel;

    #[async_trait]
    impl GenerativeModel for StaticModel {
        async fn generate_content(
            &self,
            _api_key: &str,
            _parts: Vec<Part>,
        ) -> Result<String, LlmError> {
            Ok("Dear Hiring Manager,".to_string())
        }
    }

    async fn runtime() -> ExtensionRuntime {
        let store = ExtensionStore::new(Arc::new(MemoryStorage::new()));
        ExtensionRuntime::start(store, Arc::new(StaticModel)).await
    }

    /// Polls the popup until `done` holds, giving the context tasks time to run.
    async fn wait_for(runtime: &ExtensionRuntime, done: impl Fn(&PopupView) -> bool) -> PopupView {
        for _ in 0..100 {
            let view = runtime.popup().await.unwrap().view();
            if done(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("popup never reached the expected state");
    }

    #[tokio::test]
    async fn test_popup_must_be_open() {
        let runtime = runtime().await;
        assert!(matches!(runtime.popup().await, Err(AppError::PopupClosed)));
        runtime.open_popup().await;
        assert!(runtime.popup().await.is_ok());
        assert!(runtime.is_popup_open().await);
        assert!(runtime.close_popup().await);
        assert!(!runtime.close_popup().await);
    }

    #[tokio::test]
    async fn test_unknown_tab_is_not_found() {
        let runtime = runtime().await;
        assert!(matches!(
            runtime.dispatch_event(TabId(42), PageEvent::PointerUp).await,
            Err(AppError::TabNotFound(TabId(42)))
        ));
    }

    #[tokio::test]
    async fn test_select_and_capture_end_to_end() {
        let runtime = runtime().await;
        runtime.open_popup().await;
        let tab = runtime
            .open_tab("https://jobs.example.com/1", "Rust Engineer", "We need Rust.")
            .await;

        let popup = runtime.popup().await.unwrap();
        let view = popup.start_selection(&runtime.active_tab(tab.id).await.unwrap()).await;
        assert!(view.is_selecting);
        assert_eq!(runtime.tab(tab.id).await.unwrap().page.overlay_count, 1);

        runtime.select_text(tab.id, "  5 years of Rust  ").await.unwrap();
        runtime.dispatch_event(tab.id, PageEvent::PointerUp).await.unwrap();

        let view = wait_for(&runtime, |v| !v.selected_text.is_empty()).await;
        assert_eq!(view.selected_text, "5 years of Rust");
        assert!(!view.is_selecting);
        assert_eq!(view.status, Some(Status::success("Text captured successfully!")));
        assert_eq!(view.page_text, "We need Rust.");

        let page = runtime.tab(tab.id).await.unwrap().page;
        assert_eq!(page.overlay_count, 0);
        assert_eq!(page.selection, "");
    }

    #[tokio::test]
    async fn test_selection_can_restart_after_escape_with_nothing_selected() {
        let runtime = runtime().await;
        runtime.open_popup().await;
        let tab = runtime
            .open_tab("https://jobs.example.com/2", "Go Engineer", "We need Go.")
            .await;
        let active = runtime.active_tab(tab.id).await.unwrap();
        let popup = runtime.popup().await.unwrap();

        popup.start_selection(&active).await;
        assert_eq!(runtime.tab(tab.id).await.unwrap().page.overlay_count, 1);

        runtime
            .dispatch_event(tab.id, PageEvent::key("Escape"))
            .await
            .unwrap();
        let mut torn_down = false;
        for _ in 0..100 {
            if runtime.tab(tab.id).await.unwrap().page.overlay_count == 0 {
                torn_down = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(torn_down);

        let view = popup.start_selection(&active).await;
        assert!(view.is_selecting);
        assert_eq!(runtime.tab(tab.id).await.unwrap().page.overlay_count, 1);

        runtime.select_text(tab.id, "Go and Kubernetes").await.unwrap();
        runtime.dispatch_event(tab.id, PageEvent::PointerUp).await.unwrap();
        let view = wait_for(&runtime, |v| !v.selected_text.is_empty()).await;
        assert_eq!(view.selected_text, "Go and Kubernetes");
    }

    #[tokio::test]
    async fn test_capture_while_popup_closed_is_restored_on_open() {
        let runtime = runtime().await;
        runtime.open_popup().await;
        let tab = runtime.open_tab("https://jobs.example.com/2", "SRE", "SRE role").await;
        let popup = runtime.popup().await.unwrap();
        popup.start_selection(&runtime.active_tab(tab.id).await.unwrap()).await;
        runtime.close_popup().await;

        runtime.select_text(tab.id, "On-call experience").await.unwrap();
        runtime.dispatch_event(tab.id, PageEvent::key("Enter")).await.unwrap();

        let mut restored = None;
        for _ in 0..100 {
            let stored = runtime.store().stored_selection().await.unwrap();
            if !stored.selected_text.is_empty() {
                restored = Some(stored);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(restored.unwrap().selected_text, "On-call experience");

        let view = runtime.open_popup().await;
        assert_eq!(view.selected_text, "On-call experience");
        assert_eq!(
            view.status,
            Some(Status::info("Previous text selection restored!"))
        );
    }

    #[tokio::test]
    async fn test_generate_after_capture() {
        let runtime = runtime().await;
        runtime.store().save_api_key("key").await.unwrap();
        runtime
            .store()
            .save_resume(&ResumeRecord {
                name: "Jane Doe".to_string(),
                email: "jane@x.com".to_string(),
                ..ResumeRecord::default()
            })
            .await
            .unwrap();
        runtime.open_popup().await;
        let tab = runtime.open_tab("https://jobs.example.com/3", "Job", "Job").await;
        let popup = runtime.popup().await.unwrap();
        popup.start_selection(&runtime.active_tab(tab.id).await.unwrap()).await;
        runtime.select_text(tab.id, "Platform engineer").await.unwrap();
        runtime.dispatch_event(tab.id, PageEvent::key("Escape")).await.unwrap();
        wait_for(&runtime, |v| v.selected_text == "Platform engineer").await;

        let view = popup.generate_cover_letter().await;
        assert_eq!(view.cover_letter.as_deref(), Some("Dear Hiring Manager,"));
    }

    #[tokio::test]
    async fn test_closed_tab_no_longer_receives_requests() {
        let runtime = runtime().await;
        runtime.open_popup().await;
        let tab = runtime.open_tab("https://jobs.example.com/4", "Job", "Job").await;
        let active = runtime.active_tab(tab.id).await.unwrap();
        runtime.close_tab(tab.id).await.unwrap();

        let view = runtime.popup().await.unwrap().start_selection(&active).await;
        assert_eq!(
            view.status,
            Some(Status::error(
                "Error: Content script not loaded. Try refreshing the page."
            ))
        );
        assert!(matches!(
            runtime.close_tab(tab.id).await,
            Err(AppError::TabNotFound(_))
        ));
    }
}
