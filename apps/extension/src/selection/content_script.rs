//! Content script: the page context's entry point. Announces the page text,
//! answers `START_SELECTION`, and turns finished sessions into `SELECTED_TEXT`.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::page::{Page, PageError, PageEvent};
use super::{Finish, SelectionSession, SelectionState};
use crate::messaging::{
    preview, ContextId, Envelope, Inbox, Message, MessageHandler, Messenger, Reply,
    SelectionStarted, TabId,
};

pub struct ContentScript<P: Page> {
    tab: TabId,
    page: P,
    messenger: Messenger,
    state: SelectionState,
}

impl<P: Page> ContentScript<P> {
    pub fn new(tab: TabId, page: P, messenger: Messenger) -> Self {
        Self {
            tab,
            page,
            messenger,
            state: SelectionState::Idle,
        }
    }

    #[cfg(test)]
    pub fn is_selecting(&self) -> bool {
        self.state.is_active()
    }

    fn context(&self) -> ContextId {
        ContextId::Tab(self.tab)
    }

    /// Sends the page's full text as `JOB_TEXT`.
    pub async fn announce_page(&self) {
        info!("Content script loaded on {}", self.page.url());
        let text = self.page.body_text();
        self.messenger
            .send(self.context(), ContextId::Background, Message::JobText(text))
            .await;
    }

    /// Enters selection mode. A request while already active is a no-op.
    pub fn start_selection(&mut self) -> Result<(), PageError> {
        if self.state.is_active() {
            debug!("Selection mode already active on tab {}", self.tab);
            return Ok(());
        }
        let session = SelectionSession::activate(&mut self.page)?;
        self.state = SelectionState::Active(session);
        Ok(())
    }

    /// Routes a page event to the active session. Events while idle are
    /// ignored: no triggers are registered then.
    pub async fn handle_page_event(&mut self, event: PageEvent) -> Option<Finish> {
        let SelectionState::Active(session) = &self.state else {
            return None;
        };
        let finish = session.on_event(&self.page, &event)?;

        if let SelectionState::Active(session) = std::mem::take(&mut self.state) {
            session.finish(&mut self.page);
        }

        match &finish {
            Finish::Captured(text) => {
                info!(
                    "Text copied from page ({} characters): {}",
                    text.chars().count(),
                    preview(text)
                );
                self.messenger
                    .send(
                        self.context(),
                        ContextId::Background,
                        Message::SelectedText(text.clone()),
                    )
                    .await;
            }
            Finish::Empty => warn!("No text selected when finishing selection mode"),
        }
        Some(finish)
    }

    /// Runs the page context: announces the page, then handles messages and
    /// page events on one task until either source closes.
    pub async fn run(mut self, mut inbox: Inbox, mut events: mpsc::UnboundedReceiver<PageEvent>)
    where
        P: 'static,
    {
        self.announce_page().await;
        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => self.handle(envelope).await,
                    None => break,
                },
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_page_event(event).await;
                    }
                    None => break,
                },
            }
        }
        debug!("Content script on tab {} stopped", self.tab);
    }
}

#[async_trait]
impl<P: Page + 'static> MessageHandler for ContentScript<P> {
    async fn handle(&mut self, mut envelope: Envelope) {
        debug!(
            "Content script received {} from {}",
            envelope.message.tag(),
            envelope.from
        );
        match envelope.message {
            Message::StartSelection => {
                let reply = match self.start_selection() {
                    Ok(()) => {
                        info!("Text selection started on tab {}", self.tab);
                        SelectionStarted::ok()
                    }
                    Err(e) => {
                        error!("Error starting text selection: {e}");
                        SelectionStarted::failed(e.to_string())
                    }
                };
                envelope.reply(Reply::SelectionStarted(reply));
            }
            Message::JobText(_) | Message::SelectedText(_) | Message::GetStoredText => {
                debug!("Content script ignores {}", envelope.message.tag());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::page::SimulatedPage;

    fn job_page() -> SimulatedPage {
        SimulatedPage::new(
            "https://jobs.example.com/rust",
            "Senior Rust Engineer",
            "Senior Rust Engineer\nWe build payment rails.",
        )
    }

    async fn script_with_background_inbox() -> (ContentScript<SimulatedPage>, SimulatedPage, Inbox)
    {
        let messenger = Messenger::new();
        let background = messenger.connect(ContextId::Background).await;
        let page = job_page();
        let script = ContentScript::new(TabId(1), page.clone(), messenger);
        (script, page, background)
    }

    #[tokio::test]
    async fn test_announce_page_sends_job_text() {
        let (script, _page, mut background) = script_with_background_inbox().await;
        script.announce_page().await;

        let envelope = background.recv().await.unwrap();
        assert_eq!(envelope.from, ContextId::Tab(TabId(1)));
        assert_eq!(
            envelope.message,
            Message::JobText("Senior Rust Engineer\nWe build payment rails.".to_string())
        );
    }

    #[tokio::test]
    async fn test_repeated_start_is_idempotent() {
        let (mut script, page, _background) = script_with_background_inbox().await;
        script.start_selection().unwrap();
        script.start_selection().unwrap();

        assert!(script.is_selecting());
        let snapshot = page.snapshot();
        assert_eq!(snapshot.overlay_count, 1);
        assert_eq!(snapshot.trigger_sets, 1);
    }

    #[tokio::test]
    async fn test_pointer_up_with_selection_emits_exactly_one_message() {
        let (mut script, page, mut background) = script_with_background_inbox().await;
        script.start_selection().unwrap();
        page.select_text("  Must know Rust  ");

        let finish = script.handle_page_event(PageEvent::PointerUp).await;
        assert_eq!(finish, Some(Finish::Captured("Must know Rust".to_string())));
        assert!(!script.is_selecting());

        let envelope = background.recv().await.unwrap();
        assert_eq!(
            envelope.message,
            Message::SelectedText("Must know Rust".to_string())
        );
        assert!(background.try_recv().is_none());

        // Session is gone, so further events do nothing.
        page.select_text("more");
        assert_eq!(script.handle_page_event(PageEvent::PointerUp).await, None);
        assert!(background.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_enter_without_selection_emits_nothing() {
        let (mut script, page, mut background) = script_with_background_inbox().await;
        script.start_selection().unwrap();

        let finish = script.handle_page_event(PageEvent::key("Enter")).await;
        assert_eq!(finish, Some(Finish::Empty));
        assert!(!script.is_selecting());
        assert!(background.try_recv().is_none());

        let snapshot = page.snapshot();
        assert_eq!(snapshot.overlay_count, 0);
        assert_eq!(snapshot.trigger_sets, 0);
    }

    #[tokio::test]
    async fn test_events_while_idle_are_ignored() {
        let (mut script, page, mut background) = script_with_background_inbox().await;
        page.select_text("stray selection");
        assert_eq!(script.handle_page_event(PageEvent::PointerUp).await, None);
        assert!(background.try_recv().is_none());
        assert_eq!(page.snapshot().selection, "stray selection");
    }

    #[tokio::test]
    async fn test_start_selection_request_replies_success() {
        let messenger = Messenger::new();
        let tab = TabId(5);
        let page = job_page();
        let inbox = messenger.connect(ContextId::Tab(tab)).await;
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let script = ContentScript::new(tab, page.clone(), messenger.clone());
        tokio::spawn(script.run(inbox, events_rx));

        for _ in 0..2 {
            let reply = messenger
                .request(ContextId::Popup, ContextId::Tab(tab), Message::StartSelection)
                .await
                .unwrap();
            assert_eq!(reply, Reply::SelectionStarted(SelectionStarted::ok()));
        }
        assert_eq!(page.snapshot().overlay_count, 1);
    }

    #[tokio::test]
    async fn test_start_selection_failure_is_reported_in_reply() {
        let messenger = Messenger::new();
        let tab = TabId(6);
        let page = job_page();
        page.detach_body();
        let inbox = messenger.connect(ContextId::Tab(tab)).await;
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let script = ContentScript::new(tab, page.clone(), messenger.clone());
        tokio::spawn(script.run(inbox, events_rx));

        let reply = messenger
            .request(ContextId::Popup, ContextId::Tab(tab), Message::StartSelection)
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::SelectionStarted(SelectionStarted::failed("Page has no document body"))
        );
        assert_eq!(page.snapshot().overlay_count, 0);
    }

    #[tokio::test]
    async fn test_run_loop_forwards_captured_selection() {
        let messenger = Messenger::new();
        let mut background = messenger.connect(ContextId::Background).await;
        let tab = TabId(8);
        let page = job_page();
        let inbox = messenger.connect(ContextId::Tab(tab)).await;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let script = ContentScript::new(tab, page.clone(), messenger.clone());
        tokio::spawn(script.run(inbox, events_rx));

        // Page announcement comes first.
        assert!(matches!(
            background.recv().await.unwrap().message,
            Message::JobText(_)
        ));

        messenger
            .request(ContextId::Popup, ContextId::Tab(tab), Message::StartSelection)
            .await
            .unwrap();
        page.select_text("Distributed systems experience");
        events_tx.send(PageEvent::key("Escape")).unwrap();

        let envelope = background.recv().await.unwrap();
        assert_eq!(envelope.from, ContextId::Tab(tab));
        assert_eq!(
            envelope.message,
            Message::SelectedText("Distributed systems experience".to_string())
        );
    }
}
