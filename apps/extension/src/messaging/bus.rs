use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::debug;

use super::{
    ContextId, Delivery, Envelope, Message, MessageHandler, MessengerError, Reply, Responder,
};

type Route = mpsc::UnboundedSender<Envelope>;

/// Routes envelopes between connected contexts. Cheap to clone; clones share routes.
#[derive(Clone, Default)]
pub struct Messenger {
    routes: Arc<RwLock<HashMap<ContextId, Route>>>,
}

impl Messenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` as listening. A context has exactly one listener:
    /// connecting again replaces the previous inbox, which then closes.
    pub async fn connect(&self, id: ContextId) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.routes.write().await.insert(id, tx).is_some() {
            debug!("Replaced existing listener for {id}");
        }
        debug!("{id} connected");
        Inbox { id, rx }
    }

    /// Stops delivery to `id`. Returns whether it was connected.
    pub async fn disconnect(&self, id: ContextId) -> bool {
        let removed = self.routes.write().await.remove(&id).is_some();
        if removed {
            debug!("{id} disconnected");
        }
        removed
    }

    pub async fn is_connected(&self, id: ContextId) -> bool {
        self.routes
            .read()
            .await
            .get(&id)
            .is_some_and(|route| !route.is_closed())
    }

    /// Fire-and-forget delivery. An absent listener is reported, not raised.
    pub async fn send(&self, from: ContextId, to: ContextId, message: Message) -> Delivery {
        if message.expects_reply() {
            debug!("{} sent without a reply channel; use request()", message.tag());
        }
        self.dispatch(to, Envelope::new(from, message)).await
    }

    /// Delivers `message` and waits for the single reply. No timeout is applied:
    /// the call resolves when the receiver replies or drops the envelope.
    pub async fn request(
        &self,
        from: ContextId,
        to: ContextId,
        message: Message,
    ) -> Result<Reply, MessengerError> {
        let (tx, rx) = oneshot::channel();
        let envelope = Envelope::new(from, message).with_responder(Responder(tx));
        match self.dispatch(to, envelope).await {
            Delivery::Delivered => rx.await.map_err(|_| MessengerError::NoReply { to }),
            Delivery::NotDelivered => Err(MessengerError::NotDelivered { to }),
        }
    }

    async fn dispatch(&self, to: ContextId, envelope: Envelope) -> Delivery {
        let tag = envelope.message.tag();
        let from = envelope.from;
        let route = self.routes.read().await.get(&to).cloned();
        let Some(route) = route else {
            debug!("{tag} from {from} not delivered: {to} is not listening");
            return Delivery::NotDelivered;
        };

        if route.send(envelope).is_err() {
            // The inbox was dropped without disconnecting; forget the stale route.
            let mut routes = self.routes.write().await;
            if routes.get(&to).is_some_and(|r| r.same_channel(&route)) {
                routes.remove(&to);
            }
            debug!("{tag} from {from} not delivered: {to} stopped listening");
            return Delivery::NotDelivered;
        }

        debug!("{tag} delivered {from} -> {to}");
        Delivery::Delivered
    }
}

/// The receiving side of a connected context.
#[derive(Debug)]
pub struct Inbox {
    id: ContextId,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Inbox {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Takes an already-delivered envelope without waiting.
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Feeds every envelope to `handler` in delivery order until the context disconnects.
    pub async fn run<H: MessageHandler>(mut self, mut handler: H) {
        while let Some(envelope) = self.rx.recv().await {
            handler.handle(envelope).await;
        }
        debug!("{} inbox closed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{SelectionStarted, TabId};
    use crate::storage::StoredText;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle(&mut self, mut envelope: Envelope) {
            if let Message::GetStoredText = envelope.message {
                envelope.reply(Reply::StoredText(StoredText {
                    selected_text: "echo".to_string(),
                    timestamp: Some(1),
                }));
            }
        }
    }

    #[tokio::test]
    async fn test_send_to_absent_context_is_not_delivered() {
        let messenger = Messenger::new();
        let delivery = messenger
            .send(
                ContextId::Background,
                ContextId::Popup,
                Message::SelectedText("x".to_string()),
            )
            .await;
        assert_eq!(delivery, Delivery::NotDelivered);
    }

    #[tokio::test]
    async fn test_send_delivers_in_order() {
        let messenger = Messenger::new();
        let mut inbox = messenger.connect(ContextId::Popup).await;

        for text in ["one", "two", "three"] {
            let delivery = messenger
                .send(
                    ContextId::Background,
                    ContextId::Popup,
                    Message::SelectedText(text.to_string()),
                )
                .await;
            assert_eq!(delivery, Delivery::Delivered);
        }

        for text in ["one", "two", "three"] {
            let envelope = inbox.recv().await.unwrap();
            assert_eq!(envelope.from, ContextId::Background);
            assert_eq!(envelope.message, Message::SelectedText(text.to_string()));
            assert!(!envelope.awaits_reply());
        }
    }

    #[tokio::test]
    async fn test_request_receives_reply() {
        let messenger = Messenger::new();
        let inbox = messenger.connect(ContextId::Background).await;
        tokio::spawn(inbox.run(Echo));

        let reply = messenger
            .request(ContextId::Popup, ContextId::Background, Message::GetStoredText)
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::StoredText(StoredText {
                selected_text: "echo".to_string(),
                timestamp: Some(1),
            })
        );
    }

    #[tokio::test]
    async fn test_request_to_absent_context_fails_fast() {
        let messenger = Messenger::new();
        let tab = ContextId::Tab(TabId(3));
        let err = messenger
            .request(ContextId::Popup, tab, Message::StartSelection)
            .await
            .unwrap_err();
        assert_eq!(err, MessengerError::NotDelivered { to: tab });
        assert!(err.to_string().contains("Receiving end does not exist"));
    }

    #[tokio::test]
    async fn test_dropped_responder_resolves_with_no_reply() {
        let messenger = Messenger::new();
        let inbox = messenger.connect(ContextId::Background).await;
        // Echo ignores START_SELECTION, dropping the envelope unanswered.
        tokio::spawn(inbox.run(Echo));

        let err = messenger
            .request(ContextId::Popup, ContextId::Background, Message::StartSelection)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MessengerError::NoReply {
                to: ContextId::Background
            }
        );
    }

    #[tokio::test]
    async fn test_reconnect_replaces_listener() {
        let messenger = Messenger::new();
        let mut first = messenger.connect(ContextId::Popup).await;
        let mut second = messenger.connect(ContextId::Popup).await;

        messenger
            .send(
                ContextId::Background,
                ContextId::Popup,
                Message::JobText("page".to_string()),
            )
            .await;

        assert!(first.recv().await.is_none());
        assert_eq!(
            second.recv().await.unwrap().message,
            Message::JobText("page".to_string())
        );
    }

    #[tokio::test]
    async fn test_disconnect_and_dropped_inbox_stop_delivery() {
        let messenger = Messenger::new();
        let inbox = messenger.connect(ContextId::Popup).await;
        assert!(messenger.is_connected(ContextId::Popup).await);
        assert!(messenger.disconnect(ContextId::Popup).await);
        assert!(!messenger.is_connected(ContextId::Popup).await);
        drop(inbox);

        let tab = ContextId::Tab(TabId(1));
        drop(messenger.connect(tab).await);
        let delivery = messenger
            .send(ContextId::Popup, tab, Message::StartSelection)
            .await;
        assert_eq!(delivery, Delivery::NotDelivered);
        assert!(!messenger.is_connected(tab).await);
    }

    #[tokio::test]
    async fn test_selection_started_reply_round_trip() {
        let messenger = Messenger::new();
        let tab = ContextId::Tab(TabId(9));
        let mut inbox = messenger.connect(tab).await;

        let requester = messenger.clone();
        let pending = tokio::spawn(async move {
            requester
                .request(ContextId::Popup, tab, Message::StartSelection)
                .await
        });

        let mut envelope = inbox.recv().await.unwrap();
        assert!(envelope.awaits_reply());
        envelope.reply(Reply::SelectionStarted(SelectionStarted::ok()));

        assert_eq!(
            pending.await.unwrap().unwrap(),
            Reply::SelectionStarted(SelectionStarted::ok())
        );
    }
}
