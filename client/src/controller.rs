//! Chat session controller: drives a `ChatSession` from user actions, REST
//! results and the live channel of the signed-in user.

use std::sync::Arc;

use campus_chat_protocol::Message;

use crate::api::ChatApi;
use crate::error::ClientError;
use crate::live::{LiveChannel, LiveConnector, LiveSignal};
use crate::session::ChatSession;

/// The signed-in user as handed over by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub token: String,
}

pub struct ChatController {
    api: Arc<dyn ChatApi>,
    connector: Arc<dyn LiveConnector>,
    identity: Option<Identity>,
    session: Option<ChatSession>,
    live: Option<LiveChannel>,
}

impl ChatController {
    pub fn new(api: Arc<dyn ChatApi>, connector: Arc<dyn LiveConnector>) -> Self {
        Self {
            api,
            connector,
            identity: None,
            session: None,
            live: None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.live.as_ref().is_some_and(LiveChannel::is_open)
    }

    /// Switch the signed-in user. The current live channel is closed first;
    /// a new one is opened for `identity`, or none on sign-out. Session state
    /// starts fresh either way.
    pub async fn set_identity(&mut self, identity: Option<Identity>) -> Result<(), ClientError> {
        if let Some(mut live) = self.live.take() {
            live.close();
        }
        self.session = None;
        self.identity = None;

        let Some(identity) = identity else {
            tracing::info!("Signed out, live channel closed");
            return Ok(());
        };

        self.session = Some(ChatSession::new(identity.user_id.clone()));
        let token = identity.token.clone();
        tracing::info!(user_id = %identity.user_id, "Opening live channel");
        self.identity = Some(identity);

        let channel = self.connector.connect(&token).await?;
        self.live = Some(channel);
        Ok(())
    }

    /// Open the conversation with `peer` and load its history.
    pub async fn select_peer(&mut self, peer: &str) -> Result<(), ClientError> {
        let token = self.token()?;
        let ticket = self.session_mut()?.select_peer(peer);

        let result = self.api.fetch_history(&token, peer).await;
        let session = self.session_mut()?;
        match result {
            Ok(messages) => {
                session.history_loaded(ticket, messages);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(peer_id = %peer, error = %err, "History fetch failed");
                session.history_failed(ticket);
                Err(err)
            }
        }
    }

    /// Close the open conversation. Live messages stop landing in the
    /// session and sends are rejected until another peer is selected.
    pub fn deselect_peer(&mut self) -> Result<(), ClientError> {
        let session = self.session_mut()?;
        if let Some(peer) = session.selected_peer() {
            tracing::debug!(peer_id = %peer, "Conversation closed");
        }
        session.deselect();
        Ok(())
    }

    /// Stage an image for the next send.
    pub fn attach_image(&mut self, mime: &str, bytes: Vec<u8>) -> Result<(), ClientError> {
        self.session_mut()?.attach_image(mime, bytes)
    }

    /// Send `text` (and the staged image, if any) to the open conversation.
    /// Rejected locally, with no request issued, when there is nothing to send.
    pub async fn send(&mut self, text: Option<&str>) -> Result<Message, ClientError> {
        let token = self.token()?;
        let outgoing = self.session_mut()?.begin_send(text)?;

        let result = self
            .api
            .send_message(&token, &outgoing.peer, &outgoing.request)
            .await;
        self.session_mut()?.complete_send(result)
    }

    /// Refresh the online set over REST.
    pub async fn refresh_presence(&mut self) -> Result<(), ClientError> {
        let token = self.token()?;
        let online = self.api.fetch_presence(&token).await?;
        self.session_mut()?.set_online(online);
        Ok(())
    }

    /// Wait for the next live signal and fold it into the session. Returns
    /// `None` when no channel is open; a `Closed` signal drops the channel.
    pub async fn next_signal(&mut self) -> Option<LiveSignal> {
        let live = self.live.as_mut()?;
        let signal = live.recv().await.unwrap_or(LiveSignal::Closed { code: None });

        match &signal {
            LiveSignal::Event(event) => {
                if let Some(session) = self.session.as_mut() {
                    session.apply_event(event.clone());
                }
            }
            LiveSignal::Closed { code } => {
                tracing::info!(?code, "Live channel ended");
                self.live = None;
            }
        }
        Some(signal)
    }

    fn token(&self) -> Result<String, ClientError> {
        self.identity
            .as_ref()
            .map(|identity| identity.token.clone())
            .ok_or(ClientError::SignedOut)
    }

    fn session_mut(&mut self) -> Result<&mut ChatSession, ClientError> {
        self.session.as_mut().ok_or(ClientError::SignedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use campus_chat_protocol::{LiveEvent, SendMessageRequest};
    use chrono::Utc;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    use crate::session::SessionState;

    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<String>>,
        history: Mutex<Vec<Message>>,
        fail_send: bool,
    }

    impl FakeApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatApi for FakeApi {
        async fn fetch_history(&self, token: &str, peer: &str) -> Result<Vec<Message>, ClientError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("history {} {}", token, peer));
            Ok(self.history.lock().unwrap().clone())
        }

        async fn send_message(
            &self,
            token: &str,
            peer: &str,
            request: &SendMessageRequest,
        ) -> Result<Message, ClientError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("send {} {}", token, peer));
            if self.fail_send {
                return Err(ClientError::Server {
                    status: 503,
                    message: "Message store unavailable".to_string(),
                });
            }
            Ok(Message {
                id: "sent-1".to_string(),
                sender_id: "alice".to_string(),
                receiver_id: peer.to_string(),
                text: request.text.clone(),
                image_url: request.image.as_ref().map(|_| "/media/x.png".to_string()),
                created_at: Utc::now(),
            })
        }

        async fn fetch_presence(&self, _token: &str) -> Result<Vec<String>, ClientError> {
            self.calls.lock().unwrap().push("presence".to_string());
            Ok(vec!["alice".to_string(), "bob".to_string()])
        }
    }

    /// Hands out channels whose feeding ends the test keeps.
    #[derive(Default)]
    struct FakeConnector {
        tokens: Mutex<Vec<String>>,
        feeds: Mutex<Vec<mpsc::UnboundedSender<LiveSignal>>>,
    }

    #[async_trait]
    impl LiveConnector for FakeConnector {
        async fn connect(&self, token: &str) -> Result<LiveChannel, ClientError> {
            self.tokens.lock().unwrap().push(token.to_string());
            let (tx, rx) = mpsc::unbounded_channel();
            self.feeds.lock().unwrap().push(tx);
            Ok(LiveChannel::from_receiver(rx))
        }
    }

    fn alice() -> Identity {
        Identity {
            user_id: "alice".to_string(),
            token: "alice-token".to_string(),
        }
    }

    async fn signed_in(api: Arc<FakeApi>) -> (ChatController, Arc<FakeConnector>) {
        let connector = Arc::new(FakeConnector::default());
        let mut controller = ChatController::new(api, connector.clone());
        controller.set_identity(Some(alice())).await.unwrap();
        (controller, connector)
    }

    #[tokio::test]
    async fn oversized_attachment_never_reaches_the_api() {
        let api = Arc::new(FakeApi::default());
        let (mut controller, _connector) = signed_in(api.clone()).await;
        controller.select_peer("bob").await.unwrap();

        let err = controller
            .attach_image("image/png", vec![0; 3 * 1024 * 1024])
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));

        let err = controller.send(None).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));

        assert_eq!(api.calls(), vec!["history alice-token bob"]);
        assert!(controller.session().unwrap().attachment().is_none());
    }

    #[tokio::test]
    async fn send_appends_returned_message() {
        let api = Arc::new(FakeApi::default());
        let (mut controller, _connector) = signed_in(api.clone()).await;
        controller.select_peer("bob").await.unwrap();
        controller.attach_image("image/webp", vec![1, 2]).unwrap();

        let sent = controller.send(Some("hello")).await.unwrap();

        let session = controller.session().unwrap();
        assert_eq!(session.messages(), &[sent.clone()]);
        assert_eq!(sent.image_url.as_deref(), Some("/media/x.png"));
        assert!(session.attachment().is_none());
        assert!(!session.pending_send());
    }

    #[tokio::test]
    async fn failed_send_leaves_history_untouched() {
        let api = Arc::new(FakeApi {
            fail_send: true,
            ..FakeApi::default()
        });
        let (mut controller, _connector) = signed_in(api.clone()).await;
        controller.select_peer("bob").await.unwrap();

        let err = controller.send(Some("hello")).await.unwrap_err();

        assert!(matches!(err, ClientError::Server { status: 503, .. }));
        let session = controller.session().unwrap();
        assert!(session.messages().is_empty());
        assert!(!session.pending_send());
    }

    #[tokio::test]
    async fn live_events_feed_the_session() {
        let api = Arc::new(FakeApi::default());
        let (mut controller, connector) = signed_in(api).await;
        controller.select_peer("bob").await.unwrap();
        let feed = connector.feeds.lock().unwrap()[0].clone();

        feed.send(LiveSignal::Event(LiveEvent::Presence {
            connected_users: vec!["alice".to_string(), "bob".to_string()],
        }))
        .unwrap();
        feed.send(LiveSignal::Event(LiveEvent::Chat {
            message: Message {
                id: "m1".to_string(),
                sender_id: "bob".to_string(),
                receiver_id: "alice".to_string(),
                text: Some("hey".to_string()),
                image_url: None,
                created_at: Utc::now(),
            },
        }))
        .unwrap();

        controller.next_signal().await.unwrap();
        controller.next_signal().await.unwrap();

        let session = controller.session().unwrap();
        assert!(session.is_online("bob"));
        assert_eq!(session.messages().len(), 1);

        feed.send(LiveSignal::Closed { code: Some(4000) }).unwrap();
        assert_eq!(
            controller.next_signal().await,
            Some(LiveSignal::Closed { code: Some(4000) })
        );
        assert!(!controller.is_live());
        assert_eq!(controller.next_signal().await, None);
    }

    #[tokio::test]
    async fn deselect_peer_closes_the_conversation() {
        let api = Arc::new(FakeApi::default());
        api.history.lock().unwrap().push(Message {
            id: "h1".to_string(),
            sender_id: "bob".to_string(),
            receiver_id: "alice".to_string(),
            text: Some("earlier".to_string()),
            image_url: None,
            created_at: Utc::now(),
        });
        let (mut controller, connector) = signed_in(api.clone()).await;
        controller.select_peer("bob").await.unwrap();
        assert_eq!(controller.session().unwrap().messages().len(), 1);

        controller.deselect_peer().unwrap();

        let session = controller.session().unwrap();
        assert_eq!(session.state(), &SessionState::Idle);
        assert!(session.messages().is_empty());

        let feed = connector.feeds.lock().unwrap()[0].clone();
        feed.send(LiveSignal::Event(LiveEvent::Chat {
            message: Message {
                id: "m2".to_string(),
                sender_id: "bob".to_string(),
                receiver_id: "alice".to_string(),
                text: Some("still there?".to_string()),
                image_url: None,
                created_at: Utc::now(),
            },
        }))
        .unwrap();
        controller.next_signal().await.unwrap();
        assert!(controller.session().unwrap().messages().is_empty());

        let err = controller.send(Some("hello")).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
        assert_eq!(api.calls(), vec!["history alice-token bob"]);

        controller.select_peer("bob").await.unwrap();
        controller.send(Some("hello")).await.unwrap();
        assert_eq!(
            api.calls(),
            vec![
                "history alice-token bob",
                "history alice-token bob",
                "send alice-token bob",
            ]
        );
    }

    #[tokio::test]
    async fn deselect_requires_sign_in() {
        let mut controller = ChatController::new(
            Arc::new(FakeApi::default()),
            Arc::new(FakeConnector::default()),
        );
        assert!(matches!(controller.deselect_peer(), Err(ClientError::SignedOut)));
    }

    #[tokio::test]
    async fn switching_identity_reconnects_and_resets() {
        let api = Arc::new(FakeApi::default());
        let (mut controller, connector) = signed_in(api).await;
        controller.select_peer("bob").await.unwrap();

        controller
            .set_identity(Some(Identity {
                user_id: "carol".to_string(),
                token: "carol-token".to_string(),
            }))
            .await
            .unwrap();

        assert_eq!(
            *connector.tokens.lock().unwrap(),
            vec!["alice-token", "carol-token"]
        );
        let first_feed = connector.feeds.lock().unwrap()[0].clone();
        assert!(first_feed.is_closed());

        let session = controller.session().unwrap();
        assert_eq!(session.user_id(), "carol");
        assert_eq!(session.state(), &SessionState::Idle);

        controller.set_identity(None).await.unwrap();
        assert!(controller.session().is_none());
        assert!(!controller.is_live());
        assert!(matches!(
            controller.send(Some("hi")).await,
            Err(ClientError::SignedOut)
        ));
    }

    #[tokio::test]
    async fn refresh_presence_replaces_online_set() {
        let api = Arc::new(FakeApi::default());
        let (mut controller, _connector) = signed_in(api).await;

        controller.refresh_presence().await.unwrap();

        assert_eq!(
            controller.session().unwrap().online_user_ids(),
            &["alice".to_string(), "bob".to_string()]
        );
    }
}
