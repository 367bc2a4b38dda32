//! Live channel: the server push stream for one signed-in user.

use async_trait::async_trait;
use campus_chat_protocol::{LiveEvent, LiveFrame};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ClientError;

/// What a live channel yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveSignal {
    Event(LiveEvent),
    /// The server closed the channel. `code` is the close code if one was sent
    /// (4000 superseded, 4001 token expired, 4002 token invalid).
    Closed { code: Option<u16> },
}

/// Opens live channels.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(&self, token: &str) -> Result<LiveChannel, ClientError>;
}

/// An open live channel. Dropping it closes the connection.
#[derive(Debug)]
pub struct LiveChannel {
    signals: mpsc::UnboundedReceiver<LiveSignal>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LiveChannel {
    /// A channel fed directly from `signals`, with no socket behind it.
    pub fn from_receiver(signals: mpsc::UnboundedReceiver<LiveSignal>) -> Self {
        Self {
            signals,
            shutdown: None,
            task: None,
        }
    }

    /// Next signal, or `None` once the channel is finished.
    pub async fn recv(&mut self) -> Option<LiveSignal> {
        self.signals.recv().await
    }

    /// False once the socket task has finished.
    pub fn is_open(&self) -> bool {
        self.task.as_ref().map_or(true, |task| !task.is_finished())
    }

    /// Ask the socket task to send a close frame and stop.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        // The socket task sends the close frame and exits on its own
        self.close();
    }
}

/// `LiveConnector` over WebSocket: `GET {base}/ws?token=<JWT>`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: String,
}

impl WsConnector {
    /// `base_url` is the `ws://` or `wss://` origin of the server.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, token: &str) -> Result<reqwest::Url, ClientError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Transport(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Transport(format!("invalid base URL: {}", self.base_url)))?
            .pop_if_empty()
            .push("ws");
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

#[async_trait]
impl LiveConnector for WsConnector {
    async fn connect(&self, token: &str) -> Result<LiveChannel, ClientError> {
        let url = self.endpoint(token)?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::info!(url = %self.base_url, "Live channel connected");

        let (signal_tx, signals) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(pump(stream, signal_tx, shutdown_rx));

        Ok(LiveChannel {
            signals,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Reads frames until the socket closes or shutdown is requested.
async fn pump(
    mut stream: WsStream,
    signals: mpsc::UnboundedSender<LiveSignal>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = stream.close(None).await;
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<LiveFrame>(text.as_str()) {
                        Ok(frame) => {
                            if signals.send(LiveSignal::Event(frame.event)).is_err() {
                                let _ = stream.close(None).await;
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Ignoring malformed live frame");
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    tracing::info!(?code, "Live channel closed by server");
                    let _ = signals.send(LiveSignal::Closed { code });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Live channel error");
                    let _ = signals.send(LiveSignal::Closed { code: None });
                    break;
                }
                None => {
                    let _ = signals.send(LiveSignal::Closed { code: None });
                    break;
                }
            }
        }
    }
}
