use thiserror::Error;

/// Errors surfaced to the chat UI.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Local validation failed; nothing was sent. The reason is user-facing.
    #[error("{0}")]
    Rejected(String),

    /// The server answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Server { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode server payload: {0}")]
    Decode(String),

    /// A send is already in flight for this session.
    #[error("a message is already being sent")]
    Busy,

    #[error("not signed in")]
    SignedOut,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}
