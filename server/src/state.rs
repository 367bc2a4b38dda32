use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::chat::{HistoryService, MessageRouter, PresenceBroadcaster, SqliteMessageStore};
use crate::config::Config;
use crate::db::DbPool;
use crate::identity::SqliteIdentityProvider;
use crate::media::{LocalMediaStore, MediaStore};
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Active WebSocket connection per user
    pub connections: ConnectionRegistry,
    /// Sole mutator of `connections`; announces the online set
    pub presence: PresenceBroadcaster,
    /// Pushes persisted messages to live connections
    pub router: MessageRouter,
    /// Validates, persists and queries message history
    pub history: HistoryService,
    /// Resolves image attachments to URLs
    pub media: Arc<dyn MediaStore>,
    /// Directory served under the media public path
    pub media_dir: PathBuf,
    /// URL path media files are served under
    pub media_public_path: String,
    /// Request body limit for the REST surface
    pub max_body_bytes: usize,
    /// How often each live connection is pinged
    pub ping_interval: Duration,
    /// Deadline for the pong answering a ping
    pub pong_timeout: Duration,
}

impl AppState {
    /// Wire the messaging core on top of an initialized database.
    pub fn new(db: DbPool, jwt_secret: Vec<u8>, config: &Config) -> std::io::Result<Self> {
        let media_config = config.media();
        let public_path = format!("/{}", media_config.public_path.trim_matches('/'));
        let media_dir = PathBuf::from(&config.data_dir).join("media");
        let media = LocalMediaStore::new(
            media_dir.clone(),
            &public_path,
            media_config.max_image_bytes,
        )?;

        let connections = ConnectionRegistry::new();
        let presence = PresenceBroadcaster::new(connections.clone());
        let router = MessageRouter::new(connections.clone(), presence.clone());
        let history = HistoryService::new(
            Arc::new(SqliteMessageStore::new(db.clone())),
            Arc::new(SqliteIdentityProvider::new(db)),
            config.history_timeout(),
        );

        Ok(Self {
            jwt_secret,
            connections,
            presence,
            router,
            history,
            media: Arc::new(media),
            media_dir,
            media_public_path: public_path,
            max_body_bytes: config.max_body_bytes,
            ping_interval: config.ping_interval(),
            pong_timeout: config.pong_timeout(),
        })
    }
}
