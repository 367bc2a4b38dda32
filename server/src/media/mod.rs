//! Media store: turns image attachments into retrievable URLs.
//!
//! Clients send images as `data:image/<type>;base64,<payload>` URLs.
//! `LocalMediaStore` writes them under `data_dir/media` and the router serves
//! that directory at the configured public path.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::{Path, PathBuf};

use crate::error::ChatError;

/// Default cap on a decoded image: 2 MiB.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// Accepted image MIME types and the file extension they are stored under.
const ACCEPTED_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/webp", "webp"),
];

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist an image given as a data URL and return its public URL.
    async fn store_data_url(&self, data_url: &str) -> Result<String, ChatError>;

    /// Remove an upload whose message never got persisted. URLs this store
    /// did not hand out are ignored.
    async fn discard(&self, url: &str);
}

/// A decoded image attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime: String,
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Parse and decode a base64 image data URL, enforcing type and size.
pub fn decode_data_url(data_url: &str, max_bytes: usize) -> Result<DecodedImage, ChatError> {
    let invalid = || ChatError::Validation("Image must be a base64 data URL".to_string());

    let rest = data_url.trim().strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = header.strip_suffix(";base64").ok_or_else(invalid)?.to_ascii_lowercase();

    let extension = ACCEPTED_TYPES
        .iter()
        .find(|(accepted, _)| *accepted == mime)
        .map(|(_, ext)| *ext)
        .ok_or_else(|| {
            ChatError::Validation("Only png, jpg, jpeg and webp images are allowed.".to_string())
        })?;

    // Reject oversized payloads before decoding them
    if payload.len() / 4 * 3 > max_bytes + 3 {
        return Err(too_large(max_bytes));
    }

    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    if bytes.len() > max_bytes {
        return Err(too_large(max_bytes));
    }
    if bytes.is_empty() {
        return Err(invalid());
    }

    Ok(DecodedImage {
        mime,
        extension,
        bytes,
    })
}

fn too_large(max_bytes: usize) -> ChatError {
    ChatError::Validation(format!(
        "Image size must be at most {} bytes",
        max_bytes
    ))
}

/// Media store writing to the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    dir: PathBuf,
    public_path: String,
    max_bytes: usize,
}

impl LocalMediaStore {
    /// Create the store, making sure `dir` exists.
    pub fn new(dir: impl Into<PathBuf>, public_path: &str, max_bytes: usize) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            public_path: public_path.trim_end_matches('/').to_string(),
            max_bytes,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store_data_url(&self, data_url: &str) -> Result<String, ChatError> {
        let image = decode_data_url(data_url, self.max_bytes)?;
        let file_name = format!("{}.{}", uuid::Uuid::now_v7(), image.extension);
        let path = self.dir.join(&file_name);

        tokio::fs::write(&path, &image.bytes).await.map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Media upload failed");
            ChatError::TransientStore(format!("Media upload failed: {}", e))
        })?;

        tracing::debug!(
            file = %file_name,
            mime = %image.mime,
            bytes = image.bytes.len(),
            "Stored image attachment"
        );

        Ok(format!("{}/{}", self.public_path, file_name))
    }

    async fn discard(&self, url: &str) {
        let Some(file_name) = url
            .strip_prefix(&self.public_path)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && !name.contains(['/', '\\']) && *name != "..")
        else {
            tracing::debug!(url = %url, "Not a local media URL, nothing to discard");
            return;
        };

        let path = self.dir.join(file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(file = %file_name, "Discarded orphaned upload"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to discard upload"),
        }
    }
}
