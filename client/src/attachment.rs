//! Image attachments picked by the user before sending.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::ClientError;

/// Largest accepted attachment: 2 MiB.
pub const MAX_ATTACHMENT_BYTES: usize = 2 * 1024 * 1024;

pub const ACCEPTED_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/webp"];

/// A validated image waiting to be sent with the next message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    mime: String,
    bytes: Vec<u8>,
}

impl Attachment {
    /// Validate type and size. The error carries a user-facing reason.
    pub fn new(mime: &str, bytes: Vec<u8>) -> Result<Self, ClientError> {
        let mime = mime.trim().to_ascii_lowercase();

        if !mime.starts_with("image/") {
            return Err(ClientError::Rejected(
                "Please select an image file!".to_string(),
            ));
        }
        if !ACCEPTED_TYPES.contains(&mime.as_str()) {
            return Err(ClientError::Rejected(
                "Only png, jpg, jpeg and webp images are allowed.".to_string(),
            ));
        }
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(ClientError::Rejected(
                "Image size must be less than 2MB!".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(ClientError::Rejected("Image file is empty.".to_string()));
        }

        Ok(Self { mime, bytes })
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:<mime>;base64,<payload>` as the send endpoint expects it.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(err: ClientError) -> String {
        match err {
            ClientError::Rejected(reason) => reason,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn accepts_supported_types() {
        for mime in ACCEPTED_TYPES {
            assert!(Attachment::new(mime, vec![1, 2, 3]).is_ok(), "{}", mime);
        }
        assert!(Attachment::new("IMAGE/PNG", vec![1]).is_ok());
    }

    #[test]
    fn rejects_non_images_and_unsupported_images() {
        let err = Attachment::new("application/pdf", vec![1]).unwrap_err();
        assert_eq!(reason(err), "Please select an image file!");

        let err = Attachment::new("image/gif", vec![1]).unwrap_err();
        assert_eq!(reason(err), "Only png, jpg, jpeg and webp images are allowed.");
    }

    #[test]
    fn enforces_size_limit() {
        assert!(Attachment::new("image/png", vec![0; MAX_ATTACHMENT_BYTES]).is_ok());

        let err = Attachment::new("image/png", vec![0; MAX_ATTACHMENT_BYTES + 1]).unwrap_err();
        assert_eq!(reason(err), "Image size must be less than 2MB!");
    }

    #[test]
    fn encodes_data_url() {
        let attachment = Attachment::new("image/webp", b"abc".to_vec()).unwrap();
        assert_eq!(attachment.to_data_url(), "data:image/webp;base64,YWJj");
        assert_eq!(attachment.len(), 3);
    }
}
