//! Media seam: binary object storage for journal attachments.
//!
//! The store takes bytes and hands back a durable URL. What sits behind it
//! (a CDN, a bucket, a local directory served statically) is not the
//! journal's concern.

use async_trait::async_trait;
use crate::error::MediaError;

/// One uploaded file part, as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Form field name (e.g. `file_2` for block index 2)
    pub field: String,

    /// Original file name, if the client sent one
    pub file_name: Option<String>,

    /// MIME type, if the client sent one
    pub content_type: Option<String>,

    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(field: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name: None,
            content_type: None,
            bytes,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Durable storage for uploaded media.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// The backend name (e.g., "local", "disabled").
    fn name(&self) -> &str;

    /// Store the bytes under `folder` and return a URL that stays valid.
    async fn upload(&self, folder: &str, upload: &Upload) -> std::result::Result<String, MediaError>;
}
