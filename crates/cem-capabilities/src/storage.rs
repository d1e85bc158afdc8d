//! Attachment storage seam (§6). `download` returns a [`ScopedFile`] so
//! extractors never keep temp files beyond the call (§4.4): the backing
//! `NamedTempFile` is removed when the value drops.

use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    TooLarge { limit_bytes: u64 },
    Network(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "attachment not found"),
            Self::TooLarge { limit_bytes } => write!(f, "attachment exceeds size limit of {limit_bytes} bytes"),
            Self::Network(msg) => write!(f, "attachment storage network error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// A downloaded attachment backed by a temp file that is removed on drop.
pub struct ScopedFile {
    handle: NamedTempFile,
    pub size_bytes: u64,
    pub content_type: Option<String>,
}

impl ScopedFile {
    pub fn new(handle: NamedTempFile, size_bytes: u64, content_type: Option<String>) -> Self {
        Self {
            handle,
            size_bytes,
            content_type,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.handle.path()
    }

    pub fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.handle.path())
    }
}

#[async_trait::async_trait]
pub trait AttachmentStorage: Send + Sync {
    async fn size(&self, url: &str) -> Result<u64, StorageError>;
    async fn download(&self, url: &str, max_bytes: u64) -> Result<ScopedFile, StorageError>;
}
