//! Upload module
//!
//! Single-file PUT uploads against pre-signed URLs with progress reporting and
//! cooperative cancellation.

use bytes::Bytes;
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod put_object;

pub use put_object::HttpObjectUploader;

/// Content type used when none is known
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    /// The storage endpoint answered with a non-200 status
    #[error("Upload rejected with status {status}")]
    Rejected { status: u16, body: String },

    /// No response was received
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The transfer observed a cancellation request
    #[error("Upload canceled")]
    Canceled,
}

impl UploadError {
    /// Response status carried by the failure, if the request reached a server
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Rejected { status, .. } => Some(*status),
            UploadError::Transport(e) => e.status().map(|s| s.as_u16()),
            UploadError::Canceled => None,
        }
    }
}

/// File contents plus the metadata needed to upload them
#[derive(Debug, Clone, PartialEq)]
pub struct FilePayload {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl FilePayload {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, naming the payload after the file name
    pub async fn from_path(
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Ok(Self::new(
            name,
            content_type.unwrap_or(DEFAULT_CONTENT_TYPE),
            data,
        ))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// One PUT against a signed destination
#[derive(Debug, Clone, Copy)]
pub struct PutObjectRequest<'a> {
    pub url: &'a str,
    pub acl: Option<&'a str>,
    pub payload: &'a FilePayload,
}

/// Successful PUT
#[derive(Debug, Clone)]
pub struct PutObjectResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub bytes_written: u64,
}

/// Uploads a single object
///
/// Implementations report cumulative bytes handed to the transport through
/// `on_progress` and check `cancel` at every progress event and again before
/// settling. Once cancellation is observed the upload must fail with
/// [`UploadError::Canceled`].
#[async_trait::async_trait]
pub trait ObjectUploader: Send + Sync {
    async fn put_object(
        &self,
        request: PutObjectRequest<'_>,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(u64) + Send),
    ) -> Result<PutObjectResponse, UploadError>;
}
