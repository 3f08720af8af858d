//! PutObject against a pre-signed URL
//!
//! The payload is streamed to the storage endpoint in fixed-size chunks; each
//! chunk handed to the transport produces one progress event carrying the
//! cumulative number of bytes handed over so far. Those bytes may still sit in
//! the transport's buffers, so a small file can report 100% before it has
//! reached the socket.
//!
//! # Example
//!
//! ```no_run
//! use signed_uploadr::upload::{FilePayload, HttpObjectUploader, ObjectUploader, PutObjectRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let uploader = HttpObjectUploader::new()?;
//! let payload = FilePayload::new("hello.txt", "text/plain", "Hello, World!");
//! let cancel = CancellationToken::new();
//!
//! let response = uploader
//!     .put_object(
//!         PutObjectRequest { url: "https://bucket.s3.amazonaws.com/hello.txt?X-Amz-Signature=...", acl: None, payload: &payload },
//!         &cancel,
//!         &mut |sent| println!("{sent} bytes sent"),
//!     )
//!     .await?;
//! println!("Uploaded with status {}", response.status);
//! # Ok(())
//! # }
//! ```

use super::{ObjectUploader, PutObjectRequest, PutObjectResponse, UploadError};
use crate::metrics;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use std::convert::Infallible;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Header carrying the object's access-control setting
pub const ACL_HEADER: &str = "x-amz-acl";

/// Default streaming chunk size (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// HTTP uploader for pre-signed PUT URLs
pub struct HttpObjectUploader {
    http_client: reqwest::Client,
    chunk_size: usize,
}

impl HttpObjectUploader {
    /// Create an uploader with its own connection pool
    pub fn new() -> Result<Self, UploadError> {
        let http_client = reqwest::Client::builder().build()?;
        Ok(Self::with_http_client(http_client))
    }

    pub fn with_http_client(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the streaming chunk size, i.e. the progress granularity
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Split `data` into `chunk_size` pieces
fn split_chunks(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(data.len() / chunk_size + 1);
    let mut offset = 0;
    while offset < data.len() {
        let end = usize::min(offset + chunk_size, data.len());
        chunks.push(data.slice(offset..end));
        offset = end;
    }
    chunks
}

/// Body stream that reports the cumulative bytes handed to the transport,
/// not bytes written to the socket
fn progress_stream(
    data: Bytes,
    chunk_size: usize,
    progress_tx: mpsc::UnboundedSender<u64>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let mut sent = 0u64;
    futures::stream::iter(split_chunks(&data, chunk_size)).map(move |chunk| {
        sent += chunk.len() as u64;
        // Receiver is gone once the upload settled or was canceled
        let _ = progress_tx.send(sent);
        Ok(chunk)
    })
}

#[async_trait]
impl ObjectUploader for HttpObjectUploader {
    #[tracing::instrument(
        name = "upload.put_object",
        skip(self, request, cancel, on_progress),
        fields(
            upload.file = %request.payload.name,
            http.method = "PUT",
            http.content_type = %request.payload.content_type,
            upload.acl = ?request.acl,
            upload.bytes = request.payload.size(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn put_object(
        &self,
        request: PutObjectRequest<'_>,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(u64) + Send),
    ) -> Result<PutObjectResponse, UploadError> {
        let payload = request.payload;
        let bytes_written = payload.size();
        let start_time = Instant::now();

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

        let mut builder = self
            .http_client
            .put(request.url)
            .header(CONTENT_TYPE, payload.content_type.as_str())
            .header(CONTENT_LENGTH, bytes_written)
            .body(reqwest::Body::wrap_stream(progress_stream(
                payload.data.clone(),
                self.chunk_size,
                progress_tx,
            )));
        if let Some(acl) = request.acl.filter(|a| !a.is_empty()) {
            builder = builder.header(ACL_HEADER, acl);
        }

        let send = builder.send();
        tokio::pin!(send);

        let result = loop {
            tokio::select! {
                biased;
                Some(sent) = progress_rx.recv() => {
                    if cancel.is_cancelled() {
                        tracing::debug!(sent, "Cancellation observed during transfer");
                        return Err(UploadError::Canceled);
                    }
                    on_progress(sent);
                }
                result = &mut send => break result,
            }
        };

        // Ticks emitted right before the response arrived
        while let Ok(sent) = progress_rx.try_recv() {
            if cancel.is_cancelled() {
                return Err(UploadError::Canceled);
            }
            on_progress(sent);
        }

        metrics::record_operation_duration("put_object", start_time.elapsed().as_secs_f64());

        if cancel.is_cancelled() {
            tracing::debug!("Cancellation observed at completion");
            return Err(UploadError::Canceled);
        }

        let response = result?;
        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                duration_ms = start_time.elapsed().as_millis(),
                "PutObject rejected"
            );
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        tracing::info!(
            etag = ?etag,
            bytes_written,
            duration_ms = start_time.elapsed().as_millis(),
            "PutObject upload completed"
        );

        Ok(PutObjectResponse {
            status: status.as_u16(),
            etag,
            bytes_written,
        })
    }
}
