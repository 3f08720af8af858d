//! Upload task
//!
//! A single-use batch upload: validate the request, sign every file in one
//! call, then PUT each file in order while aggregating progress.
//!
//! # Example
//!
//! ```no_run
//! use signed_uploadr::task::{FileEntry, UploadRequest, UploadTask};
//! use signed_uploadr::upload::FilePayload;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = UploadRequest::new("api-key", "provider-id")
//!     .file(FileEntry::new(FilePayload::new("hello.txt", "text/plain", "Hello")).acl("public-read"))
//!     .throw_upload_error(false);
//!
//! let task = UploadTask::new(request)?;
//! task.on_progress(|p| println!("{:.1}%", p.loaded_percent));
//!
//! for outcome in task.start().await? {
//!     println!("{} -> {:?} {:?}", outcome.key, outcome.response_code, outcome.error_code);
//! }
//! # Ok(())
//! # }
//! ```

mod classify;
mod state;

pub use classify::classify;
pub use state::{TaskEvent, TaskState};

use crate::error::{ErrorCode, ServiceError};
use crate::metrics;
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::signing::{
    SignFileRequest, SignedUrlBatch, SignedUrlClient, SignedUrlRequest, SigningEndpoint,
    UrlSigner,
};
use crate::upload::{FilePayload, HttpObjectUploader, ObjectUploader, PutObjectRequest};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Task diagnostics: `info` when the request asked for logging, `debug` otherwise
macro_rules! task_log {
    ($task:expr, $($arg:tt)+) => {
        if $task.request.log {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Progress sink
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// One file to upload
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub payload: FilePayload,
    /// Storage key; falls back to the payload name when unset or empty
    pub key: Option<String>,
    pub acl: Option<String>,
}

impl FileEntry {
    pub fn new(payload: FilePayload) -> Self {
        Self {
            payload,
            key: None,
            acl: None,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = Some(acl.into());
        self
    }

    /// Key requested from the signing service
    pub fn storage_key(&self) -> &str {
        self.key
            .as_deref()
            .filter(|k| !k.is_empty())
            .unwrap_or(&self.payload.name)
    }
}

/// Task options
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub api_key: String,
    pub provider_id: String,
    pub files: Vec<FileEntry>,
    /// Raise on the first per-file failure instead of recording it
    pub throw_upload_error: bool,
    /// Promote task diagnostics to `info`
    pub log: bool,
    /// Use the local test signing service
    pub is_test: bool,
    /// Explicit signing endpoint, overrides `is_test`
    pub signing_url: Option<String>,
}

impl Default for UploadRequest {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            provider_id: String::new(),
            files: Vec::new(),
            throw_upload_error: true,
            log: false,
            is_test: false,
            signing_url: None,
        }
    }
}

impl UploadRequest {
    pub fn new(api_key: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            provider_id: provider_id.into(),
            ..Default::default()
        }
    }

    pub fn file(mut self, entry: FileEntry) -> Self {
        self.files.push(entry);
        self
    }

    pub fn throw_upload_error(mut self, throw: bool) -> Self {
        self.throw_upload_error = throw;
        self
    }

    pub fn log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn is_test(mut self, is_test: bool) -> Self {
        self.is_test = is_test;
        self
    }

    pub fn signing_url(mut self, url: impl Into<String>) -> Self {
        self.signing_url = Some(url.into());
        self
    }

    pub fn signing_endpoint(&self) -> SigningEndpoint {
        SigningEndpoint::resolve(self.signing_url.as_deref(), self.is_test)
    }

    /// Precondition checks that depend only on the options
    fn validate(&self) -> Result<(), ErrorCode> {
        if self.api_key.is_empty() {
            return Err(ErrorCode::MissingApiKey);
        }
        if self.provider_id.is_empty() {
            return Err(ErrorCode::MissingProviderId);
        }
        if self.files.is_empty() {
            return Err(ErrorCode::TaskNoFiles);
        }
        Ok(())
    }
}

/// Result for one file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// Storage key as resolved by the signing service
    pub key: String,
    #[serde(serialize_with = "serialize_payload_name")]
    pub file: FilePayload,
    /// Only set when `throw_upload_error` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.error_code.is_none()
    }
}

fn serialize_payload_name<S: Serializer>(payload: &FilePayload, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&payload.name)
}

/// Cloneable handle that aborts a task
#[derive(Clone)]
pub struct StopHandle {
    abort: CancellationToken,
    state: Arc<Mutex<TaskState>>,
}

impl StopHandle {
    /// Raise the abort flag; safe to call any number of times
    pub fn stop(&self) {
        let mut state = self.state.lock();
        self.abort.cancel();
        if let Ok(next) = state.transition(TaskEvent::Stop, true) {
            *state = next;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.abort.is_cancelled()
    }
}

/// Single-use batch upload
pub struct UploadTask {
    id: Uuid,
    request: UploadRequest,
    signer: Arc<dyn UrlSigner>,
    uploader: Arc<dyn ObjectUploader>,
    state: Arc<Mutex<TaskState>>,
    abort: CancellationToken,
    progress: Mutex<ProgressCallback>,
}

impl UploadTask {
    /// Create a task talking HTTP to the endpoint selected by the request
    pub fn new(request: UploadRequest) -> Result<Self, ServiceError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(ServiceError::internal)?;
        let signer =
            SignedUrlClient::with_http_client(request.signing_endpoint(), http_client.clone());
        let uploader = HttpObjectUploader::with_http_client(http_client);

        Ok(Self::with_clients(
            request,
            Arc::new(signer),
            Arc::new(uploader),
        ))
    }

    /// Create a task with explicit signing and upload backends
    pub fn with_clients(
        request: UploadRequest,
        signer: Arc<dyn UrlSigner>,
        uploader: Arc<dyn ObjectUploader>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            signer,
            uploader,
            state: Arc::new(Mutex::new(TaskState::Idle)),
            abort: CancellationToken::new(),
            progress: Mutex::new(Arc::new(|_| {})),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Replace the progress sink
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(ProgressSnapshot) + Send + Sync + 'static,
    {
        *self.progress.lock() = Arc::new(callback);
    }

    /// Abort the task; see [`StopHandle::stop`]
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            abort: self.abort.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// Run the batch
    ///
    /// Returns one outcome per processed file, in request order. Files after
    /// an abort observed between uploads are not processed.
    #[tracing::instrument(
        name = "upload_task.start",
        skip(self),
        fields(
            task.id = %self.id,
            task.files = self.request.files.len(),
            task.throw_upload_error = self.request.throw_upload_error
        ),
        err
    )]
    pub async fn start(&self) -> Result<Vec<UploadOutcome>, ServiceError> {
        task_log!(self, "UploadClient: Init Task");
        self.begin()?;

        let result = self.run().await;

        {
            let mut state = self.state.lock();
            if let Ok(next) = state.transition(TaskEvent::Finish, self.abort.is_cancelled()) {
                *state = next;
            }
        }

        if let Err(e) = &result {
            metrics::record_error(e.code().as_str());
        }
        result
    }

    /// Lifecycle check: idle and not aborted
    fn begin(&self) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        let next = state
            .transition(TaskEvent::Start, self.abort.is_cancelled())
            .map_err(ServiceError::new)?;
        *state = next;
        Ok(())
    }

    async fn run(&self) -> Result<Vec<UploadOutcome>, ServiceError> {
        self.request.validate().map_err(ServiceError::new)?;

        let mut tracker = ProgressTracker::new(
            self.request.files.iter().map(|f| f.payload.size()).collect(),
        );
        task_log!(
            self,
            files = tracker.file_count(),
            total_bytes = tracker.total_bytes(),
            "UploadClient: Start progress"
        );
        self.emit(tracker.snapshot());

        task_log!(self, "UploadClient: Get signed URLS");
        let batch = self.sign().await?;
        if batch.files.len() != self.request.files.len() {
            tracing::warn!(
                requested = self.request.files.len(),
                received = batch.files.len(),
                "Signed URL count does not match file count"
            );
            return Err(ErrorCode::MismatchLengthSignedUrlsAndFiles.into());
        }

        task_log!(self, "UploadClient: Upload files");
        self.upload_all(&batch, &mut tracker).await
    }

    async fn sign(&self) -> Result<SignedUrlBatch, ServiceError> {
        let request = SignedUrlRequest {
            api_key: self.request.api_key.clone(),
            provider_id: self.request.provider_id.clone(),
            files: self
                .request
                .files
                .iter()
                .map(|f| SignFileRequest {
                    key: f.storage_key().to_string(),
                    acl: f.acl.clone(),
                    content_type: f.payload.content_type.clone(),
                })
                .collect(),
        };

        Ok(self.signer.get_signed_urls(&request).await?)
    }

    async fn upload_all(
        &self,
        batch: &SignedUrlBatch,
        tracker: &mut ProgressTracker,
    ) -> Result<Vec<UploadOutcome>, ServiceError> {
        let throw_upload_error = self.request.throw_upload_error;
        let mut outcomes = Vec::with_capacity(self.request.files.len());

        for (index, (entry, signed)) in self.request.files.iter().zip(&batch.files).enumerate() {
            if self.abort.is_cancelled() {
                task_log!(self, index, "Abort observed, skipping remaining files");
                break;
            }

            let mut outcome = UploadOutcome {
                key: signed.key.clone(),
                file: entry.payload.clone(),
                response_code: None,
                error_code: None,
            };

            task_log!(self, key = %signed.key, url = %signed.signed_url, "UploadClient: Upload file");

            let mut on_progress = |sent: u64| {
                tracker.update(index, sent);
                if !self.abort.is_cancelled() {
                    self.emit(tracker.snapshot());
                }
            };
            let request = PutObjectRequest {
                url: &signed.signed_url,
                acl: signed.acl.as_deref(),
                payload: &entry.payload,
            };

            match self
                .uploader
                .put_object(request, &self.abort, &mut on_progress)
                .await
            {
                Ok(response) => {
                    metrics::record_upload_success(response.bytes_written);
                    if !throw_upload_error {
                        outcome.response_code = Some(response.status);
                    }
                }
                Err(e) => {
                    let (code, status) = classify(self.abort.is_cancelled(), e.status());
                    metrics::record_upload_failure(code.as_str());
                    task_log!(self, error = %e, code = %code, "Upload failed");

                    if throw_upload_error {
                        return Err(ServiceError::with_source(code, e));
                    }
                    outcome.response_code = Some(status);
                    outcome.error_code = Some(code);
                }
            }

            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    fn emit(&self, snapshot: ProgressSnapshot) {
        let callback = Arc::clone(&*self.progress.lock());
        callback(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::{SignedUrl, SigningError};
    use crate::upload::{PutObjectResponse, UploadError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSigner {
        calls: AtomicUsize,
        extra: usize,
    }

    #[async_trait]
    impl UrlSigner for StaticSigner {
        async fn get_signed_urls(
            &self,
            request: &SignedUrlRequest,
        ) -> Result<SignedUrlBatch, SigningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut files: Vec<SignedUrl> = request
                .files
                .iter()
                .map(|f| SignedUrl {
                    key: format!("uploads/{}", f.key),
                    acl: f.acl.clone(),
                    signed_url: format!("memory://{}", f.key),
                })
                .collect();
            for i in 0..self.extra {
                files.push(SignedUrl {
                    key: format!("extra-{i}"),
                    acl: None,
                    signed_url: "memory://extra".into(),
                });
            }
            Ok(SignedUrlBatch { files })
        }
    }

    /// Reports progress in halves, rejecting URLs that contain "deny"
    struct HalvingUploader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ObjectUploader for HalvingUploader {
        async fn put_object(
            &self,
            request: PutObjectRequest<'_>,
            cancel: &CancellationToken,
            on_progress: &mut (dyn FnMut(u64) + Send),
        ) -> Result<PutObjectResponse, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let size = request.payload.size();
            for sent in [size / 2, size] {
                if cancel.is_cancelled() {
                    return Err(UploadError::Canceled);
                }
                on_progress(sent);
            }
            if cancel.is_cancelled() {
                return Err(UploadError::Canceled);
            }
            if request.url.contains("deny") {
                return Err(UploadError::Rejected {
                    status: 403,
                    body: String::new(),
                });
            }
            Ok(PutObjectResponse {
                status: 200,
                etag: None,
                bytes_written: size,
            })
        }
    }

    fn task(request: UploadRequest, extra: usize) -> (UploadTask, Arc<StaticSigner>, Arc<HalvingUploader>) {
        let signer = Arc::new(StaticSigner {
            calls: AtomicUsize::new(0),
            extra,
        });
        let uploader = Arc::new(HalvingUploader {
            calls: AtomicUsize::new(0),
        });
        let task = UploadTask::with_clients(request, signer.clone(), uploader.clone());
        (task, signer, uploader)
    }

    fn request(names: &[&str]) -> UploadRequest {
        names.iter().fold(UploadRequest::new("key", "provider"), |req, name| {
            req.file(FileEntry::new(FilePayload::new(*name, "text/plain", vec![1u8; 100])))
        })
    }

    #[test]
    fn test_request_defaults() {
        let request = UploadRequest::default();
        assert!(request.throw_upload_error);
        assert!(!request.log);
        assert_eq!(request.signing_endpoint(), SigningEndpoint::Production);
    }

    #[test]
    fn test_storage_key_falls_back_to_name() {
        let entry = FileEntry::new(FilePayload::new("a.txt", "text/plain", "x"));
        assert_eq!(entry.storage_key(), "a.txt");
        assert_eq!(entry.key("docs/a.txt").storage_key(), "docs/a.txt");
    }

    #[test]
    fn test_empty_key_falls_back_to_name() {
        let entry = FileEntry::new(FilePayload::new("a.txt", "text/plain", "x")).key("");
        assert_eq!(entry.storage_key(), "a.txt");
    }

    #[test]
    fn test_validation_order() {
        assert_eq!(
            UploadRequest::new("", "").validate(),
            Err(ErrorCode::MissingApiKey)
        );
        assert_eq!(
            UploadRequest::new("k", "").validate(),
            Err(ErrorCode::MissingProviderId)
        );
        assert_eq!(
            UploadRequest::new("k", "p").validate(),
            Err(ErrorCode::TaskNoFiles)
        );
    }

    #[tokio::test]
    async fn test_successful_batch() {
        let (task, signer, uploader) = task(request(&["a.txt", "b.txt"]), 0);
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let sink = snapshots.clone();
        task.on_progress(move |p| sink.lock().push(p));

        let outcomes = task.start().await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].key, "uploads/a.txt");
        assert_eq!(outcomes[1].file.name, "b.txt");
        // Strict mode leaves the status unset
        assert!(outcomes.iter().all(|o| o.response_code.is_none()));
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(task.state(), TaskState::Done);

        let snapshots = snapshots.lock();
        // Initial zero emission plus two ticks per file
        assert_eq!(snapshots.len(), 5);
        assert_eq!(snapshots[0].loaded_bytes, 0);
        let last = snapshots.last().unwrap();
        assert_eq!(last.loaded_bytes, 200);
        assert!((last.loaded_percent - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mismatch_skips_uploads() {
        let (task, _, uploader) = task(request(&["a.txt"]), 1);

        let err = task.start().await.unwrap_err();

        assert_eq!(err.code(), &ErrorCode::MismatchLengthSignedUrlsAndFiles);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tolerant_mode_records_rejection() {
        let (task, _, _) = task(request(&["deny.txt", "ok.txt"]).throw_upload_error(false), 0);

        let outcomes = task.start().await.unwrap();

        assert_eq!(outcomes[0].response_code, Some(403));
        assert_eq!(outcomes[0].error_code, Some(ErrorCode::UploadFailed));
        assert_eq!(outcomes[1].response_code, Some(200));
        assert!(outcomes[1].is_success());
    }

    #[tokio::test]
    async fn test_stop_from_progress_callback() {
        let (task, _, uploader) = task(request(&["a.txt", "b.txt"]), 0);
        let handle = task.stop_handle();
        let emitted = Arc::new(AtomicUsize::new(0));
        let counter = emitted.clone();
        task.on_progress(move |p| {
            counter.fetch_add(1, Ordering::SeqCst);
            if p.loaded_bytes > 0 {
                handle.stop();
            }
        });

        let err = task.start().await.unwrap_err();

        assert_eq!(err.code(), &ErrorCode::UploadAborted);
        // Initial emission and the first tick only
        assert_eq!(emitted.load(Ordering::SeqCst), 2);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), TaskState::Done);
    }

    #[tokio::test]
    async fn test_stop_in_tolerant_mode_records_zero_status() {
        let (task, _, uploader) = task(request(&["a.txt", "b.txt"]).throw_upload_error(false), 0);
        let handle = task.stop_handle();
        task.on_progress(move |p| {
            if p.loaded_bytes > 0 {
                handle.stop();
            }
        });

        let outcomes = task.start().await.unwrap();

        // Remaining files are skipped once the abort is seen between uploads
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].response_code, Some(0));
        assert_eq!(outcomes[0].error_code, Some(ErrorCode::UploadAborted));
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
    }

    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run a task under an `info` subscriber and return what it logged
    async fn captured_info_logs(request: UploadRequest) -> String {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || CaptureWriter(sink.clone()))
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (task, _, _) = task(request, 0);
        task.start().await.unwrap();

        let logs = buffer.lock().clone();
        String::from_utf8_lossy(&logs).into_owned()
    }

    #[tokio::test]
    async fn test_log_flag_promotes_task_logs_to_info() {
        let logs = captured_info_logs(request(&["a.txt"]).log(true)).await;
        assert!(logs.contains("UploadClient: Init Task"));
        assert!(logs.contains("UploadClient: Upload file"));

        let quiet = captured_info_logs(request(&["a.txt"])).await;
        assert!(!quiet.contains("UploadClient: Init Task"));
        assert!(!quiet.contains("UploadClient: Upload file"));
    }

    #[tokio::test]
    async fn test_outcome_serialization() {
        let (task, _, _) = task(request(&["deny.txt"]).throw_upload_error(false), 0);
        let outcomes = task.start().await.unwrap();

        let json = serde_json::to_value(&outcomes[0]).unwrap();
        assert_eq!(json["key"], "uploads/deny.txt");
        assert_eq!(json["file"], "deny.txt");
        assert_eq!(json["responseCode"], 403);
        assert_eq!(json["errorCode"], "upload_failed");
    }
}
