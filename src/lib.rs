//! Signed Uploadr Library
//!
//! Client-side batch uploader for object storage using short-lived, per-file
//! pre-signed URLs.
//!
//! # Features
//!
//! - **One Signing Round Trip**: every file in the batch is signed in a single call
//! - **Sequential Uploads**: one in-flight PUT at a time
//! - **Aggregated Progress**: byte-level progress across the whole batch
//! - **Cooperative Cancellation**: stop a batch from anywhere, including the progress callback
//! - **Tolerant Mode**: record per-file failures instead of aborting the batch
//!
//! # Example
//!
//! ```no_run
//! use signed_uploadr::{FileEntry, FilePayload, UploadRequest, UploadTask};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let request = UploadRequest::new("api-key", "provider-id")
//!         .file(FileEntry::new(FilePayload::from_path("report.pdf", Some("application/pdf")).await?));
//!
//!     let task = UploadTask::new(request)?;
//!     task.on_progress(|p| println!("{}/{} bytes", p.loaded_bytes, p.total_bytes));
//!     let outcomes = task.start().await?;
//!     println!("Uploaded {}", outcomes[0].key);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod progress;
pub mod signing;
pub mod task;
pub mod upload;

// Re-export commonly used types
pub use error::{ErrorCode, ServiceError};
pub use progress::ProgressSnapshot;
pub use task::{FileEntry, StopHandle, TaskState, UploadOutcome, UploadRequest, UploadTask};
pub use upload::FilePayload;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
