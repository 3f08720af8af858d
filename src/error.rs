//! Task error types
//!
//! Every failure surfaced by an [`UploadTask`](crate::task::UploadTask) is a
//! [`ServiceError`] carrying a symbolic [`ErrorCode`] and, when available, the
//! underlying cause.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Symbolic error codes reported by an upload task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    TaskAlreadyExecuted,
    TaskAlreadyAborted,
    MissingApiKey,
    MissingProviderId,
    TaskNoFiles,
    MismatchLengthSignedUrlsAndFiles,
    UploadAborted,
    UploadFailed,
    UploadCouldNotInitiate,
    InternalError,
    /// Code returned verbatim by the signing endpoint on a non-200 response
    Service(String),
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::TaskAlreadyExecuted => "task_already_executed",
            ErrorCode::TaskAlreadyAborted => "task_already_aborted",
            ErrorCode::MissingApiKey => "missing_api_key",
            ErrorCode::MissingProviderId => "missing_provider_id",
            ErrorCode::TaskNoFiles => "task_no_files",
            ErrorCode::MismatchLengthSignedUrlsAndFiles => "mismatch_length_signed_urls_and_files",
            ErrorCode::UploadAborted => "upload_aborted",
            ErrorCode::UploadFailed => "upload_failed",
            ErrorCode::UploadCouldNotInitiate => "upload_could_not_initiate",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::Service(code) => code.as_str(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Error returned by upload task operations
#[derive(Error, Debug)]
#[error("{code}")]
pub struct ServiceError {
    code: ErrorCode,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServiceError {
    /// Create an error carrying only a code
    pub fn new(code: ErrorCode) -> Self {
        Self { code, source: None }
    }

    /// Create an error with a code and its underlying cause
    pub fn with_source<E>(code: ErrorCode, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            code,
            source: Some(source.into()),
        }
    }

    /// Wrap an unclassified failure as `internal_error`
    pub fn internal<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::with_source(ErrorCode::InternalError, source)
    }

    pub fn code(&self) -> &ErrorCode {
        &self.code
    }
}

impl From<ErrorCode> for ServiceError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}
