//! Per-file failure classification

use crate::error::ErrorCode;

/// Classify a failed upload
///
/// Priority: an observed abort wins over a response status, which wins over a
/// plain transport failure. Returns the code and the status recorded on the
/// outcome (zero when there is no usable status).
pub fn classify(abort_observed: bool, status: Option<u16>) -> (ErrorCode, u16) {
    if abort_observed {
        return (ErrorCode::UploadAborted, 0);
    }
    match status {
        Some(status) if status != 0 => (ErrorCode::UploadFailed, status),
        _ => (ErrorCode::UploadCouldNotInitiate, 0),
    }
}
