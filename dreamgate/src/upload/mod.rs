//! Signed upload handshake with the upstream blob store.
//!
//! Uploading an input image takes four steps: acquire a temporary token
//! from the product API, apply for an upload slot (SigV4-signed GET), push
//! the bytes to the issued upload host, and commit the session
//! (SigV4-signed POST). [`UploadPipeline`] drives the sequence with
//! retries; [`sigv4`] owns the signing.

pub mod sigv4;

mod pipeline;
mod source;

pub use pipeline::{UploadPipeline, INTER_UPLOAD_PAUSE, UPLOAD_MAX_ATTEMPTS};
pub use source::ImageSource;

use thiserror::Error;

/// Errors from the upload handshake.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Blob store unreachable or returned a retryable failure.
    #[error("upload network error: {0}")]
    Network(String),

    /// Upload timed out after exhausting retries.
    #[error("upload timed out: {0}")]
    Timeout(String),

    /// Token or signature rejected; not retryable.
    #[error("upload authorization rejected: {0}")]
    Auth(String),

    /// Commit finished with a non-2000 UriStatus.
    #[error("upload commit failed (UriStatus={uri_status}): {payload}")]
    CommitFailed { uri_status: i64, payload: String },

    /// The source image reference could not be resolved to bytes.
    #[error("invalid image source: {0}")]
    Source(String),
}
