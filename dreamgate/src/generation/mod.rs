//! Generation orchestration.
//!
//! The controller sequences one generation end to end: model and region
//! resolution, quota check, input uploads, payload construction, draft
//! submission, smart polling, result extraction, and the
//! increment-after-success bookkeeping.

mod controller;
mod extract;
mod request;

pub use controller::{GenerationController, RunControl};
pub use extract::extract_urls;
pub use request::{
    CompositionRequest, ImageRequest, RawCompositionRequest, RawImageRequest, RawVideoRequest,
    VideoRequest,
};

use crate::payload::PayloadError;
use crate::poll::PollError;
use crate::quota::QuotaError;
use crate::upload::UploadError;
use crate::upstream::UpstreamError;
use thiserror::Error;

/// Errors surfaced by the generation controller.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Request validation failed; aggregated field errors.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Model unavailable in the credential's region.
    #[error(transparent)]
    UnsupportedModel(#[from] PayloadError),

    /// Quota denied or ledger storage failed.
    #[error(transparent)]
    Quota(#[from] QuotaError),

    /// Input image upload failed.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Upstream protocol, transport, or generation failure.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Poll budget or deadline exhausted before a terminal state.
    #[error("generation still pending after {poll_count} polls")]
    PollTimeout { poll_count: u32 },

    /// Upstream completed but no asset URLs were extractable.
    #[error("result extraction failed: {0}")]
    ResultExtraction(String),

    /// Cancelled between stages or at a poll boundary.
    #[error("generation cancelled")]
    Cancelled,
}

impl From<PollError> for GenerateError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::GenerationFailed { fail_code } => {
                Self::Upstream(UpstreamError::GenerationFailed { fail_code })
            }
            PollError::Timeout { poll_count, .. } => Self::PollTimeout { poll_count },
            PollError::Cancelled => Self::Cancelled,
        }
    }
}
