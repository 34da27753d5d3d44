//! Upstream protocol layer.
//!
//! Everything that talks to the generation service lives here: the region
//! endpoint table, the HTTP transport abstraction, the wire types for the
//! draft-generate and history endpoints, and the authenticated client.

mod client;
mod endpoints;
mod transport;
mod types;

pub use client::UpstreamClient;
pub use endpoints::{resolve_endpoints, RegionEndpoints, ResolvedEndpoints};
pub use transport::{ReqwestTransport, Transport, TransportError};
pub use types::{
    GenerateResponse, HistoryRecord, ItemEntry, UploadToken, HISTORY_STATUS_FAILED,
    HISTORY_STATUS_SUCCEEDED,
};

#[cfg(test)]
pub use transport::tests::MockTransport;

use thiserror::Error;

/// Errors from the upstream protocol layer.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport-level failure (connect, timeout, non-2xx).
    #[error("upstream request failed: {0}")]
    Transport(#[from] TransportError),

    /// Response parsed but missing a required field, or not JSON at all.
    #[error("upstream protocol error: {0}")]
    Protocol(String),

    /// The upstream rejected the generation with a non-zero fail code.
    #[error("upstream generation failed (fail_code={fail_code})")]
    GenerationFailed { fail_code: i64 },
}
