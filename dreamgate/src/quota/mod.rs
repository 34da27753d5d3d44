//! Per-session daily quota ledger.
//!
//! Every session gets a daily allowance per service kind (image, video,
//! avatar). The ledger enforces the allowance *before* a generation
//! starts and records usage *after* success, with atomic per-key
//! check-and-increment semantics and a crash-safe JSON file behind it.

mod ledger;
mod stats;
mod store;
mod types;

pub use ledger::QuotaLedger;
pub use stats::{DailyStats, RangeStats};
pub use store::UsageStore;
pub use types::{QuotaDecision, ServiceKind, ServiceLimits, SessionDailyUsage};

use thiserror::Error;

/// Errors from the quota ledger.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// The session exhausted its daily allowance for the service.
    #[error("daily {service} quota exceeded ({current}/{limit})")]
    Exceeded {
        service: ServiceKind,
        current: u32,
        limit: u32,
    },

    /// Ledger storage failed.
    #[error("quota storage error: {0}")]
    Io(String),
}
