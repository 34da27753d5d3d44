//! Atomic check-and-increment over the usage store.
//!
//! Controllers run a check-then-increment-on-success protocol: `check`
//! before contacting the upstream, `increment` only after a successful
//! generation. Both operations serialize against other callers touching
//! the same `(session, date)` key, and `increment` re-checks inside the
//! critical section so the brief window between the two calls can never
//! push a count past its limit.

use super::store::UsageStore;
use super::types::{usage_key, QuotaDecision, ServiceKind, ServiceLimits, SessionDailyUsage};
use super::QuotaError;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Per-session daily quota ledger.
pub struct QuotaLedger {
    limits: ServiceLimits,
    store: UsageStore,
    /// One async mutex per `(session, date)` key.
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl QuotaLedger {
    /// Opens the ledger over `data_dir`, rebuilding counters from the
    /// persisted document.
    pub fn open(data_dir: &Path, limits: ServiceLimits) -> Result<Self, QuotaError> {
        let store = UsageStore::open(data_dir)?;
        info!(
            image = limits.image,
            video = limits.video,
            avatar = limits.avatar,
            "Quota ledger ready"
        );
        Ok(Self {
            limits,
            store,
            key_locks: DashMap::new(),
        })
    }

    /// Configured limits.
    pub fn limits(&self) -> ServiceLimits {
        self.limits
    }

    /// Checks whether `session` may start a `service` generation today.
    pub async fn check(&self, session: &str, service: ServiceKind) -> QuotaDecision {
        let today = today();
        let key = usage_key(session, today);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let row = self
            .store
            .get_or_create(&key, || SessionDailyUsage::new(session, today));
        self.decide(&row, service)
    }

    /// Records one successful `service` generation for `session`.
    ///
    /// Re-checks the limit inside the per-key critical section; a session
    /// racing itself cannot exceed the cap. Persists before returning.
    pub async fn increment(&self, session: &str, service: ServiceKind) -> Result<(), QuotaError> {
        let today = today();
        let key = usage_key(session, today);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let mut row = self
            .store
            .get_or_create(&key, || SessionDailyUsage::new(session, today));

        let decision = self.decide(&row, service);
        if !decision.allowed {
            return Err(QuotaError::Exceeded {
                service,
                current: decision.current,
                limit: decision.limit,
            });
        }

        row.record(service);
        debug!(
            session = session,
            service = %service,
            count = row.count(service),
            "Usage recorded"
        );
        self.store.put(row)
    }

    /// Read access for the stats queries.
    pub(crate) fn store(&self) -> &UsageStore {
        &self.store
    }

    fn decide(&self, row: &SessionDailyUsage, service: ServiceKind) -> QuotaDecision {
        let current = row.count(service);
        let limit = self.limits.limit(service);
        QuotaDecision {
            allowed: current < limit,
            current,
            limit,
            remaining: limit.saturating_sub(current),
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ServiceLimits {
        ServiceLimits {
            image: 3,
            video: 2,
            avatar: 1,
        }
    }

    fn open_ledger(dir: &Path) -> QuotaLedger {
        QuotaLedger::open(dir, limits()).unwrap()
    }

    #[tokio::test]
    async fn test_check_fresh_session_is_allowed() {
        let temp = tempfile::TempDir::new().unwrap();
        let ledger = open_ledger(temp.path());

        let decision = ledger.check("session_x", ServiceKind::Image).await;
        assert!(decision.allowed);
        assert_eq!(decision.current, 0);
        assert_eq!(decision.limit, 3);
        assert_eq!(decision.remaining, 3);
    }

    #[tokio::test]
    async fn test_increment_observes_plus_one() {
        let temp = tempfile::TempDir::new().unwrap();
        let ledger = open_ledger(temp.path());

        ledger.increment("session_x", ServiceKind::Image).await.unwrap();
        let decision = ledger.check("session_x", ServiceKind::Image).await;
        assert_eq!(decision.current, 1);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn test_limit_is_enforced() {
        let temp = tempfile::TempDir::new().unwrap();
        let ledger = open_ledger(temp.path());

        for _ in 0..2 {
            ledger.increment("session_x", ServiceKind::Video).await.unwrap();
        }
        let err = ledger
            .increment("session_x", ServiceKind::Video)
            .await
            .unwrap_err();
        match err {
            QuotaError::Exceeded {
                service,
                current,
                limit,
            } => {
                assert_eq!(service, ServiceKind::Video);
                assert_eq!(current, 2);
                assert_eq!(limit, 2);
            }
            other => panic!("unexpected: {other:?}"),
        }

        // Count never passes the cap.
        let decision = ledger.check("session_x", ServiceKind::Video).await;
        assert_eq!(decision.current, 2);
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_services_count_independently() {
        let temp = tempfile::TempDir::new().unwrap();
        let ledger = open_ledger(temp.path());

        ledger.increment("session_x", ServiceKind::Avatar).await.unwrap();
        assert!(!ledger.check("session_x", ServiceKind::Avatar).await.allowed);
        assert!(ledger.check("session_x", ServiceKind::Image).await.allowed);
        assert!(ledger.check("session_x", ServiceKind::Video).await.allowed);
    }

    #[tokio::test]
    async fn test_sessions_count_independently() {
        let temp = tempfile::TempDir::new().unwrap();
        let ledger = open_ledger(temp.path());

        ledger.increment("session_a", ServiceKind::Image).await.unwrap();
        assert_eq!(ledger.check("session_a", ServiceKind::Image).await.current, 1);
        assert_eq!(ledger.check("session_b", ServiceKind::Image).await.current, 0);
    }

    #[tokio::test]
    async fn test_counters_survive_restart() {
        let temp = tempfile::TempDir::new().unwrap();
        {
            let ledger = open_ledger(temp.path());
            ledger.increment("session_x", ServiceKind::Image).await.unwrap();
            ledger.increment("session_x", ServiceKind::Image).await.unwrap();
        }

        let reopened = open_ledger(temp.path());
        let decision = reopened.check("session_x", ServiceKind::Image).await;
        assert_eq!(decision.current, 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments_never_exceed_limit() {
        let temp = tempfile::TempDir::new().unwrap();
        let ledger = Arc::new(open_ledger(temp.path()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.increment("session_x", ServiceKind::Image).await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        // Exactly the limit worth of increments won the race.
        assert_eq!(successes, 3);
        let decision = ledger.check("session_x", ServiceKind::Image).await;
        assert_eq!(decision.current, 3);
    }
}
