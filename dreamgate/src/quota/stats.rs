//! Usage aggregation and retention queries.
//!
//! Read-side companions to the ledger: daily aggregates across sessions,
//! range aggregates by date, per-session history, and retention cleanup.

use super::ledger::QuotaLedger;
use super::types::SessionDailyUsage;
use super::QuotaError;
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

/// Aggregate across all sessions for one date.
#[derive(Debug, Clone, Serialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub sessions: usize,
    pub image_total: u64,
    pub video_total: u64,
    pub avatar_total: u64,
    pub image_avg: f64,
    pub video_avg: f64,
    pub avatar_avg: f64,
}

impl DailyStats {
    fn from_rows(date: NaiveDate, rows: &[&SessionDailyUsage]) -> Self {
        let sessions = rows.len();
        let image_total: u64 = rows.iter().map(|r| u64::from(r.image_count)).sum();
        let video_total: u64 = rows.iter().map(|r| u64::from(r.video_count)).sum();
        let avatar_total: u64 = rows.iter().map(|r| u64::from(r.avatar_count)).sum();
        let denom = sessions.max(1) as f64;
        Self {
            date,
            sessions,
            image_total,
            video_total,
            avatar_total,
            image_avg: image_total as f64 / denom,
            video_avg: video_total as f64 / denom,
            avatar_avg: avatar_total as f64 / denom,
        }
    }
}

/// Aggregate over a date range.
#[derive(Debug, Clone, Serialize)]
pub struct RangeStats {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub days: Vec<DailyStats>,
}

impl QuotaLedger {
    /// Aggregate across sessions for one date.
    pub fn daily_stats(&self, date: NaiveDate) -> DailyStats {
        let snapshot = self.store().snapshot();
        let rows: Vec<&SessionDailyUsage> =
            snapshot.values().filter(|row| row.date == date).collect();
        DailyStats::from_rows(date, &rows)
    }

    /// Per-day aggregates for an inclusive date range.
    ///
    /// Days without any rows are included with zero totals, so the series
    /// is continuous for charting.
    pub fn range_stats(&self, from: NaiveDate, to: NaiveDate) -> RangeStats {
        let snapshot = self.store().snapshot();
        let mut days = Vec::new();
        let mut date = from;
        while date <= to {
            let rows: Vec<&SessionDailyUsage> =
                snapshot.values().filter(|row| row.date == date).collect();
            days.push(DailyStats::from_rows(date, &rows));
            date = date + Duration::days(1);
        }
        RangeStats { from, to, days }
    }

    /// Usage rows for one session over the trailing `days` days,
    /// most recent first. Days without usage have no row.
    pub fn session_history(&self, session: &str, days: u32) -> Vec<SessionDailyUsage> {
        let cutoff = Utc::now().date_naive() - Duration::days(i64::from(days));
        let mut rows: Vec<SessionDailyUsage> = self
            .store()
            .snapshot()
            .into_values()
            .filter(|row| row.session_id == session && row.date > cutoff)
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        rows
    }

    /// Removes rows older than `retention_days`. Returns the removed
    /// count.
    pub fn cleanup(&self, retention_days: u32) -> Result<usize, QuotaError> {
        let cutoff = Utc::now().date_naive() - Duration::days(i64::from(retention_days));
        let removed = self.store().remove_older_than(cutoff)?;
        if removed > 0 {
            info!(removed = removed, cutoff = %cutoff, "Stale usage rows removed");
        }
        Ok(removed)
    }
}
