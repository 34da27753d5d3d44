//! Quota data types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Service kinds with independent daily allowances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Image,
    Video,
    Avatar,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Avatar => "avatar",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Daily caps per service kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimits {
    pub image: u32,
    pub video: u32,
    pub avatar: u32,
}

impl ServiceLimits {
    /// Cap for one service kind.
    pub fn limit(&self, kind: ServiceKind) -> u32 {
        match kind {
            ServiceKind::Image => self.image,
            ServiceKind::Video => self.video,
            ServiceKind::Avatar => self.avatar,
        }
    }
}

impl From<&crate::config::QuotaSettings> for ServiceLimits {
    fn from(settings: &crate::config::QuotaSettings) -> Self {
        Self {
            image: settings.image_limit,
            video: settings.video_limit,
            avatar: settings.avatar_limit,
        }
    }
}

/// One `(session, date)` usage row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDailyUsage {
    pub session_id: String,
    /// Ledger date, `YYYY-MM-DD`.
    pub date: NaiveDate,
    #[serde(default)]
    pub image_count: u32,
    #[serde(default)]
    pub video_count: u32,
    #[serde(default)]
    pub avatar_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionDailyUsage {
    /// Fresh zeroed row for `(session, date)`.
    pub fn new(session_id: &str, date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            date,
            image_count: 0,
            video_count: 0,
            avatar_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Count for one service kind.
    pub fn count(&self, kind: ServiceKind) -> u32 {
        match kind {
            ServiceKind::Image => self.image_count,
            ServiceKind::Video => self.video_count,
            ServiceKind::Avatar => self.avatar_count,
        }
    }

    /// Bumps the count for one service kind and touches `updated_at`.
    pub fn record(&mut self, kind: ServiceKind) {
        match kind {
            ServiceKind::Image => self.image_count += 1,
            ServiceKind::Video => self.video_count += 1,
            ServiceKind::Avatar => self.avatar_count += 1,
        }
        self.updated_at = Utc::now();
    }

    /// Storage key: `{session}_{YYYY-MM-DD}`.
    pub fn key(&self) -> String {
        usage_key(&self.session_id, self.date)
    }
}

/// Builds the storage key for `(session, date)`.
pub(crate) fn usage_key(session_id: &str, date: NaiveDate) -> String {
    format!("{}_{}", session_id, date.format("%Y-%m-%d"))
}

/// Result of a quota check.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub current: u32,
    pub limit: u32,
    pub remaining: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_lookup() {
        let limits = ServiceLimits {
            image: 10,
            video: 2,
            avatar: 1,
        };
        assert_eq!(limits.limit(ServiceKind::Image), 10);
        assert_eq!(limits.limit(ServiceKind::Video), 2);
        assert_eq!(limits.limit(ServiceKind::Avatar), 1);
    }

    #[test]
    fn test_usage_key_format() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();
        assert_eq!(
            usage_key("session_0123456789abcdef", date),
            "session_0123456789abcdef_2026-08-02"
        );
    }

    #[test]
    fn test_record_touches_updated_at() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();
        let mut row = SessionDailyUsage::new("s", date);
        let before = row.updated_at;
        row.record(ServiceKind::Video);
        assert_eq!(row.video_count, 1);
        assert_eq!(row.image_count, 0);
        assert!(row.updated_at >= before);
    }

    #[test]
    fn test_row_serde_round_trip() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();
        let mut row = SessionDailyUsage::new("session_abc", date);
        row.record(ServiceKind::Image);

        let json = serde_json::to_string(&row).unwrap();
        let parsed: SessionDailyUsage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session_id, "session_abc");
        assert_eq!(parsed.image_count, 1);
        assert_eq!(parsed.date, date);
    }

    #[test]
    fn test_service_kind_display() {
        assert_eq!(ServiceKind::Image.to_string(), "image");
        assert_eq!(ServiceKind::Avatar.to_string(), "avatar");
    }
}
