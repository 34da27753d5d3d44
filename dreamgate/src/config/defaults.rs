//! Compiled-in configuration defaults.
//!
//! These constants are the single source of truth for default values; the
//! settings structs and the env overlay both reference them.

/// Default bind host for the HTTP server.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port for the HTTP server.
pub const DEFAULT_PORT: u16 = 5566;

/// Default maximum number of concurrently running tasks.
pub const DEFAULT_TASK_MAX_CONCURRENT: usize = 10;

/// Default wall-clock timeout for image tasks (15 minutes).
pub const DEFAULT_IMAGE_TASK_TIMEOUT_SECS: u64 = 15 * 60;

/// Default wall-clock timeout for video tasks (30 minutes).
pub const DEFAULT_VIDEO_TASK_TIMEOUT_SECS: u64 = 30 * 60;

/// How long terminal tasks are retained before the reaper removes them.
pub const DEFAULT_TASK_RETENTION_SECS: u64 = 24 * 60 * 60;

/// Scheduler admission tick interval.
pub const DEFAULT_SCHEDULER_TICK_SECS: u64 = 1;

/// Default daily image generation limit per session.
pub const DEFAULT_IMAGE_DAILY_LIMIT: u32 = 10;

/// Default daily video generation limit per session.
pub const DEFAULT_VIDEO_DAILY_LIMIT: u32 = 2;

/// Default daily avatar generation limit per session.
pub const DEFAULT_AVATAR_DAILY_LIMIT: u32 = 1;

/// Default retention for quota ledger rows, in days.
pub const DEFAULT_QUOTA_RETENTION_DAYS: u32 = 30;

/// Default data directory (quota ledger lives here).
pub const DEFAULT_DATA_DIR: &str = "data";

/// Per-request HTTP timeout against the upstream, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default maximum poll iterations for image generations.
pub const DEFAULT_IMAGE_MAX_POLLS: u32 = 900;

/// Default maximum poll iterations for video generations.
pub const DEFAULT_VIDEO_MAX_POLLS: u32 = 360;

/// Default log level when RUST_LOG is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default SOCKS proxy timeout, in seconds.
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 10;
