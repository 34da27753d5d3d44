//! Environment variable overlay.
//!
//! Environment variables take precedence over the YAML file. Unparseable
//! values are ignored with a warning rather than failing startup.

use super::settings::GatewayConfig;
use std::str::FromStr;
use tracing::warn;

/// Applies all recognized environment variables on top of `config`.
pub fn apply_env_overrides(config: &mut GatewayConfig) {
    // Server
    if let Some(host) = env_string("HOST") {
        config.server.host = host;
    }
    set_parsed(&mut config.server.port, "PORT");

    // Task engine
    set_parsed(&mut config.task.max_concurrent, "TASK_MAX_CONCURRENT");
    set_parsed(&mut config.task.image_timeout_secs, "TASK_IMAGE_TIMEOUT_SECS");
    set_parsed(&mut config.task.video_timeout_secs, "TASK_VIDEO_TIMEOUT_SECS");

    // Quota
    set_parsed(&mut config.quota.image_limit, "QUOTA_IMAGE_LIMIT");
    set_parsed(&mut config.quota.video_limit, "QUOTA_VIDEO_LIMIT");
    set_parsed(&mut config.quota.avatar_limit, "QUOTA_AVATAR_LIMIT");
    set_parsed(&mut config.quota.retention_days, "QUOTA_RETENTION_DAYS");
    if let Some(dir) = env_string("DATA_DIR") {
        config.quota.data_dir = dir.into();
    }

    // Generation
    set_parsed(&mut config.generation.video_max_polls, "VIDEO_MAX_POLLS");

    // Mirrors
    config.mirrors.jimeng_cn = env_string("JIMENG_CN_MIRROR").or(config.mirrors.jimeng_cn.take());
    config.mirrors.dreamina_us =
        env_string("DREAMINA_US_MIRROR").or(config.mirrors.dreamina_us.take());
    config.mirrors.dreamina_hk =
        env_string("DREAMINA_HK_MIRROR").or(config.mirrors.dreamina_hk.take());
    config.mirrors.imagex_cn = env_string("IMAGEX_CN_MIRROR").or(config.mirrors.imagex_cn.take());
    config.mirrors.imagex_us = env_string("IMAGEX_US_MIRROR").or(config.mirrors.imagex_us.take());
    config.mirrors.imagex_hk = env_string("IMAGEX_HK_MIRROR").or(config.mirrors.imagex_hk.take());
    config.mirrors.commerce_us =
        env_string("COMMERCE_US_MIRROR").or(config.mirrors.commerce_us.take());
    config.mirrors.commerce_hk =
        env_string("COMMERCE_HK_MIRROR").or(config.mirrors.commerce_hk.take());

    // Proxy
    if let Some(enabled) = env_string("PROXY_ENABLED") {
        config.proxy.enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
    }
    if let Some(host) = env_string("PROXY_HOST") {
        config.proxy.host = host;
    }
    set_parsed(&mut config.proxy.port, "PROXY_PORT");
    if let Some(proxy_type) = env_string("PROXY_TYPE") {
        config.proxy.proxy_type = proxy_type;
    }
    config.proxy.auth = env_string("PROXY_AUTH").or(config.proxy.auth.take());
    if let Some(bypass) = env_string("PROXY_BYPASS") {
        config.proxy.bypass = bypass
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    set_parsed(&mut config.proxy.timeout_secs, "PROXY_TIMEOUT_SECS");

    // Logging
    if let Some(level) = env_string("LOG_LEVEL") {
        config.logging.level = level;
    }
}

/// Reads a non-empty environment variable.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parses an environment variable into `target`, warning on bad values.
fn set_parsed<T: FromStr>(target: &mut T, key: &str) {
    if let Some(raw) = env_string(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key = key, value = %raw, "Ignoring unparseable environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation is process-global; tests here set distinct keys
    // and restore them to avoid interfering with each other.

    #[test]
    fn test_task_max_concurrent_override() {
        std::env::set_var("TASK_MAX_CONCURRENT", "4");
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config);
        assert_eq!(config.task.max_concurrent, 4);
        std::env::remove_var("TASK_MAX_CONCURRENT");
    }

    #[test]
    fn test_invalid_value_is_ignored() {
        std::env::set_var("QUOTA_IMAGE_LIMIT", "not-a-number");
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config);
        assert_eq!(config.quota.image_limit, 10);
        std::env::remove_var("QUOTA_IMAGE_LIMIT");
    }

    #[test]
    fn test_mirror_override() {
        std::env::set_var("DREAMINA_US_MIRROR", "https://mirror.example.com");
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config);
        assert_eq!(
            config.mirrors.dreamina_us.as_deref(),
            Some("https://mirror.example.com")
        );
        std::env::remove_var("DREAMINA_US_MIRROR");
    }

    #[test]
    fn test_proxy_bypass_list() {
        std::env::set_var("PROXY_BYPASS", "localhost, 127.0.0.1,, internal.lan");
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config);
        assert_eq!(
            config.proxy.bypass,
            vec!["localhost", "127.0.0.1", "internal.lan"]
        );
        std::env::remove_var("PROXY_BYPASS");
    }
}
