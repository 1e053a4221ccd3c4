//! Shared feed configuration types.
//!
//! The CLI reads `brewfeed.toml` into [`FeedConfig`]; the controller and the
//! live channel take the sections they need. Path resolution and error
//! reporting live in the CLI crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "brewfeed.toml";

/// Top-level configuration (persisted as `brewfeed.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeedConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub identity: IdentitySettings,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub live: LiveSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_url")]
    pub url: String,
    /// Bearer token issued by the session service.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            token: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentitySettings {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Periodic history refresh while watching. 0 disables it.
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// Re-fetch history whenever the live channel comes back after a drop.
    #[serde(default = "default_true")]
    pub refresh_on_reconnect: bool,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 0,
            refresh_on_reconnect: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Consecutive failed reconnects before the UI gets a connectivity warning.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Uptime after which a connection counts as healthy and the backoff resets.
    #[serde(default = "default_stable_after_secs")]
    pub stable_after_secs: u64,
    /// Silence on an open stream after which it is treated as dropped. Must
    /// exceed the server's keepalive interval. 0 disables it.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            topic: default_topic(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            stable_after_secs: default_stable_after_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl LiveSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn stable_after(&self) -> Duration {
        Duration::from_secs(self.stable_after_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_server_url() -> String {
    "https://brewfeed.app".to_string()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_topic() -> String {
    "feed".to_string()
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_backoff_factor() -> u32 {
    2
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_stable_after_secs() -> u64 {
    30
}
fn default_idle_timeout_secs() -> u64 {
    90
}

/// Repair values that would make the feed misbehave (empty topic, a zero
/// backoff factor, a cap below the base delay).
/// Returns true when any field was updated.
pub fn apply_sanity_fallbacks(config: &mut FeedConfig) -> bool {
    let mut changed = false;
    let live = &mut config.live;

    if live.topic.trim().is_empty() {
        live.topic = default_topic();
        changed = true;
    }
    if live.backoff_factor == 0 {
        live.backoff_factor = default_backoff_factor();
        changed = true;
    }
    if live.base_delay_ms == 0 {
        live.base_delay_ms = default_base_delay_ms();
        changed = true;
    }
    if live.max_delay_ms < live.base_delay_ms {
        live.max_delay_ms = live.base_delay_ms;
        changed = true;
    }
    if config.server.request_timeout_secs == 0 {
        config.server.request_timeout_secs = default_request_timeout_secs();
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reconnect_schedule() {
        let cfg = FeedConfig::default();
        assert!(cfg.live.enabled);
        assert_eq!(cfg.live.topic, "feed");
        assert_eq!(cfg.live.base_delay(), Duration::from_secs(1));
        assert_eq!(cfg.live.backoff_factor, 2);
        assert_eq!(cfg.live.max_delay(), Duration::from_secs(30));
        assert_eq!(cfg.live.max_reconnect_attempts, 5);
        assert!(cfg.feed.refresh_on_reconnect);
        assert_eq!(cfg.feed.refresh_interval_secs, 0);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: FeedConfig = toml::from_str(
            r#"
[server]
url = "http://localhost:8080"

[live]
max_delay_ms = 5000
"#,
        )
        .expect("parse toml");

        assert_eq!(cfg.server.url, "http://localhost:8080");
        assert_eq!(cfg.server.request_timeout_secs, 15);
        assert_eq!(cfg.live.max_delay_ms, 5000);
        assert_eq!(cfg.live.base_delay_ms, 1000);
        assert!(cfg.identity.user_id.is_empty());
    }

    #[test]
    fn idle_timeout_defaults_on_and_zero_disables() {
        let cfg = FeedConfig::default();
        assert_eq!(cfg.live.idle_timeout(), Some(Duration::from_secs(90)));

        let cfg: FeedConfig = toml::from_str("[live]\nidle_timeout_secs = 0\n").expect("parse toml");
        assert_eq!(cfg.live.idle_timeout(), None);
    }

    #[test]
    fn default_config_serializes() {
        let encoded = toml::to_string_pretty(&FeedConfig::default()).expect("serialize config");
        assert!(encoded.contains("topic = \"feed\""));
        assert!(encoded.contains("refresh_on_reconnect = true"));
        assert!(encoded.contains("max_reconnect_attempts = 5"));
    }

    #[test]
    fn sanity_fallbacks_repair_bad_values() {
        let mut cfg: FeedConfig = toml::from_str(
            r#"
[live]
topic = "  "
backoff_factor = 0
base_delay_ms = 2000
max_delay_ms = 500
"#,
        )
        .expect("parse toml");

        assert!(apply_sanity_fallbacks(&mut cfg));
        assert_eq!(cfg.live.topic, "feed");
        assert_eq!(cfg.live.backoff_factor, 2);
        assert_eq!(cfg.live.max_delay_ms, 2000);
    }

    #[test]
    fn sanity_fallbacks_noop_for_defaults() {
        let mut cfg = FeedConfig::default();
        assert!(!apply_sanity_fallbacks(&mut cfg));
    }
}
