use anyhow::{Context, Result, bail};
use brewfeed_core::AuthContext;
use brewfeed_runtime_config::{CONFIG_FILE_NAME, FeedConfig, apply_sanity_fallbacks};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::GlobalArgs;

/// Get the config directory path (~/.config/brewfeed/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("brewfeed"))
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Configuration after file loading and command-line overrides.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub path: PathBuf,
    pub exists: bool,
    pub config: FeedConfig,
}

/// Load `path`, returning defaults if it does not exist.
pub fn load_config_from(path: &Path) -> Result<FeedConfig> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(FeedConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let mut config = toml::from_str::<FeedConfig>(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    if apply_sanity_fallbacks(&mut config) {
        warn!(
            "Replaced invalid values in {} with defaults",
            path.display()
        );
    }
    Ok(config)
}

pub fn apply_overrides(config: &mut FeedConfig, args: &GlobalArgs) {
    if let Some(url) = &args.server {
        config.server.url = url.trim_end_matches('/').to_string();
    }
    if let Some(token) = &args.token {
        config.server.token = token.clone();
    }
    if let Some(user) = &args.user {
        config.identity.user_id = user.clone();
    }
}

pub fn resolve(args: &GlobalArgs) -> Result<ResolvedConfig> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => config_path()?,
    };
    let mut config = load_config_from(&path)?;
    apply_overrides(&mut config, args);
    Ok(ResolvedConfig {
        exists: path.exists(),
        path,
        config,
    })
}

/// Credentials for feed requests. A user id is required; the token may be
/// empty for servers that allow anonymous reads.
pub fn auth_context(config: &FeedConfig) -> Result<AuthContext> {
    let user_id = config.identity.user_id.trim();
    if user_id.is_empty() {
        bail!("no user configured (set identity.user_id in brewfeed.toml or pass --user)");
    }
    Ok(AuthContext::new(config.server.token.clone(), user_id))
}

pub fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return "(not set)".to_string();
    }
    if token.chars().count() <= 8 {
        return "********".to_string();
    }
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}...")
}

/// Print current config.
pub fn show_config(resolved: &ResolvedConfig) -> Result<()> {
    let config = &resolved.config;
    println!(
        "Config file: {}{}",
        resolved.path.display(),
        if resolved.exists { "" } else { " (not found, using defaults)" }
    );
    println!();
    println!("[server]");
    println!("  url                  = {}", config.server.url);
    println!("  token                = {}", mask_token(&config.server.token));
    println!(
        "  request_timeout_secs = {}",
        config.server.request_timeout_secs
    );
    println!();
    println!("[identity]");
    println!(
        "  user_id = {}",
        if config.identity.user_id.is_empty() {
            "(not set)"
        } else {
            config.identity.user_id.as_str()
        }
    );
    println!();
    println!("[feed]");
    println!(
        "  refresh_interval_secs = {}",
        config.feed.refresh_interval_secs
    );
    println!(
        "  refresh_on_reconnect  = {}",
        config.feed.refresh_on_reconnect
    );
    println!();
    println!("[live]");
    println!("  enabled                = {}", config.live.enabled);
    println!("  topic                  = {}", config.live.topic);
    println!("  base_delay_ms          = {}", config.live.base_delay_ms);
    println!("  backoff_factor         = {}", config.live.backoff_factor);
    println!("  max_delay_ms           = {}", config.live.max_delay_ms);
    println!(
        "  max_reconnect_attempts = {}",
        config.live.max_reconnect_attempts
    );
    println!("  stable_after_secs      = {}", config.live.stable_after_secs);
    println!("  idle_timeout_secs      = {}", config.live.idle_timeout_secs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_overrides() -> GlobalArgs {
        GlobalArgs {
            config: None,
            server: None,
            token: None,
            user: None,
            verbose: false,
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config.server.url, "https://brewfeed.app");
        assert!(config.live.enabled);
        assert_eq!(config.live.max_reconnect_attempts, 5);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
[server]
url = "http://localhost:8080"
token = "abc"

[live]
topic = "bars"
max_reconnect_attempts = 9
"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.server.url, "http://localhost:8080");
        assert_eq!(config.server.request_timeout_secs, 15);
        assert_eq!(config.live.topic, "bars");
        assert_eq!(config.live.max_reconnect_attempts, 9);
        assert_eq!(config.live.base_delay_ms, 1_000);
        assert!(config.feed.refresh_on_reconnect);
    }

    #[test]
    fn invalid_values_are_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[live]\nbackoff_factor = 0\ntopic = \"  \"\n").unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.live.backoff_factor, 2);
        assert_eq!(config.live.topic, "feed");
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[server\nurl = ").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn resolve_applies_flag_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[identity]\nuser_id = \"file-user\"\n").unwrap();

        let args = GlobalArgs {
            config: Some(path.clone()),
            server: Some("http://example.test/".to_string()),
            token: Some("flag-token".to_string()),
            user: None,
            ..no_overrides()
        };
        let resolved = resolve(&args).unwrap();
        assert!(resolved.exists);
        assert_eq!(resolved.path, path);
        assert_eq!(resolved.config.server.url, "http://example.test");
        assert_eq!(resolved.config.server.token, "flag-token");
        assert_eq!(resolved.config.identity.user_id, "file-user");

        let auth = auth_context(&resolved.config).unwrap();
        assert_eq!(auth.user_id, "file-user");
        assert_eq!(auth.token, "flag-token");
    }

    #[test]
    fn auth_requires_user() {
        let err = auth_context(&FeedConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--user"));
    }

    #[test]
    fn token_is_masked() {
        assert_eq!(mask_token(""), "(not set)");
        assert_eq!(mask_token("short"), "********");
        assert_eq!(mask_token("abcdefghijkl"), "abcd...");
    }
}
