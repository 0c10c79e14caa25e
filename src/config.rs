//! Configuration loading
//!
//! Precedence, lowest first: built-in defaults, `config.toml`, environment
//! (`TEAMFORGE_SERVER_URL`, `TEAMFORGE_API_URL`, `TEAMFORGE_TOKEN`), then
//! whatever the command line sets on top.

use crate::{Result, TeamforgeConfig, TeamforgeError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_SERVER_URL: &str = "TEAMFORGE_SERVER_URL";
pub const ENV_API_URL: &str = "TEAMFORGE_API_URL";
pub const ENV_TOKEN: &str = "TEAMFORGE_TOKEN";

/// Shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    server_url: Option<String>,
    api_url: Option<String>,
    token: Option<String>,
    reconnect_delay_secs: Option<u64>,
    ping_interval_secs: Option<u64>,
    name_max_chars: Option<usize>,
    request_timeout_secs: Option<u64>,
}

/// `$CONFIG_DIR/teamforge/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("teamforge").join("config.toml"))
}

/// Load the config file at `path` over the defaults. A missing file is not an error.
pub fn load_config_file(path: &Path) -> Result<TeamforgeConfig> {
    let config = TeamforgeConfig::default();
    if !path.exists() {
        debug!("No config file at {:?}; using defaults", path);
        return Ok(config);
    }
    let content = std::fs::read_to_string(path)?;
    let parsed: ConfigToml = toml::from_str(&content)
        .map_err(|e| TeamforgeError::Config(format!("{}: {}", path.display(), e)))?;
    merge(config, parsed)
}

fn merge(mut config: TeamforgeConfig, file: ConfigToml) -> Result<TeamforgeConfig> {
    if let Some(url) = file.server_url {
        config.server_url = url;
    }
    if let Some(url) = file.api_url {
        config.api_url = url;
    }
    if file.token.is_some() {
        config = config.with_auth_token(file.token);
    }
    if let Some(secs) = file.reconnect_delay_secs {
        config = config.with_reconnect_delay(Duration::from_secs(secs));
    }
    if let Some(secs) = file.ping_interval_secs {
        if secs == 0 {
            return Err(TeamforgeError::Config(
                "ping_interval_secs must be at least 1".to_string(),
            ));
        }
        config = config.with_ping_interval(Duration::from_secs(secs));
    }
    if let Some(max) = file.name_max_chars {
        if max == 0 {
            return Err(TeamforgeError::Config(
                "name_max_chars must be at least 1".to_string(),
            ));
        }
        config = config.with_name_max_chars(max);
    }
    if let Some(secs) = file.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

/// Apply environment overrides using `lookup` (normally `std::env::var`).
pub fn apply_env_overrides<F>(mut config: TeamforgeConfig, lookup: F) -> TeamforgeConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_SERVER_URL).filter(|v| !v.is_empty()) {
        config.server_url = url;
    }
    if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
        config.api_url = url;
    }
    if let Some(token) = lookup(ENV_TOKEN) {
        config = config.with_auth_token(Some(token));
    }
    config
}

/// Resolve the effective configuration from file and environment.
pub fn load(path: Option<&Path>) -> Result<TeamforgeConfig> {
    let config = match path.map(PathBuf::from).or_else(default_config_path) {
        Some(path) => load_config_file(&path)?,
        None => TeamforgeConfig::default(),
    };
    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}
