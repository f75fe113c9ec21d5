//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in a small TOML file. Every field has a
//! built-in default, so a missing or partial file never prevents startup.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `PTRACK_CONFIG` environment variable
//! 3. User config directory (`<config_dir>/ptrack/config.toml`)
//! 4. Compiled defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PTRACK_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Process-record service connection
    #[serde(default)]
    pub api: ApiConfig,

    /// Scan timing (debounce window, settle delays)
    #[serde(default)]
    pub scan: ScanTimings,

    /// Product detail cache sizing
    #[serde(default)]
    pub cache: CacheConfig,

    /// Operator profile file (defaults next to the config file)
    #[serde(default)]
    pub profile_path: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Process-record service connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `http://192.168.1.20:8000`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Scan timing parameters, all in milliseconds
///
/// Settle delays are cool-downs: the barcode is usually still in front of
/// the camera when a submission finishes, and releasing the session at once
/// would submit it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanTimings {
    /// Same code within this window is a repeat decode
    pub debounce_window_ms: u64,
    /// After a recorded scan, before the session exits
    pub success_settle_ms: u64,
    /// After "already recorded by you"
    pub own_duplicate_settle_ms: u64,
    /// After a failure
    pub failure_settle_ms: u64,
    /// After the blocking duplicate notice is dismissed
    pub dismiss_settle_ms: u64,
    /// After a task claim, before scanning resumes
    pub claim_settle_ms: u64,
    /// After a query lookup
    pub query_settle_ms: u64,
    /// After a batch upload, before the session exits
    pub batch_exit_ms: u64,
}

impl ScanTimings {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

impl Default for ScanTimings {
    fn default() -> Self {
        Self {
            debounce_window_ms: 1000,
            success_settle_ms: 1000,
            own_duplicate_settle_ms: 200,
            failure_settle_ms: 500,
            dismiss_settle_ms: 100,
            claim_settle_ms: 1000,
            query_settle_ms: 300,
            batch_exit_ms: 2000,
        }
    }
}

/// Product detail cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            capacity: 100,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    UserConfigDir(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p)
            | ConfigSource::Environment(p)
            | ConfigSource::UserConfigDir(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

/// Resolve which config file to read
///
/// An explicit path (CLI or env) is returned even if it does not exist so that
/// the loader can warn about it; the user config dir is only used when the
/// file is actually there.
pub fn resolve_config_source(cli_arg: Option<&Path>) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigSource::CommandLine(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return ConfigSource::Environment(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    if let Some(path) = default_config_path() {
        if path.exists() {
            return ConfigSource::UserConfigDir(path);
        }
    }

    // Priority 4: Compiled defaults
    ConfigSource::Defaults
}

/// `<config_dir>/ptrack/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ptrack").join("config.toml"))
}

/// Default operator profile location (`<config_dir>/ptrack/profile.toml`)
pub fn default_profile_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("ptrack").join("profile.toml"))
        .unwrap_or_else(|| PathBuf::from("./ptrack-profile.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Load configuration from the resolved source
///
/// A missing file is not fatal: log a warning and fall back to defaults.
/// A file that exists but cannot be parsed IS an error.
pub fn load_config(source: &ConfigSource) -> Result<TomlConfig> {
    let Some(path) = source.path() else {
        info!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file {} not found, using built-in defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let config = load_toml_config(path)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write a TOML config file
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    crate::profile::write_atomic(path, &content)
}

fn validate(config: &TomlConfig) -> Result<()> {
    let url = config.api.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "api.base_url must start with http:// or https:// (got {:?})",
            config.api.base_url
        )));
    }
    if config.cache.capacity == 0 {
        return Err(Error::Config("cache.capacity must be at least 1".to_string()));
    }
    Ok(())
}
