//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/fieldscope/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/fieldscope/` (~/.config/fieldscope/)
//! - State/Logs/Session: `$XDG_STATE_HOME/fieldscope/` (~/.local/state/fieldscope/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Smallest accepted telemetry history capacity.
pub const MIN_HISTORY_CAPACITY: usize = 20;
/// Largest accepted telemetry history capacity.
pub const MAX_HISTORY_CAPACITY: usize = 200;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Gateway connection settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Telemetry aggregation settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Realtime channel settings
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Base URL of the HTTP gateway
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// WebSocket URL override; derived from `base_url` when absent
    pub websocket_url: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            websocket_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    /// Base URL with any trailing slash removed.
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Build the push-notification URL for a (token, field) scope.
    ///
    /// Uses `websocket_url` verbatim when configured, otherwise rewrites the
    /// HTTP base URL scheme (`http` → `ws`, `https` → `wss`).
    pub fn notifications_url(&self, token: &str, field: &str) -> String {
        let base = match &self.websocket_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let base = self.trimmed_base_url();
                if let Some(rest) = base.strip_prefix("https://") {
                    format!("wss://{}", rest)
                } else if let Some(rest) = base.strip_prefix("http://") {
                    format!("ws://{}", rest)
                } else {
                    base.to_string()
                }
            }
        };
        format!(
            "{}/ws/notifications?token={}&field={}",
            base,
            urlencoding::encode(token),
            urlencoding::encode(field)
        )
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Telemetry aggregation configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Readings retained per series (valid range 20 to 200)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Key series by sensor type and sensor id instead of type alone
    #[serde(default)]
    pub group_by_sensor: bool,

    /// Readings requested per snapshot fetch
    #[serde(default = "default_snapshot_limit")]
    pub snapshot_limit: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            group_by_sensor: false,
            snapshot_limit: default_snapshot_limit(),
        }
    }
}

fn default_history_capacity() -> usize {
    50
}

fn default_snapshot_limit() -> usize {
    50
}

/// Realtime channel reconnect configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeConfig {
    /// Reconnect after unexpected closes; when false a lost connection
    /// stays lost until the scope is reopened
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,

    /// First reconnect delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on the reconnect delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Delay growth factor between attempts
    #[serde(default = "default_delay_multiplier")]
    pub delay_multiplier: f64,

    /// Attempts before giving up; 0 means retry forever
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect: default_reconnect(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            delay_multiplier: default_delay_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_reconnect() -> bool {
    true
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_delay_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    10
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.gateway.base_url.trim().is_empty() {
            return Err(Error::Config(
                "gateway.base_url must not be empty".to_string(),
            ));
        }
        if !(MIN_HISTORY_CAPACITY..=MAX_HISTORY_CAPACITY).contains(&self.telemetry.history_capacity)
        {
            return Err(Error::Config(format!(
                "telemetry.history_capacity must be between {} and {}",
                MIN_HISTORY_CAPACITY, MAX_HISTORY_CAPACITY
            )));
        }
        if self.telemetry.snapshot_limit == 0 {
            return Err(Error::Config(
                "telemetry.snapshot_limit must be at least 1".to_string(),
            ));
        }
        if self.realtime.initial_delay_ms == 0 || self.realtime.max_delay_ms == 0 {
            return Err(Error::Config(
                "realtime delays must be greater than zero".to_string(),
            ));
        }
        if self.realtime.delay_multiplier < 1.0 {
            return Err(Error::Config(
                "realtime.delay_multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/fieldscope/config.toml` (~/.config/fieldscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("fieldscope").join("config.toml")
    }

    /// Returns the state directory path (for logs and the session snapshot)
    ///
    /// `$XDG_STATE_HOME/fieldscope/` (~/.local/state/fieldscope/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("fieldscope")
    }

    /// Returns the persisted session file path
    ///
    /// `$XDG_STATE_HOME/fieldscope/session.json`
    pub fn session_path() -> PathBuf {
        Self::state_dir().join("session.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/fieldscope/fieldscope.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("fieldscope.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.base_url, "http://localhost:8000");
        assert_eq!(config.telemetry.history_capacity, 50);
        assert_eq!(config.telemetry.snapshot_limit, 50);
        assert!(config.realtime.reconnect);
        assert_eq!(config.realtime.max_attempts, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[gateway]
base_url = "https://farm.example.com/api"
timeout_secs = 10

[telemetry]
history_capacity = 100
group_by_sensor = true

[realtime]
reconnect = false

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.gateway.base_url, "https://farm.example.com/api");
        assert_eq!(config.gateway.timeout_secs, 10);
        assert_eq!(config.telemetry.history_capacity, 100);
        assert!(config.telemetry.group_by_sensor);
        assert!(!config.realtime.reconnect);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_history_capacity_bounds() {
        let mut config = Config::default();
        config.telemetry.history_capacity = 19;
        assert!(config.validate().is_err());

        config.telemetry.history_capacity = 20;
        assert!(config.validate().is_ok());

        config.telemetry.history_capacity = 200;
        assert!(config.validate().is_ok());

        config.telemetry.history_capacity = 201;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_notifications_url_from_http_base() {
        let gateway = GatewayConfig {
            base_url: "http://localhost:8000/".to_string(),
            websocket_url: None,
            timeout_secs: 30,
        };
        assert_eq!(
            gateway.notifications_url("tok", "field 1"),
            "ws://localhost:8000/ws/notifications?token=tok&field=field%201"
        );
    }

    #[test]
    fn test_notifications_url_from_https_base() {
        let gateway = GatewayConfig {
            base_url: "https://farm.example.com".to_string(),
            websocket_url: None,
            timeout_secs: 30,
        };
        assert!(gateway
            .notifications_url("tok", "f1")
            .starts_with("wss://farm.example.com/ws/notifications"));
    }

    #[test]
    fn test_notifications_url_override() {
        let gateway = GatewayConfig {
            base_url: "http://localhost:8000".to_string(),
            websocket_url: Some("ws://push.example.com/".to_string()),
            timeout_secs: 30,
        };
        assert_eq!(
            gateway.notifications_url("t", "f"),
            "ws://push.example.com/ws/notifications?token=t&field=f"
        );
    }
}
