//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! A missing file falls back to compiled defaults with a warning so the agent
//! still comes up on a fresh install.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// HTTP port the access terminal pushes callbacks to
    #[serde(default = "default_listener_port")]
    pub port: u16,
    /// Callback path configured on the terminal
    #[serde(default = "default_listener_path")]
    pub path: String,
}

fn default_listener_port() -> u16 {
    8080
}

fn default_listener_path() -> String {
    "/hikvision/listen".to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { port: default_listener_port(), path: default_listener_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScaleConfig {
    pub device: String,
    #[serde(default = "default_scale_baud")]
    pub baud: u32,
    #[serde(default = "default_scale_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_scale_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_scale_baud() -> u32 {
    9600
}

fn default_scale_read_timeout_ms() -> u64 {
    1000
}

fn default_scale_reconnect_delay_ms() -> u64 {
    2000
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            device: default_scale_device(),
            baud: default_scale_baud(),
            read_timeout_ms: default_scale_read_timeout_ms(),
            reconnect_delay_ms: default_scale_reconnect_delay_ms(),
        }
    }
}

fn default_scale_device() -> String {
    "/dev/ttyUSB0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Pre-provisioned bearer token used until login succeeds
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
    /// Device id stamped onto created measurements
    #[serde(default = "default_api_device_id")]
    pub device_id: String,
}

fn default_api_timeout_secs() -> u64 {
    30
}

fn default_api_device_id() -> String {
    "bmi-agent".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            username: None,
            password: None,
            access_token: None,
            timeout_secs: default_api_timeout_secs(),
            device_id: default_api_device_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Delay between a successful save and the session resetting, so the
    /// operator sees the result before the display clears
    #[serde(default = "default_save_grace_ms")]
    pub save_grace_ms: u64,
}

fn default_save_grace_ms() -> u64 {
    2000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { save_grace_ms: default_save_grace_ms() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    listener_port: u16,
    listener_path: String,
    scale_device: String,
    scale_baud: u32,
    scale_read_timeout_ms: u64,
    scale_reconnect_delay_ms: u64,
    api_base_url: String,
    api_username: Option<String>,
    api_password: Option<String>,
    api_access_token: Option<String>,
    api_timeout_secs: u64,
    api_device_id: String,
    save_grace_ms: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listener_port: default_listener_port(),
            listener_path: default_listener_path(),
            scale_device: default_scale_device(),
            scale_baud: default_scale_baud(),
            scale_read_timeout_ms: default_scale_read_timeout_ms(),
            scale_reconnect_delay_ms: default_scale_reconnect_delay_ms(),
            api_base_url: "http://localhost:5000".to_string(),
            api_username: None,
            api_password: None,
            api_access_token: None,
            api_timeout_secs: default_api_timeout_secs(),
            api_device_id: default_api_device_id(),
            save_grace_ms: default_save_grace_ms(),
            metrics_interval_secs: default_metrics_interval_secs(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from the --config argument or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            listener_port: toml_config.listener.port,
            listener_path: toml_config.listener.path,
            scale_device: toml_config.scale.device,
            scale_baud: toml_config.scale.baud,
            scale_read_timeout_ms: toml_config.scale.read_timeout_ms,
            scale_reconnect_delay_ms: toml_config.scale.reconnect_delay_ms,
            api_base_url: toml_config.api.base_url,
            api_username: toml_config.api.username,
            api_password: toml_config.api.password,
            api_access_token: toml_config.api.access_token,
            api_timeout_secs: toml_config.api.timeout_secs,
            api_device_id: toml_config.api.device_id,
            save_grace_ms: toml_config.session.save_grace_ms,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load from a path, falling back to defaults if the file is unusable
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn listener_port(&self) -> u16 {
        self.listener_port
    }

    pub fn listener_path(&self) -> &str {
        &self.listener_path
    }

    pub fn scale_device(&self) -> &str {
        &self.scale_device
    }

    pub fn scale_baud(&self) -> u32 {
        self.scale_baud
    }

    pub fn scale_read_timeout_ms(&self) -> u64 {
        self.scale_read_timeout_ms
    }

    pub fn scale_reconnect_delay_ms(&self) -> u64 {
        self.scale_reconnect_delay_ms
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn api_username(&self) -> Option<&str> {
        self.api_username.as_deref()
    }

    pub fn api_password(&self) -> Option<&str> {
        self.api_password.as_deref()
    }

    pub fn api_access_token(&self) -> Option<&str> {
        self.api_access_token.as_deref()
    }

    pub fn api_timeout_secs(&self) -> u64 {
        self.api_timeout_secs
    }

    pub fn api_device_id(&self) -> &str {
        &self.api_device_id
    }

    pub fn save_grace_ms(&self) -> u64 {
        self.save_grace_ms
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listener_port(), 8080);
        assert_eq!(config.listener_path(), "/hikvision/listen");
        assert_eq!(config.scale_baud(), 9600);
        assert_eq!(config.save_grace_ms(), 2000);
        assert_eq!(config.api_device_id(), "bmi-agent");
    }

    #[test]
    fn test_resolve_config_path_from_args() {
        let args = vec!["bmi-agent".to_string(), "--config".to_string(), "/tmp/x.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "/tmp/x.toml");

        let args = vec!["bmi-agent".to_string(), "--config=/tmp/y.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "/tmp/y.toml");
    }

    #[test]
    fn test_load_from_missing_path_falls_back() {
        let config = Config::load_from_path("/nonexistent/bmi-agent.toml");
        assert_eq!(config.listener_port(), 8080);
        assert_eq!(config.config_file(), "default");
    }
}
