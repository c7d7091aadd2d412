//! Configuration types for the sauna dashboard

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::units::TemperatureUnit;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Controller connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Anti-forgery token attached to mutating requests
    #[serde(default)]
    pub csrf_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            csrf_token: None,
        }
    }
}

/// Per-view polling cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_status_interval", with = "humantime_serde")]
    pub status: Duration,
    #[serde(default = "default_fans_interval", with = "humantime_serde")]
    pub fans: Duration,
    #[serde(default = "default_errors_interval", with = "humantime_serde")]
    pub errors: Duration,
    /// Absent: settings are fetched once when the session opens
    #[serde(default, with = "humantime_serde")]
    pub settings: Option<Duration>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status: default_status_interval(),
            fans: default_fans_interval(),
            errors: default_errors_interval(),
            settings: None,
        }
    }
}

/// Pending edit reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_pending_edit_timeout", with = "humantime_serde")]
    pub pending_edit_timeout: Duration,
    #[serde(default = "default_expiry_sweep_interval", with = "humantime_serde")]
    pub expiry_sweep_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pending_edit_timeout: default_pending_edit_timeout(),
            expiry_sweep_interval: default_expiry_sweep_interval(),
        }
    }
}

/// Retry policy for idempotent commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// Local validation bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_min_target_temp_f")]
    pub min_target_temp_f: f64,
    /// Used until a settings snapshot supplies `max_temp_f`
    #[serde(default = "default_max_target_temp_f")]
    pub max_target_temp_f: f64,
    #[serde(default = "default_max_fan_speed_pct")]
    pub max_fan_speed_pct: i64,
    #[serde(default = "default_max_fan_runtime_hrs")]
    pub max_fan_runtime_hrs: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_target_temp_f: default_min_target_temp_f(),
            max_target_temp_f: default_max_target_temp_f(),
            max_fan_speed_pct: default_max_fan_speed_pct(),
            max_fan_runtime_hrs: default_max_fan_runtime_hrs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub unit: TemperatureUnit,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_status_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_fans_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_errors_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_pending_edit_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_expiry_sweep_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_min_target_temp_f() -> f64 {
    100.0
}

fn default_max_target_temp_f() -> f64 {
    250.0
}

fn default_max_fan_speed_pct() -> i64 {
    100
}

fn default_max_fan_runtime_hrs() -> f64 {
    12.0
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path)
        .inspect_err(|e| tracing::error!("Failed to read config file {:?}: {}", path, e))?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reject settings that would make the session unusable
    pub fn validate(&self) -> crate::Result<()> {
        let intervals = [
            ("polling.status", Some(self.polling.status)),
            ("polling.fans", Some(self.polling.fans)),
            ("polling.errors", Some(self.polling.errors)),
            ("polling.settings", self.polling.settings),
            ("sync.expiry_sweep_interval", Some(self.sync.expiry_sweep_interval)),
        ];
        for (name, interval) in intervals {
            if interval.is_some_and(|d| d.is_zero()) {
                return Err(crate::DashboardError::Config(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        if self.limits.min_target_temp_f > self.limits.max_target_temp_f {
            return Err(crate::DashboardError::Config(format!(
                "limits.min_target_temp_f ({}) exceeds limits.max_target_temp_f ({})",
                self.limits.min_target_temp_f, self.limits.max_target_temp_f
            )));
        }
        Ok(())
    }
}
