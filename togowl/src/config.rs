//! Configuration management for the relay.
//!
//! Loads configuration from TOML files and provides runtime defaults.
//! Secrets (tokens, webhook URL) are not part of this file; they live in the
//! settings store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub task_picker: TaskPickerConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the relay is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay before the second stop click of an interrupt
    #[serde(default = "default_interrupt_restop_delay")]
    pub interrupt_restop_delay_ms: u64,

    /// Entries older than this are not announced when they start counting
    #[serde(default = "default_start_notify_window")]
    pub start_notify_window_seconds: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            interrupt_restop_delay_ms: default_interrupt_restop_delay(),
            start_notify_window_seconds: default_start_notify_window(),
        }
    }
}

impl TimingConfig {
    pub fn interrupt_restop_delay(&self) -> Duration {
        Duration::from_millis(self.interrupt_restop_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Attempts per message before it is dropped (at least 1)
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// Pause between attempts of the same message
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: default_max_delivery_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl DispatcherConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPickerConfig {
    /// Maximum number of tasks offered in the picker
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
}

impl Default for TaskPickerConfig {
    fn default() -> Self {
        Self {
            max_tasks: default_max_tasks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_todoist_sync_url")]
    pub todoist_sync_url: String,

    #[serde(default = "default_todoist_rest_url")]
    pub todoist_rest_url: String,

    #[serde(default = "default_toggl_api_url")]
    pub toggl_api_url: String,

    /// Timeout applied to every remote request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            todoist_sync_url: default_todoist_sync_url(),
            todoist_rest_url: default_todoist_rest_url(),
            toggl_api_url: default_toggl_api_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the settings file (defaults to the user config directory)
    #[serde(default)]
    pub settings_path: Option<String>,
}

impl StorageConfig {
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Config::config_dir().join("settings.json"))
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interrupt_restop_delay() -> u64 {
    1000
}

fn default_start_notify_window() -> u64 {
    10
}

fn default_max_delivery_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    500
}

fn default_max_tasks() -> usize {
    5
}

fn default_todoist_sync_url() -> String {
    "https://api.todoist.com/api/v8".to_string()
}

fn default_todoist_rest_url() -> String {
    "https://api.todoist.com/rest/v1".to_string()
}

fn default_toggl_api_url() -> String {
    "https://www.toggl.com/api/v8".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Directory holding the relay's files
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("togowl")
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
