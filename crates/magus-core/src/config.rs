//! Configuration management for Magus
//!
//! Settings come from `~/.config/magus/config.toml` (defaults when absent)
//! with environment overrides applied on top. The resulting [`Config`] is
//! handed to the API client, controllers and assistant at construction.

use crate::error::{Error, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable overriding `api.base_url`
pub const ENV_API_BASE_URL: &str = "MAGUS_API_BASE_URL";

/// Environment variable overriding `assistant.model`
pub const ENV_ASSISTANT_MODEL: &str = "MAGUS_ASSISTANT_MODEL";

/// Environment variable overriding `general.timezone`
pub const ENV_TIMEZONE: &str = "MAGUS_TIMEZONE";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Inbox paging and caching settings
    #[serde(default)]
    pub inbox: InboxConfig,

    /// Leaderboard statistics settings
    #[serde(default)]
    pub stats: StatsConfig,

    /// Chat assistant settings
    #[serde(default)]
    pub assistant: AssistantConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level or EnvFilter directive (e.g. "info", "magus_core=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for daemon log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Time zone used to bucket records for charts (e.g. "Europe/Berlin")
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            timezone: default_timezone(),
        }
    }
}

/// Remote API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL including the version prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Send the tunnel bypass header (`ngrok-skip-browser-warning`)
    #[serde(default = "default_true")]
    pub tunnel_bypass: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            tunnel_bypass: true,
        }
    }
}

/// Inbox paging and caching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxConfig {
    /// Page size for server-paged filters
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Page size used while fetching the full dataset
    #[serde(default = "default_full_fetch_batch")]
    pub full_fetch_batch: u32,

    /// Row cap for full dataset fetches
    #[serde(default = "default_full_fetch_max_rows")]
    pub full_fetch_max_rows: usize,

    /// Character budget for list previews
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Cache staleness window and daemon refresh interval (seconds)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            full_fetch_batch: default_full_fetch_batch(),
            full_fetch_max_rows: default_full_fetch_max_rows(),
            preview_chars: default_preview_chars(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

/// Leaderboard statistics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_route_top")]
    pub route_top: u32,

    #[serde(default = "default_route_max_rows")]
    pub route_max_rows: u32,

    #[serde(default = "default_route_batch_size")]
    pub route_batch_size: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            route_top: default_route_top(),
            route_max_rows: default_route_max_rows(),
            route_batch_size: default_route_batch_size(),
        }
    }
}

/// Chat assistant settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_assistant_endpoint")]
    pub endpoint: String,

    /// Model name sent with every request
    #[serde(default = "default_assistant_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Resolved API key (never written back to disk)
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: default_assistant_endpoint(),
            model: default_assistant_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
            temperature: default_temperature(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    get_data_dir().join("logs")
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> u32 {
    50
}

fn default_full_fetch_batch() -> u32 {
    100
}

fn default_full_fetch_max_rows() -> usize {
    20_000
}

fn default_preview_chars() -> usize {
    120
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_route_top() -> u32 {
    100
}

fn default_route_max_rows() -> u32 {
    20_000
}

fn default_route_batch_size() -> u32 {
    1000
}

fn default_assistant_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_assistant_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "MAGUS_ASSISTANT_API_KEY".to_string()
}

fn default_temperature() -> f64 {
    0.2
}

/// Get the data directory (XDG: ~/.local/share/magus)
fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join(crate::APP_NAME)
}

/// Get the config directory (XDG: ~/.config/magus)
fn get_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(crate::APP_NAME)
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        get_config_dir().join("config.toml")
    }

    /// Load configuration from the default path, apply the process
    /// environment and validate
    pub fn load() -> Result<Self> {
        Self::load_with(&Self::default_path(), |key| std::env::var(key).ok())
    }

    /// Load from `path`, apply overrides from `lookup` and validate.
    /// Invalid values are an error; nothing falls back to defaults.
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::load_from(path)?;
        config.apply_env(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path (no env, no validation)
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            info!("No config file found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_API_BASE_URL) {
            self.api.base_url = url;
        }
        if let Some(model) = non_empty(ENV_ASSISTANT_MODEL) {
            self.assistant.model = model;
        }
        if let Some(tz) = non_empty(ENV_TIMEZONE) {
            self.general.timezone = tz;
        }
        if let Some(key) = non_empty(&self.assistant.api_key_env) {
            self.assistant.api_key = Some(key);
        }
    }

    /// Check values that would otherwise fail deep inside a request
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.base_url).map_err(|e| Error::InvalidConfig {
            field: "api.base_url".to_string(),
            reason: e.to_string(),
        })?;

        self.timezone()?;

        if self.inbox.page_size == 0 {
            return Err(Error::InvalidConfig {
                field: "inbox.page_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.inbox.full_fetch_batch == 0 {
            return Err(Error::InvalidConfig {
                field: "inbox.full_fetch_batch".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.inbox.refresh_interval_secs == 0 {
            return Err(Error::InvalidConfig {
                field: "inbox.refresh_interval_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Parsed bucketing time zone
    pub fn timezone(&self) -> Result<Tz> {
        self.general
            .timezone
            .parse::<Tz>()
            .map_err(|e| Error::InvalidConfig {
                field: "general.timezone".to_string(),
                reason: e.to_string(),
            })
    }
}
