use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{MailError, Result};

/// Environment variable that overrides the config directory
pub const CONFIG_DIR_ENV: &str = "GMAIL_CLI_CONFIG_DIR";

/// Locations of every file the CLI reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
}

impl AppPaths {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Resolve the config directory: explicit flag, then `GMAIL_CLI_CONFIG_DIR`,
    /// then the platform config dir (`~/.config/gmail-cli` on Linux)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::new(dir));
        }
        if let Ok(dir) = env::var(CONFIG_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Ok(Self::new(dir));
            }
        }
        let base = dirs::config_dir().ok_or_else(|| {
            MailError::ConfigError(format!(
                "Could not determine a config directory; set {}",
                CONFIG_DIR_ENV
            ))
        })?;
        Ok(Self::new(base.join("gmail-cli")))
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn session_file(&self) -> PathBuf {
        self.config_dir.join("session.json")
    }

    pub fn token_file(&self) -> PathBuf {
        self.config_dir.join("token.json")
    }

    pub fn default_credentials_file(&self) -> PathBuf {
        self.config_dir.join("credentials.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub list: ListConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth2 client secret JSON; defaults to `<config_dir>/credentials.json`
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// Use a local redirect listener instead of pasting the consent code
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            open_browser: default_open_browser(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Parallel metadata fetches per listing
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// 0 = watch until interrupted
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

fn default_open_browser() -> bool {
    true
}

fn default_limit() -> usize {
    20
}

fn default_fetch_concurrency() -> usize {
    10
}

fn default_interval_secs() -> u64 {
    10
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // A missing config file is normal; every field has a default
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| MailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| MailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| MailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.list.default_limit == 0 {
            return Err(MailError::ConfigError(
                "list.default_limit must be at least 1".to_string(),
            ));
        }
        if self.list.default_limit > 500 {
            return Err(MailError::ConfigError(
                "list.default_limit cannot exceed 500 (Gmail's page size limit)".to_string(),
            ));
        }

        if self.list.fetch_concurrency == 0 || self.list.fetch_concurrency > 50 {
            return Err(MailError::ConfigError(
                "list.fetch_concurrency must be between 1 and 50".to_string(),
            ));
        }

        if self.watch.interval_secs == 0 {
            return Err(MailError::ConfigError(
                "watch.interval_secs must be at least 1".to_string(),
            ));
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(MailError::ConfigError(format!(
                    "Invalid logging.format: '{}'. Must be 'text' or 'json'",
                    other
                )));
            }
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Client secret location, honouring the config override
    pub fn credentials_path(&self, paths: &AppPaths) -> PathBuf {
        self.auth
            .credentials_path
            .clone()
            .unwrap_or_else(|| paths.default_credentials_file())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
