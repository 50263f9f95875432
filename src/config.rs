use crate::service::{InsightsService, ServiceOptions};
use crate::store::{DocumentStore, MemoryStore, RestStore, RetryConfig, SqliteStore};
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const APP_DIR: &str = "insights-admin";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DB_FILE: &str = "insights.db";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Memory,
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: Backend,
    /// Defaults to `insights.db` next to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Environment variable holding the REST bearer token
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,
}

fn default_api_token_env() -> String {
    "INSIGHTS_API_TOKEN".to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            sqlite_path: None,
            api_base_url: None,
            api_token_env: default_api_token_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Limits {
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_max_batch_writes")]
    pub max_batch_writes: usize,
    #[serde(default = "default_counter_max_attempts")]
    pub counter_max_attempts: u32,
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_max_batch_writes() -> usize {
    500
}

fn default_counter_max_attempts() -> u32 {
    5
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            max_batch_writes: default_max_batch_writes(),
            counter_max_attempts: default_counter_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

impl Config {
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "linux") {
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join(APP_DIR)
        } else {
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(format!(".{}", APP_DIR))
        };

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
            info!("Created config directory: {:?}", config_dir);
        }

        Ok(config_dir)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// A missing file yields the defaults
    pub fn load_from(config_path: &Path) -> Result<Self> {
        debug!("Loading config from: {:?}", config_path);

        if !config_path.exists() {
            info!("Config file doesn't exist, using defaults");
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        debug!("Loaded config with {:?} backend", config.store.backend);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        debug!("Saving config to: {:?}", config_path);

        let config_content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        fs::write(config_path, config_content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        info!("Config saved to {:?}", config_path);
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config to TOML")
    }

    pub fn sqlite_path(&self) -> Result<PathBuf> {
        match &self.store.sqlite_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::get_config_dir()?.join(DEFAULT_DB_FILE)),
        }
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            call_timeout: Duration::from_secs(self.limits.call_timeout_secs),
            max_batch_writes: self.limits.max_batch_writes,
            counter_max_attempts: self.limits.counter_max_attempts,
            backoff: self.retry.to_retry_config(),
        }
    }

    pub async fn open_backend(&self) -> Result<Arc<dyn DocumentStore>> {
        match self.store.backend {
            Backend::Memory => {
                info!("Using in-memory store");
                Ok(Arc::new(MemoryStore::new()))
            }
            Backend::Sqlite => {
                let path = self.sqlite_path()?;
                info!("Using SQLite store at {:?}", path);
                let store = SqliteStore::connect(&path)
                    .await
                    .with_context(|| format!("Failed to open SQLite store: {:?}", path))?;
                Ok(Arc::new(store))
            }
            Backend::Rest => {
                let base_url = self
                    .store
                    .api_base_url
                    .as_deref()
                    .context("store.api_base_url must be set for the rest backend")?;
                let token = std::env::var(&self.store.api_token_env).with_context(|| {
                    format!("Environment variable {} is not set", self.store.api_token_env)
                })?;
                info!("Using REST store at {}", base_url);
                let store = RestStore::with_retry_policy(base_url, token, self.retry.to_retry_config())
                    .context("Failed to create REST client")?;
                Ok(Arc::new(store))
            }
        }
    }

    pub async fn build_service(&self) -> Result<InsightsService> {
        let backend = self.open_backend().await?;
        Ok(InsightsService::with_options(backend, self.service_options()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [store]
            backend = "memory"

            [limits]
            max_batch_writes = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, Backend::Memory);
        assert_eq!(config.store.api_token_env, "INSIGHTS_API_TOKEN");
        assert_eq!(config.limits.max_batch_writes, 50);
        assert_eq!(config.limits.call_timeout_secs, 10);
        assert_eq!(config.limits.counter_max_attempts, 5);
        assert_eq!(config.retry, RetrySettings::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.store.backend = Backend::Rest;
        config.store.api_base_url = Some("https://api.example.com".to_string());
        config.retry.jitter = false;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_service_options_follow_limits() {
        let mut config = Config::default();
        config.limits.call_timeout_secs = 3;
        config.retry.base_delay_ms = 50;

        let options = config.service_options();
        assert_eq!(options.call_timeout, Duration::from_secs(3));
        assert_eq!(options.max_batch_writes, 500);
        assert_eq!(options.backoff.base_delay, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_rest_backend_requires_url_and_token() {
        let mut config = Config::default();
        config.store.backend = Backend::Rest;
        assert!(config.open_backend().await.is_err());

        config.store.api_base_url = Some("https://api.example.com".to_string());
        config.store.api_token_env = "INSIGHTS_ADMIN_TEST_TOKEN_UNSET".to_string();
        let err = config.open_backend().await.err().unwrap();
        assert!(err.to_string().contains("INSIGHTS_ADMIN_TEST_TOKEN_UNSET"));
    }

    #[tokio::test]
    async fn test_sqlite_backend_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.sqlite_path = Some(dir.path().join("data.db"));

        let service = config.build_service().await.unwrap();
        assert!(service.list_clients(None).await.unwrap().is_empty());
        assert!(dir.path().join("data.db").exists());
    }
}
