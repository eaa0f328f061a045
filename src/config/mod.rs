//! Application configuration.
//!
//! One `Config` struct covering the cluster connection, the catalogue
//! location and executor tuning, loaded from YAML files and environment
//! variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cluster::HttpClusterConfig;
use crate::migration::executor::{
    ExecutorConfig, DEFAULT_BULK_BATCH_SIZE, DEFAULT_SCROLL_KEEP_ALIVE, DEFAULT_SCROLL_PAGE_SIZE,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "INDEX_UPGRADER_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "INDEX_UPGRADER";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "INDEX_UPGRADER_LOG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Search cluster connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Base URL of the cluster's REST endpoint.
    pub url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Ping attempts before giving up at startup.
    pub connect_retries: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            timeout_secs: 30,
            connect_retries: 30,
        }
    }
}

/// Location of the index catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogueConfig {
    /// Directory laid out as `<alias>/<version>/settings.json` plus
    /// `<alias>/<version>/mappings/<type>.json`.
    pub root: PathBuf,
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("migrations"),
        }
    }
}

/// Executor tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub scroll_page_size: usize,
    pub scroll_keep_alive_secs: u64,
    pub bulk_batch_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            scroll_page_size: DEFAULT_SCROLL_PAGE_SIZE,
            scroll_keep_alive_secs: DEFAULT_SCROLL_KEEP_ALIVE.as_secs(),
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub catalogue: CatalogueConfig,
    pub migration: MigrationConfig,
    /// Log the pending migrations without running them.
    pub dry_run: bool,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, e.g.
    ///    `INDEX_UPGRADER__CLUSTER__URL`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the executor cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.url.trim().is_empty() {
            return Err(ConfigError::Invalid("cluster.url is empty".to_string()));
        }
        if self.migration.scroll_page_size == 0 {
            return Err(ConfigError::Invalid(
                "migration.scroll_page_size must be positive".to_string(),
            ));
        }
        if self.migration.bulk_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "migration.bulk_batch_size must be positive".to_string(),
            ));
        }
        if self.migration.scroll_keep_alive_secs == 0 {
            return Err(ConfigError::Invalid(
                "migration.scroll_keep_alive_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            scroll_page_size: self.migration.scroll_page_size,
            scroll_keep_alive: Duration::from_secs(self.migration.scroll_keep_alive_secs),
            bulk_batch_size: self.migration.bulk_batch_size,
        }
    }

    pub fn http_config(&self) -> HttpClusterConfig {
        HttpClusterConfig::default()
            .with_url(self.cluster.url.clone())
            .with_timeout(Duration::from_secs(self.cluster.timeout_secs))
    }
}
