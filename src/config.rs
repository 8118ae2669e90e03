//! Application Configuration
//!
//! Settings come from command-line flags (each also readable from a
//! `DURABILITY_*` environment variable), then an optional YAML file, then
//! built-in defaults, in that order of precedence.

use clap::Parser;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::config::{BackendConfig, BackendKind};
use crate::backend::{object_path, EncryptionKey};
use crate::error::ConfigError;
use crate::service::check_engine::{CheckMode, MAX_CHECK_INTERVAL};

pub const DEFAULT_ENCRYPTION_KEY: &str = "you'll never guess this";
pub const DEFAULT_BUCKET: &str = "file-durability";
pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_LISTEN: &str = ":8080";
pub const DEFAULT_BASE_PATH: &str = "./data/objects";
pub const DEFAULT_LOG_CONFIG: &str = "monitor_log.yaml";

/// Command-line flags
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "durability-monitor", version, about = "Periodically verifies an uploaded object is still intact")]
pub struct Cli {
    /// Satellite address
    #[arg(long, env = "DURABILITY_ADDR")]
    pub addr: Option<String>,

    /// API key
    #[arg(long, env = "DURABILITY_APIKEY", hide_env_values = true)]
    pub apikey: Option<String>,

    /// Encryption key
    #[arg(long, env = "DURABILITY_ENCKEY", hide_env_values = true)]
    pub enckey: Option<String>,

    /// Bucket
    #[arg(long, env = "DURABILITY_BUCKET")]
    pub bucket: Option<String>,

    /// Path for the file in the bucket
    #[arg(long, env = "DURABILITY_PATH")]
    pub path: Option<String>,

    /// File to use for durability test
    #[arg(long, env = "DURABILITY_FILE")]
    pub file: Option<PathBuf>,

    /// Time in seconds between durability checks
    #[arg(long, env = "DURABILITY_INTERVAL")]
    pub interval: Option<u64>,

    /// Webserver listen address
    #[arg(long, env = "DURABILITY_LISTEN")]
    pub listen: Option<String>,

    /// Object backend: http, local or mock
    #[arg(long, env = "DURABILITY_BACKEND")]
    pub backend: Option<BackendKind>,

    /// Root directory for the local backend
    #[arg(long, env = "DURABILITY_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// single-flight or overlapping
    #[arg(long, env = "DURABILITY_CHECK_MODE")]
    pub check_mode: Option<CheckMode>,

    /// YAML file supplying any of the settings above
    #[arg(long, env = "DURABILITY_CONFIG")]
    pub config: Option<PathBuf>,

    /// log4rs configuration file
    #[arg(long, env = "DURABILITY_LOG_CONFIG", default_value = DEFAULT_LOG_CONFIG)]
    pub log_config: PathBuf,
}

/// Settings read from the YAML config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub addr: Option<String>,
    pub apikey: Option<String>,
    pub enckey: Option<String>,
    pub bucket: Option<String>,
    pub path: Option<String>,
    pub file: Option<PathBuf>,
    pub interval: Option<u64>,
    pub listen: Option<String>,
    pub backend: Option<BackendKind>,
    pub base_path: Option<PathBuf>,
    pub check_mode: Option<CheckMode>,
}

impl FileConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// Validated settings for one monitor run
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub backend: BackendConfig,
    /// Optional prefix for the object inside the bucket
    pub object_prefix: Option<String>,
    pub reference_file: PathBuf,
    pub check_interval: Duration,
    pub check_mode: CheckMode,
    pub listen: String,
}

impl RuntimeConfig {
    /// Merge flags with the config file they point to, if any
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Merge flags over file settings over defaults, then validate
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let addr = required(cli.addr.or(file.addr), "addr")?;
        let api_key = required(cli.apikey.or(file.apikey), "apikey")?;
        let reference_file = cli
            .file
            .or(file.file)
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::MissingFlag("file"))?;

        let interval = cli.interval.or(file.interval).unwrap_or(DEFAULT_INTERVAL_SECS);
        if interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if interval > MAX_CHECK_INTERVAL.as_secs() {
            return Err(ConfigError::IntervalTooLong { secs: interval, max: MAX_CHECK_INTERVAL.as_secs() });
        }

        let bucket = cli.bucket.or(file.bucket).unwrap_or_else(|| DEFAULT_BUCKET.to_string());
        if bucket.is_empty() {
            return Err(ConfigError::Invalid("bucket name must not be empty".to_string()));
        }
        let enckey = cli.enckey.or(file.enckey).unwrap_or_else(|| DEFAULT_ENCRYPTION_KEY.to_string());

        Ok(Self {
            backend: BackendConfig {
                kind: cli.backend.or(file.backend).unwrap_or_default(),
                satellite_addr: addr,
                api_key,
                encryption_key: EncryptionKey::from_passphrase(&enckey),
                bucket,
                base_path: cli
                    .base_path
                    .or(file.base_path)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_PATH)),
            },
            object_prefix: cli.path.or(file.path).filter(|p| !p.is_empty()),
            reference_file,
            check_interval: Duration::from_secs(interval),
            check_mode: cli.check_mode.or(file.check_mode).unwrap_or_default(),
            listen: cli.listen.or(file.listen).unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
        })
    }

    /// Path of the monitored object inside the bucket
    pub fn object_path(&self) -> String {
        object_path(self.object_prefix.as_deref(), &self.reference_file.to_string_lossy())
    }

    /// Socket address to bind; a bare `:port` listens on all interfaces
    pub fn bind_addr(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        }
    }
}

fn required(value: Option<String>, flag: &'static str) -> Result<String, ConfigError> {
    value.filter(|v| !v.is_empty()).ok_or(ConfigError::MissingFlag(flag))
}
