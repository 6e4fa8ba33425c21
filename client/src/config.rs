use log::{debug, LevelFilter};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use thiserror::Error;
use url::Url;

use crate::retry::{Backoff, RetryPolicy};

/// Default values for configuration
pub mod defaults {
    use super::LogLevel;
    use tasklane_common::config::{
        DEFAULT_CAPACITY_INCREMENT, DEFAULT_CRANK_REWARD, DEFAULT_CRON_FUNDING,
    };

    pub const BASE_RPC_URL: &str = "http://127.0.0.1:8899";
    pub const ROLLUP_RPC_URL: &str = "http://127.0.0.1:7799";
    pub const COMMITMENT: &str = "confirmed";

    // RPC client
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;
    pub const MAX_RPC_RETRIES: u32 = 3;
    pub const RPC_RETRY_DELAY_MS: u64 = 1000;
    // Polls of the signature status before a submission is reported unconfirmed
    pub const CONFIRM_ATTEMPTS: u32 = 30;
    pub const CONFIRM_INTERVAL_MS: u64 = 500;

    // Contention retries of scheduling operations
    pub const SCHEDULE_ATTEMPTS: u32 = 5;
    pub const SCHEDULE_INITIAL_DELAY_MS: u64 = 200;
    pub const SCHEDULE_MAX_DELAY_MS: u64 = 5_000;

    // Completion watcher
    pub const POLL_INTERVAL_MS: u64 = 5_000;
    pub const MAX_POLL_ATTEMPTS: u32 = 30;

    pub const CAPACITY_INCREMENT: u16 = DEFAULT_CAPACITY_INCREMENT;
    pub const CRANK_REWARD: u64 = DEFAULT_CRANK_REWARD;
    pub const CRON_FUNDING: u64 = DEFAULT_CRON_FUNDING;

    // Logging
    pub const LOG_LEVEL: LogLevel = LogLevel::Info;
    pub const FILENAME_LOG: &str = "tasklane.log";
    pub const LOGS_PATH: &str = "logs/";
    pub const DATETIME_FORMAT: &str = "[%Y-%m-%d] (%H:%M:%S%.3f)";

    // Validation limits
    pub const MIN_TIMEOUT_SECS: u64 = 1;
    pub const MAX_TIMEOUT_SECS: u64 = 300;
    pub const MAX_RETRIES_LIMIT: u32 = 10;
    pub const MIN_POLL_INTERVAL_MS: u64 = 10;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid {field}: '{value}' must be a valid HTTP/HTTPS URL")]
    InvalidUrl { field: &'static str, value: String },
    #[error("Invalid {field}: {value} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("Invalid commitment level '{0}', expected processed, confirmed or finalized")]
    InvalidCommitment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

// Level override for one module path, like `tasklane_client::simulator`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleLevel {
    pub module: String,
    pub level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default)]
    pub disable_file_logging: bool,
    #[serde(default)]
    pub disable_log_color: bool,
    #[serde(default = "default_filename_log")]
    pub filename_log: String,
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,
    #[serde(default)]
    pub modules: Vec<ModuleLevel>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            disable_file_logging: false,
            disable_log_color: false,
            filename_log: default_filename_log(),
            logs_path: default_logs_path(),
            datetime_format: default_datetime_format(),
            modules: Vec::new(),
        }
    }
}

// Polling policy of the completion watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_attempts: u32,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_poll_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base ledger JSON-RPC endpoint
    #[serde(default = "default_base_rpc_url")]
    pub base_rpc_url: String,
    /// Rollup JSON-RPC endpoint
    #[serde(default = "default_rollup_rpc_url")]
    pub rollup_rpc_url: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_max_rpc_retries")]
    pub max_rpc_retries: u32,
    #[serde(default = "default_rpc_retry_delay_ms")]
    pub rpc_retry_delay_ms: u64,
    #[serde(default = "default_confirm_attempts")]
    pub confirm_attempts: u32,
    #[serde(default = "default_confirm_interval_ms")]
    pub confirm_interval_ms: u64,

    /// Contention retries of scheduling operations
    #[serde(default = "default_retry_policy")]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default = "default_capacity_increment")]
    pub capacity_increment: u16,
    #[serde(default = "default_crank_reward")]
    pub crank_reward: u64,
    #[serde(default = "default_cron_funding")]
    pub cron_funding: u64,

    #[serde(default)]
    pub log: LogConfig,
}

// Default functions for serde
fn default_base_rpc_url() -> String {
    defaults::BASE_RPC_URL.to_string()
}
fn default_rollup_rpc_url() -> String {
    defaults::ROLLUP_RPC_URL.to_string()
}
fn default_commitment() -> String {
    defaults::COMMITMENT.to_string()
}
fn default_request_timeout_secs() -> u64 {
    defaults::REQUEST_TIMEOUT_SECS
}
fn default_connection_timeout_secs() -> u64 {
    defaults::CONNECTION_TIMEOUT_SECS
}
fn default_max_rpc_retries() -> u32 {
    defaults::MAX_RPC_RETRIES
}
fn default_rpc_retry_delay_ms() -> u64 {
    defaults::RPC_RETRY_DELAY_MS
}
fn default_confirm_attempts() -> u32 {
    defaults::CONFIRM_ATTEMPTS
}
fn default_confirm_interval_ms() -> u64 {
    defaults::CONFIRM_INTERVAL_MS
}
fn default_retry_policy() -> RetryPolicy {
    RetryPolicy::new(
        defaults::SCHEDULE_ATTEMPTS,
        Backoff::Exponential {
            initial_ms: defaults::SCHEDULE_INITIAL_DELAY_MS,
            max_ms: defaults::SCHEDULE_MAX_DELAY_MS,
        },
    )
}
fn default_poll_interval_ms() -> u64 {
    defaults::POLL_INTERVAL_MS
}
fn default_max_poll_attempts() -> u32 {
    defaults::MAX_POLL_ATTEMPTS
}
fn default_capacity_increment() -> u16 {
    defaults::CAPACITY_INCREMENT
}
fn default_crank_reward() -> u64 {
    defaults::CRANK_REWARD
}
fn default_cron_funding() -> u64 {
    defaults::CRON_FUNDING
}
fn default_log_level() -> LogLevel {
    defaults::LOG_LEVEL
}
fn default_filename_log() -> String {
    defaults::FILENAME_LOG.to_string()
}
fn default_logs_path() -> String {
    defaults::LOGS_PATH.to_string()
}
fn default_datetime_format() -> String {
    defaults::DATETIME_FORMAT.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_rpc_url: default_base_rpc_url(),
            rollup_rpc_url: default_rollup_rpc_url(),
            commitment: default_commitment(),
            request_timeout_secs: default_request_timeout_secs(),
            connection_timeout_secs: default_connection_timeout_secs(),
            max_rpc_retries: default_max_rpc_retries(),
            rpc_retry_delay_ms: default_rpc_retry_delay_ms(),
            confirm_attempts: default_confirm_attempts(),
            confirm_interval_ms: default_confirm_interval_ms(),
            retry: default_retry_policy(),
            watch: WatchConfig::default(),
            capacity_increment: default_capacity_increment(),
            crank_reward: default_crank_reward(),
            cron_funding: default_cron_funding(),
            log: LogConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load a JSON configuration file, missing fields take their default value.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        debug!("Loading configuration from {}", display);

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("base_rpc_url", &self.base_rpc_url)?;
        validate_url("rollup_rpc_url", &self.rollup_rpc_url)?;

        if !matches!(self.commitment.as_str(), "processed" | "confirmed" | "finalized") {
            return Err(ConfigError::InvalidCommitment(self.commitment.clone()));
        }

        in_range(
            "request_timeout_secs",
            self.request_timeout_secs,
            defaults::MIN_TIMEOUT_SECS,
            defaults::MAX_TIMEOUT_SECS,
        )?;
        in_range(
            "connection_timeout_secs",
            self.connection_timeout_secs,
            defaults::MIN_TIMEOUT_SECS,
            defaults::MAX_TIMEOUT_SECS,
        )?;
        in_range(
            "max_rpc_retries",
            self.max_rpc_retries as u64,
            0,
            defaults::MAX_RETRIES_LIMIT as u64,
        )?;
        in_range(
            "retry.max_attempts",
            self.retry.max_attempts as u64,
            1,
            defaults::MAX_RETRIES_LIMIT as u64,
        )?;
        in_range("confirm_attempts", self.confirm_attempts as u64, 1, u32::MAX as u64)?;
        in_range(
            "watch.poll_interval_ms",
            self.watch.poll_interval_ms,
            defaults::MIN_POLL_INTERVAL_MS,
            u64::MAX,
        )?;
        in_range("watch.max_attempts", self.watch.max_attempts as u64, 1, u32::MAX as u64)?;
        in_range(
            "capacity_increment",
            self.capacity_increment as u64,
            1,
            u16::MAX as u64,
        )?;

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}

fn in_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

// Command line overrides for binaries embedding the client
#[cfg(feature = "cli")]
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigArgs {
    /// Configuration file to load before applying the overrides
    #[clap(long)]
    pub config_file: Option<String>,
    /// Base ledger JSON-RPC endpoint
    #[clap(long)]
    pub base_rpc_url: Option<String>,
    /// Rollup JSON-RPC endpoint
    #[clap(long)]
    pub rollup_rpc_url: Option<String>,
    /// Set log level
    #[clap(long, value_enum)]
    pub log_level: Option<LogLevel>,
    /// Disable the log file
    #[clap(long)]
    pub disable_file_logging: bool,
    /// Disable colors in the console output
    #[clap(long)]
    pub disable_log_color: bool,
}

#[cfg(feature = "cli")]
impl ConfigArgs {
    pub fn into_config(self) -> Result<ClientConfig, ConfigError> {
        let mut config = match &self.config_file {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };

        if let Some(url) = self.base_rpc_url {
            config.base_rpc_url = url;
        }
        if let Some(url) = self.rollup_rpc_url {
            config.rollup_rpc_url = url;
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        config.log.disable_file_logging |= self.disable_file_logging;
        config.log.disable_log_color |= self.disable_log_color;

        config.validate()?;
        Ok(config)
    }
}
