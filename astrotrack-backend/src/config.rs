use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::module::ephemeris::{
    AuxiliaryBody, GateSettings, HORIZONS_API_URL, Pacing, Registry, RetryPolicy,
};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "ASTROTRACK_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub horizons: HorizonsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Extra bodies appended after the major bodies
    #[serde(default)]
    pub auxiliary: Vec<AuxiliaryBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonsConfig {
    #[serde(default = "default_horizons_url")]
    pub url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingMode {
    Sequential,
    Bounded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_pacing_mode")]
    pub mode: PacingMode,

    /// Only used in bounded mode
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_min_gap_ms")]
    pub min_gap_ms: u64,

    #[serde(default = "default_max_gap_ms")]
    pub max_gap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_include_auxiliary")]
    pub include_auxiliary: bool,

    /// Background refresh interval; 0 disables warming
    #[serde(default)]
    pub warm_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_horizons_url() -> String {
    HORIZONS_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_jitter_ms() -> u64 {
    250
}

fn default_pacing_mode() -> PacingMode {
    PacingMode::Sequential
}

fn default_workers() -> usize {
    2
}

fn default_min_gap_ms() -> u64 {
    150
}

fn default_max_gap_ms() -> u64 {
    450
}

fn default_ttl_secs() -> u64 {
    crate::module::ephemeris::DEFAULT_TTL_SECONDS
}

fn default_include_auxiliary() -> bool {
    true
}

impl Default for HorizonsConfig {
    fn default() -> Self {
        Self {
            url: default_horizons_url(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            mode: default_pacing_mode(),
            workers: default_workers(),
            min_gap_ms: default_min_gap_ms(),
            max_gap_ms: default_max_gap_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            include_auxiliary: default_include_auxiliary(),
            warm_interval_secs: 0,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            horizons: HorizonsConfig::default(),
            retry: RetryConfig::default(),
            pacing: PacingConfig::default(),
            cache: CacheConfig::default(),
            auxiliary: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("retry.max_attempts must be at least 1")]
    NoAttempts,

    #[error("pacing.workers must be at least 1")]
    NoWorkers,

    #[error("pacing.min_gap_ms ({min}) exceeds pacing.max_gap_ms ({max})")]
    GapRange { min: u64, max: u64 },

    #[error("invalid auxiliary body list: {0}")]
    Registry(#[from] crate::module::ephemeris::RegistryError),
}

impl BackendConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: BackendConfig = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    /// Defaults when `path` does not exist. The flag tells whether a file was read.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<(Self, bool)> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok((Self::default(), false));
        }
        Ok((Self::from_file(path)?, true))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.pacing.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.pacing.min_gap_ms > self.pacing.max_gap_ms {
            return Err(ConfigError::GapRange {
                min: self.pacing.min_gap_ms,
                max: self.pacing.max_gap_ms,
            });
        }
        Registry::with_auxiliary(&self.auxiliary)?;
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.horizons.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_jitter: Duration::from_millis(self.retry.max_jitter_ms),
            attempt_timeout: self.request_timeout(),
        }
    }

    pub fn pacing(&self) -> Pacing {
        let min_gap = Duration::from_millis(self.pacing.min_gap_ms);
        let max_gap = Duration::from_millis(self.pacing.max_gap_ms);
        match self.pacing.mode {
            PacingMode::Sequential => Pacing::Sequential { min_gap, max_gap },
            PacingMode::Bounded => Pacing::Bounded {
                workers: self.pacing.workers,
                min_gap,
                max_gap,
            },
        }
    }

    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            include_auxiliary: self.cache.include_auxiliary,
        }
    }

    pub fn registry(&self) -> Result<Registry, ConfigError> {
        Ok(Registry::with_auxiliary(&self.auxiliary)?)
    }

    pub fn warm_interval(&self) -> Option<Duration> {
        (self.cache.warm_interval_secs > 0).then(|| Duration::from_secs(self.cache.warm_interval_secs))
    }
}

pub static CONFIG: OnceLock<BackendConfig> = OnceLock::new();

/// Load the process-wide configuration from `$ASTROTRACK_CONFIG` or `config.toml`.
///
/// Returns whether a file was found; a missing file yields defaults.
pub fn read_config() -> anyhow::Result<bool> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let (config, found) = BackendConfig::load_or_default(&path)?;

    CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Configuration already loaded"))?;

    Ok(found)
}
