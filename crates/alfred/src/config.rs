//! Configuration file parsing and structures.
//!
//! alfred reads a single TOML file. Every section and field is optional; an
//! empty file is equivalent to the defaults below.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use crate::device::light::PhilipsSettings;
use crate::device::outlet::KasaSettings;
use crate::net::HostRange;
use crate::net::SweepConfig;

/// Path tried when no `--config` is given
pub const DEFAULT_PATH: &str = "alfred.toml";

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub discovery: DiscoveryConfig,
    pub kasa: KasaConfig,
    pub philips: PhilipsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"alfred::net" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    pub fn filter(&self) -> Targets {
        Targets::new()
            .with_default(LevelFilter::from(self.level))
            .with_targets(
                self.overrides
                    .iter()
                    .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
            )
    }
}

/// HTTP API listener
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Network sweep parameters
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Base prefix, e.g. "192.168.101"
    pub subnet: String,
    pub start: u8,
    pub end: u8,
    pub ports: Vec<u16>,
    pub workers: usize,
    pub probe_timeout_ms: u64,
    pub sweep_deadline_ms: u64,
    pub attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            subnet: "192.168.101".to_string(),
            start: 1,
            end: 254,
            ports: vec![9999, 20002],
            workers: 10,
            probe_timeout_ms: 1000,
            sweep_deadline_ms: 10_000,
            attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl DiscoveryConfig {
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            range: HostRange::new(&self.subnet, self.start, self.end),
            ports: self.ports.clone(),
            workers: self.workers,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            deadline: Duration::from_millis(self.sweep_deadline_ms),
            attempts: self.attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Kasa control tool
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KasaConfig {
    pub program: String,
    pub command_timeout_secs: u64,

    /// Hard wall-clock limit for one invocation of the tool
    pub process_timeout_secs: u64,
    pub attempts: u32,
    pub retry_unit_ms: u64,
    pub discovery_timeout_secs: u64,
    pub cli_workers: usize,
}

impl Default for KasaConfig {
    fn default() -> Self {
        Self {
            program: "kasa".to_string(),
            command_timeout_secs: 10,
            process_timeout_secs: 15,
            attempts: 3,
            retry_unit_ms: 1000,
            discovery_timeout_secs: 2,
            cli_workers: 100,
        }
    }
}

impl KasaConfig {
    pub fn settings(&self) -> KasaSettings {
        KasaSettings {
            program: self.program.clone(),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            attempts: self.attempts,
            retry_unit: Duration::from_millis(self.retry_unit_ms),
            discovery_timeout: Duration::from_secs(self.discovery_timeout_secs),
            cli_workers: self.cli_workers,
            cli_probe_timeout: Duration::from_secs(self.process_timeout_secs),
        }
    }
}

/// Philips Hue bridge
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PhilipsConfig {
    pub request_timeout_ms: u64,
    pub bridge: Option<String>,
}

impl Default for PhilipsConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5000,
            bridge: None,
        }
    }
}

impl PhilipsConfig {
    pub fn settings(&self) -> PhilipsSettings {
        PhilipsSettings {
            bridge: self.bridge.clone(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or from [`DEFAULT_PATH`] if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_PATH).exists() => Self::from_file(DEFAULT_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let discovery = &self.discovery;
        if discovery.start == 0 {
            return Err(ConfigError::invalid("discovery.start", "must be at least 1"));
        }
        if discovery.start > discovery.end {
            return Err(ConfigError::invalid(
                "discovery.start",
                format!("{} is after end {}", discovery.start, discovery.end),
            ));
        }
        if discovery.ports.is_empty() {
            return Err(ConfigError::invalid("discovery.ports", "must not be empty"));
        }
        if discovery.workers < 1 {
            return Err(ConfigError::invalid("discovery.workers", "must be at least 1"));
        }
        if discovery.attempts < 1 {
            return Err(ConfigError::invalid("discovery.attempts", "must be at least 1"));
        }
        if !is_subnet_prefix(&discovery.subnet) {
            return Err(ConfigError::invalid(
                "discovery.subnet",
                format!("{:?} is not three dotted octets", discovery.subnet),
            ));
        }
        if self.kasa.attempts < 1 {
            return Err(ConfigError::invalid("kasa.attempts", "must be at least 1"));
        }
        if self.kasa.cli_workers < 1 {
            return Err(ConfigError::invalid("kasa.cli_workers", "must be at least 1"));
        }
        Ok(())
    }
}

fn is_subnet_prefix(subnet: &str) -> bool {
    let octets: Vec<&str> = subnet.trim_end_matches('.').split('.').collect();
    octets.len() == 3 && octets.iter().all(|octet| octet.parse::<u8>().is_ok())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
