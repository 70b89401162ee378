//! TOML configuration for linkwatch.
//!
//! Every section has compiled-in defaults, so an empty file (or no file at
//! all) yields a working monitor with the no-op metrics sink. The config file
//! path can come from the CLI, the `LINKWATCH_CONFIG` environment variable, or
//! the standard system location.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "LINKWATCH_CONFIG";

/// Standard system location for the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/linkwatch/linkwatch.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the monitor process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub probe: ProbeConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub debug_server: DebugServerConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the configuration source, in order:
    /// 1. `explicit` (the `--config` flag),
    /// 2. the path in `LINKWATCH_CONFIG`,
    /// 3. `/etc/linkwatch/linkwatch.toml` if present,
    /// 4. compiled-in defaults.
    ///
    /// A file that exists but fails to load is an error, not a fallback.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&env_path));
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            return Self::load(system_path);
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor.validate()?;
        self.probe.validate()?;
        self.metrics.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Cadence of the latency and throughput checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Minimum spacing between latency probes.
    pub ping_interval_secs: u64,
    /// Latency above this triggers an early throughput probe.
    pub ping_threshold_secs: f64,
    /// Spacing of scheduled throughput probes.
    pub network_interval_minutes: u64,
    /// Results kept per probe kind for the dashboard.
    pub history_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 15,
            ping_threshold_secs: 5.0,
            network_interval_minutes: 1,
            history_capacity: crate::probes::history::DEFAULT_CAPACITY,
        }
    }
}

/// Longest accepted latency probe spacing (one day).
pub const MAX_PING_INTERVAL_SECS: u64 = 86_400;
/// Largest accepted trigger threshold (one hour).
pub const MAX_PING_THRESHOLD_SECS: f64 = 3_600.0;
/// Longest accepted throughput probe spacing (one week).
pub const MAX_NETWORK_INTERVAL_MINUTES: u64 = 10_080;

impl MonitorConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.min(MAX_PING_INTERVAL_SECS))
    }

    pub fn ping_threshold(&self) -> Duration {
        Duration::try_from_secs_f64(self.ping_threshold_secs.min(MAX_PING_THRESHOLD_SECS))
            .unwrap_or(Duration::ZERO)
    }

    pub fn network_interval(&self) -> Duration {
        Duration::from_secs(
            self.network_interval_minutes
                .min(MAX_NETWORK_INTERVAL_MINUTES)
                * 60,
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PING_INTERVAL_SECS).contains(&self.ping_interval_secs) {
            return Err(invalid(format!(
                "monitor.ping_interval_secs must be between 1 and {MAX_PING_INTERVAL_SECS}"
            )));
        }
        if !(self.ping_threshold_secs > 0.0 && self.ping_threshold_secs <= MAX_PING_THRESHOLD_SECS)
        {
            return Err(invalid(format!(
                "monitor.ping_threshold_secs must be > 0 and at most {MAX_PING_THRESHOLD_SECS}"
            )));
        }
        if !(1..=MAX_NETWORK_INTERVAL_MINUTES).contains(&self.network_interval_minutes) {
            return Err(invalid(format!(
                "monitor.network_interval_minutes must be between 1 and {MAX_NETWORK_INTERVAL_MINUTES}"
            )));
        }
        if self.history_capacity == 0 {
            return Err(invalid("monitor.history_capacity must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Largest download or upload size per throughput probe (1 GB).
pub const MAX_TRANSFER_BYTES: u64 = 1_000_000_000;

/// A speed test endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedServer {
    pub name: String,
    pub url: String,
}

/// Settings for the bundled HTTP speed probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Deadline for each latency request.
    pub ping_timeout_secs: u64,
    /// Latency requests per ping; the minimum is reported.
    pub ping_samples: u32,
    pub download_bytes: u64,
    pub upload_bytes: u64,
    /// Deadline for each download/upload transfer.
    pub transfer_timeout_secs: u64,
    /// Candidate servers, tried in order.
    pub servers: Vec<SpeedServer>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ping_timeout_secs: 10,
            ping_samples: 3,
            download_bytes: 25_000_000,
            upload_bytes: 10_000_000,
            transfer_timeout_secs: 60,
            servers: vec![SpeedServer {
                name: "cloudflare".to_string(),
                url: "https://speed.cloudflare.com".to_string(),
            }],
        }
    }
}

impl ProbeConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(invalid("probe.servers must list at least one server"));
        }
        if let Some(s) = self
            .servers
            .iter()
            .find(|s| !(s.url.starts_with("http://") || s.url.starts_with("https://")))
        {
            return Err(invalid(format!(
                "probe server '{}' has a non-HTTP url: {}",
                s.name, s.url
            )));
        }
        if self.ping_samples == 0 {
            return Err(invalid("probe.ping_samples must be > 0"));
        }
        if self.download_bytes > MAX_TRANSFER_BYTES || self.upload_bytes > MAX_TRANSFER_BYTES {
            return Err(invalid(format!(
                "probe transfer sizes must be at most {MAX_TRANSFER_BYTES} bytes"
            )));
        }
        if self.ping_timeout_secs == 0 || self.transfer_timeout_secs == 0 {
            return Err(invalid("probe timeouts must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Metrics backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// `"no-op"` or `"prometheus"`.
    pub engine: String,
    pub prometheus: PrometheusConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            engine: "no-op".to_string(),
            prometheus: PrometheusConfig::default(),
        }
    }
}

impl MetricsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.engine.as_str() {
            "no-op" => Ok(()),
            "prometheus" => {
                if self.prometheus.push_gateway_url.trim().is_empty() {
                    return Err(invalid(
                        "metrics.prometheus.push_gateway_url is required for the prometheus engine",
                    ));
                }
                Ok(())
            }
            other => Err(invalid(format!(
                "metrics.engine must be 'prometheus' or 'no-op', got '{other}'"
            ))),
        }
    }
}

/// Prometheus push gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub push_gateway_url: String,
    pub job: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            push_gateway_url: String::new(),
            job: "linkwatch".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`, `"error"`).
    pub level: String,
    /// Output format: `"json"` or `"text"`.
    pub format: String,
    /// `"stdout"`, `"stderr"`, or a file path (appended).
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            output: "stdout".to_string(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(
            self.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(invalid(format!("logging.level '{}' is not a level", self.level)));
        }
        if !matches!(self.format.as_str(), "json" | "text") {
            return Err(invalid(format!(
                "logging.format must be 'json' or 'text', got '{}'",
                self.format
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Debug server
// ---------------------------------------------------------------------------

/// Debug HTTP dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugServerConfig {
    pub enabled: bool,
    pub listen_address: String,
}

impl Default for DebugServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: "0.0.0.0:8090".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
