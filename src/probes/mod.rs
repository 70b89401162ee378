//! Network probes: result types, the `SpeedProbe` capability, and the
//! runner that executes probes and keeps their recent history.

pub mod history;
pub mod runner;
pub mod speedtest;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use self::history::ResultHistory;
pub use self::runner::ProbeRunner;
pub use self::speedtest::SpeedTestClient;

/// Outcome of a single latency probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyResult {
    pub target: String,
    pub observed_at: DateTime<Utc>,
    #[serde(rename = "latency_ms", serialize_with = "as_millis")]
    pub latency: Duration,
}

/// Outcome of a single throughput probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputResult {
    pub target: String,
    pub observed_at: DateTime<Utc>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    #[serde(rename = "latency_ms", serialize_with = "as_millis")]
    pub latency: Duration,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("no suitable speed test servers found")]
    NoServers,

    #[error("probe cancelled")]
    Cancelled,

    #[error("download test failed: {0}")]
    Download(String),

    #[error("upload test failed: {0}")]
    Upload(String),

    #[error("{}", join_errors(.0))]
    Aggregate(Vec<ProbeError>),
}

fn join_errors(errs: &[ProbeError]) -> String {
    errs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProbeError {
    /// Fold a list of failures into one error, keeping every cause.
    ///
    /// Returns `None` for an empty list and the error itself for a single one.
    pub fn aggregate(mut errs: Vec<ProbeError>) -> Option<ProbeError> {
        match errs.len() {
            0 => None,
            1 => errs.pop(),
            _ => Some(ProbeError::Aggregate(errs)),
        }
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        ProbeError::Network(e.to_string())
    }
}

/// A network measurement capability (speed test backend).
///
/// Both calls are slow and fallible; implementations should abort early when
/// `cancel` fires but are not required to.
#[async_trait::async_trait]
pub trait SpeedProbe: Send + Sync {
    /// Measure round-trip latency to the selected target.
    async fn ping(&self, cancel: &CancellationToken) -> Result<LatencyResult, ProbeError>;

    /// Measure download and upload throughput against the selected target.
    async fn speedtest(&self, cancel: &CancellationToken)
        -> Result<ThroughputResult, ProbeError>;
}
