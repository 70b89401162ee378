//! Read model and control surface over a running [`Scheduler`], for the
//! debug dashboard or any other host UI.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::probes::{LatencyResult, ThroughputResult};
use crate::scheduler::{RateState, Scheduler};

/// Snapshot of limiter state and recent results.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub ping_limiter_status: String,
    pub network_limiter_status: String,
    pub ping_limiter: RateState,
    pub network_limiter: RateState,
    pub history_capacity: usize,
    pub recent_latency: Vec<LatencyResult>,
    pub recent_throughput: Vec<ThroughputResult>,
}

/// Runtime control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    PausePing,
    ResumePing,
    PauseNetwork,
    ResumeNetwork,
}

impl ControlCommand {
    pub const ALL: [ControlCommand; 4] = [
        ControlCommand::PausePing,
        ControlCommand::ResumePing,
        ControlCommand::PauseNetwork,
        ControlCommand::ResumeNetwork,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlCommand::PausePing => "pause-ping",
            ControlCommand::ResumePing => "resume-ping",
            ControlCommand::PauseNetwork => "pause-network",
            ControlCommand::ResumeNetwork => "resume-network",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
}

impl FromStr for ControlCommand {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CommandError::Unknown(s.to_string()))
    }
}

/// Projection of scheduler state plus routing of control commands.
#[derive(Clone)]
pub struct IntrospectionView {
    scheduler: Arc<Scheduler>,
}

impl IntrospectionView {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let runner = self.scheduler.runner();
        let (recent_latency, recent_throughput) = runner.snapshot();
        MonitorSnapshot {
            ping_limiter_status: self.scheduler.ping_limiter().status(),
            network_limiter_status: self.scheduler.network_limiter().status(),
            ping_limiter: self.scheduler.ping_limiter().state(),
            network_limiter: self.scheduler.network_limiter().state(),
            history_capacity: runner.capacity(),
            recent_latency,
            recent_throughput,
        }
    }

    pub fn apply(&self, command: ControlCommand) {
        match command {
            ControlCommand::PausePing => self.scheduler.pause_ping(),
            ControlCommand::ResumePing => self.scheduler.resume_ping(),
            ControlCommand::PauseNetwork => self.scheduler.pause_network(),
            ControlCommand::ResumeNetwork => self.scheduler.resume_network(),
        }
    }

    /// Parse and apply a command by name; unknown names are rejected.
    pub fn execute(&self, name: &str) -> Result<ControlCommand, CommandError> {
        let command = name.parse()?;
        self.apply(command);
        Ok(command)
    }
}
