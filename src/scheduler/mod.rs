//! Dual-cadence monitoring scheduler.
//!
//! Two activities run concurrently until the shared cancellation token
//! fires:
//!
//! - the latency activity wakes every poll period, asks the ping limiter for
//!   a token, and runs a latency probe; latency above the trigger threshold
//!   posts to the trigger signal.
//! - the throughput activity waits on the trigger signal, its own interval
//!   timer, or cancellation; either wake-up runs a throughput probe if the
//!   network limiter admits it. Denied wake-ups are skipped, not queued.
//!
//! [`Scheduler::start`] returns only after both activities have stopped.

pub mod limiter;
pub mod trigger;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::MonitorConfig;
use crate::probes::ProbeRunner;
use crate::storage::MetricsSink;

pub use self::limiter::{RateController, RateState};
use self::trigger::{TriggerReceiver, TriggerSender};

/// Ping limiter burst.
pub const PING_BURST: u32 = 1;
/// Network limiter burst.
pub const NETWORK_BURST: u32 = 3;

/// Timing knobs for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub ping_interval: Duration,
    pub network_interval: Duration,
    pub ping_trigger_threshold: Duration,
    /// Wake-up granularity of the latency activity.
    pub poll_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            network_interval: Duration::from_secs(60),
            ping_trigger_threshold: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl From<&MonitorConfig> for SchedulerOptions {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            network_interval: config.network_interval(),
            ping_trigger_threshold: config.ping_threshold(),
            ..Self::default()
        }
    }
}

/// Why a throughput check woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Triggered,
    Scheduled,
}

impl Wake {
    fn as_str(self) -> &'static str {
        match self {
            Wake::Triggered => "triggered",
            Wake::Scheduled => "scheduled",
        }
    }
}

/// Owns both rate controllers and drives the latency and throughput
/// activities over a shared [`ProbeRunner`] and [`MetricsSink`].
pub struct Scheduler {
    runner: Arc<ProbeRunner>,
    sink: Arc<dyn MetricsSink>,
    ping_limiter: RateController,
    network_limiter: RateController,
    options: SchedulerOptions,
}

impl Scheduler {
    /// Build a scheduler with full limiter buckets; nothing runs until
    /// [`Scheduler::start`].
    pub fn new(
        runner: Arc<ProbeRunner>,
        sink: Arc<dyn MetricsSink>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            ping_limiter: RateController::new(options.ping_interval, PING_BURST),
            network_limiter: RateController::new(options.network_interval, NETWORK_BURST),
            runner,
            sink,
            options,
        }
    }

    /// Run both activities until `cancel` fires, then wait for them to stop.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) {
        info!(
            ping_interval_secs = self.options.ping_interval.as_secs_f64(),
            network_interval_secs = self.options.network_interval.as_secs_f64(),
            threshold_ms = self.options.ping_trigger_threshold.as_millis() as u64,
            "starting monitoring loop"
        );

        let (trigger_tx, trigger_rx) = trigger::channel();
        let latency = tokio::spawn(Arc::clone(self).latency_activity(cancel.clone(), trigger_tx));
        let throughput =
            tokio::spawn(Arc::clone(self).throughput_activity(cancel.clone(), trigger_rx));

        let (latency, throughput) = tokio::join!(latency, throughput);
        for (activity, joined) in [("latency", latency), ("throughput", throughput)] {
            if let Err(e) = joined {
                error!(activity, error = %e, "activity terminated abnormally");
            }
        }
        info!("monitor shut down gracefully");
    }

    async fn latency_activity(self: Arc<Self>, cancel: CancellationToken, trigger: TriggerSender) {
        let period = self.options.poll_interval;
        let mut poll = time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("latency check activity stopping");
                    return;
                }
                _ = poll.tick() => {
                    if self.ping_limiter.allow() {
                        self.latency_check(&cancel, &trigger).await;
                    }
                }
            }
        }
    }

    async fn latency_check(&self, cancel: &CancellationToken, trigger: &TriggerSender) {
        debug!("performing latency check");
        let result = match self.runner.run_latency(cancel).await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "latency probe failed");
                return;
            }
        };

        if let Err(e) = self.sink.record_latency(cancel, &result).await {
            error!(error = %e, "failed to store latency result");
        }

        if result.latency > self.options.ping_trigger_threshold {
            info!(
                latency_ms = result.latency.as_millis() as u64,
                threshold_ms = self.options.ping_trigger_threshold.as_millis() as u64,
                "latency is high, triggering throughput check"
            );
            if !trigger.post() {
                info!("throughput check trigger already pending, skipping immediate check");
            }
        }
    }

    async fn throughput_activity(
        self: Arc<Self>,
        cancel: CancellationToken,
        mut trigger: TriggerReceiver,
    ) {
        let period = self.options.network_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("throughput check activity stopping");
                    return;
                }
                Some(()) = trigger.recv() => {
                    self.throughput_check(&cancel, Wake::Triggered).await;
                }
                _ = ticker.tick() => {
                    self.throughput_check(&cancel, Wake::Scheduled).await;
                }
            }
        }
    }

    async fn throughput_check(&self, cancel: &CancellationToken, wake: Wake) {
        debug!(reason = wake.as_str(), "performing throughput check");
        // Triggers bypass the schedule but never the limiter.
        if !self.network_limiter.allow() {
            info!(
                reason = wake.as_str(),
                tokens = self.network_limiter.tokens(),
                "throughput check rate limit active, check skipped"
            );
            return;
        }

        let result = match self.runner.run_throughput(cancel).await {
            Ok(r) => r,
            Err(e) => {
                error!(reason = wake.as_str(), error = %e, "speed test failed");
                return;
            }
        };

        if let Err(e) = self.sink.record_throughput(cancel, &result).await {
            error!(error = %e, "failed to store throughput result");
        }
    }

    /// Stop admitting latency probes.
    pub fn pause_ping(&self) {
        self.ping_limiter.pause();
        info!("latency checks paused");
    }

    /// Admit latency probes again at the configured rate.
    pub fn resume_ping(&self) {
        self.ping_limiter.resume();
        info!("latency checks resumed");
    }

    /// Stop admitting throughput probes, scheduled or triggered.
    pub fn pause_network(&self) {
        self.network_limiter.pause();
        info!("throughput checks paused");
    }

    /// Admit throughput probes again at the configured rate.
    pub fn resume_network(&self) {
        self.network_limiter.resume();
        info!("throughput checks resumed");
    }

    /// Limiter gating latency probes.
    pub fn ping_limiter(&self) -> &RateController {
        &self.ping_limiter
    }

    /// Limiter gating throughput probes.
    pub fn network_limiter(&self) -> &RateController {
        &self.network_limiter
    }

    /// Probe runner holding the recent result history.
    pub fn runner(&self) -> &ProbeRunner {
        &self.runner
    }

    /// Timing in effect.
    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }
}
