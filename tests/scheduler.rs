//! Scheduler behaviour under virtual time, with scripted probes and an
//! in-memory sink.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use linkwatch::config::Config;
use linkwatch::probes::{LatencyResult, ProbeError, ProbeRunner, SpeedProbe, ThroughputResult};
use linkwatch::scheduler::{Scheduler, SchedulerOptions};
use linkwatch::storage::{MetricsSink, StorageError};

const HIGH: Duration = Duration::from_millis(500);
const LOW: Duration = Duration::from_millis(10);

#[derive(Default)]
struct ScriptedProbe {
    pings: AtomicUsize,
    speedtests: AtomicUsize,
    /// Pings (0-based) in this range report `HIGH` latency, the rest `LOW`.
    high_pings: Range<usize>,
    /// The first N speed tests fail.
    failing_speedtests: usize,
    speedtest_duration: Duration,
}

impl ScriptedProbe {
    fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    fn speedtests(&self) -> usize {
        self.speedtests.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeedProbe for ScriptedProbe {
    async fn ping(&self, _cancel: &CancellationToken) -> Result<LatencyResult, ProbeError> {
        let n = self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(LatencyResult {
            target: "scripted".into(),
            observed_at: Utc::now(),
            latency: if self.high_pings.contains(&n) { HIGH } else { LOW },
        })
    }

    async fn speedtest(&self, cancel: &CancellationToken) -> Result<ThroughputResult, ProbeError> {
        let n = self.speedtests.fetch_add(1, Ordering::SeqCst);
        if !self.speedtest_duration.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
                _ = sleep(self.speedtest_duration) => {}
            }
        }
        if n < self.failing_speedtests {
            return Err(ProbeError::Download("connection reset".into()));
        }
        Ok(ThroughputResult {
            target: "scripted".into(),
            observed_at: Utc::now(),
            download_mbps: 100.0,
            upload_mbps: 20.0,
            latency: LOW,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    latency: AtomicUsize,
    throughput: AtomicUsize,
    closes: AtomicUsize,
    reject: bool,
    /// Every backend call hangs until cancelled, like a blackholed gateway.
    stall: bool,
}

impl RecordingSink {
    async fn write(&self, cancel: &CancellationToken) -> Result<(), StorageError> {
        if self.stall {
            cancel.cancelled().await;
            return Err(StorageError::Cancelled);
        }
        if self.reject {
            return Err(StorageError::Push("backend down".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MetricsSink for RecordingSink {
    async fn record_latency(
        &self,
        cancel: &CancellationToken,
        _result: &LatencyResult,
    ) -> Result<(), StorageError> {
        self.latency.fetch_add(1, Ordering::SeqCst);
        self.write(cancel).await
    }

    async fn record_throughput(
        &self,
        cancel: &CancellationToken,
        _result: &ThroughputResult,
    ) -> Result<(), StorageError> {
        self.throughput.fetch_add(1, Ordering::SeqCst);
        self.write(cancel).await
    }

    async fn close(&self, cancel: &CancellationToken) {
        let _ = self.write(cancel).await;
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn options(ping: u64, network: u64) -> SchedulerOptions {
    SchedulerOptions {
        ping_interval: Duration::from_secs(ping),
        network_interval: Duration::from_secs(network),
        ping_trigger_threshold: Duration::from_millis(100),
        poll_interval: Duration::from_secs(1),
    }
}

fn scheduler(
    probe: &Arc<ScriptedProbe>,
    sink: &Arc<RecordingSink>,
    options: SchedulerOptions,
) -> Arc<Scheduler> {
    let runner = Arc::new(ProbeRunner::new(Arc::clone(probe) as Arc<dyn SpeedProbe>, 10));
    Arc::new(Scheduler::new(
        runner,
        Arc::clone(sink) as Arc<dyn MetricsSink>,
        options,
    ))
}

/// Run the scheduler for `millis` of virtual time, then cancel and join it.
async fn run_for(scheduler: &Arc<Scheduler>, millis: u64) {
    let cancel = CancellationToken::new();
    let handle = {
        let scheduler = Arc::clone(scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.start(cancel).await })
    };
    sleep(Duration::from_millis(millis)).await;
    cancel.cancel();
    tokio_test::assert_ok!(timeout(Duration::from_secs(5), handle).await).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_high_latency_triggers_early_throughput() {
    let probe = Arc::new(ScriptedProbe {
        high_pings: 0..usize::MAX,
        ..Default::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let scheduler = scheduler(&probe, &sink, options(1, 600));

    run_for(&scheduler, 5_500).await;

    assert_eq!(probe.pings(), 5);
    // Five triggers, well before the 600s schedule; the burst of 3 caps them.
    assert_eq!(probe.speedtests(), 3);
    assert_eq!(sink.throughput.load(Ordering::SeqCst), 3);
    assert_eq!(scheduler.runner().snapshot().1.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_low_latency_waits_for_schedule() {
    let probe = Arc::new(ScriptedProbe::default());
    let sink = Arc::new(RecordingSink::default());
    let scheduler = scheduler(&probe, &sink, options(1, 10));

    run_for(&scheduler, 9_500).await;
    assert_eq!(probe.pings(), 9);
    assert_eq!(probe.speedtests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_triggers_coalesce_while_check_runs() {
    let probe = Arc::new(ScriptedProbe {
        high_pings: 0..5,
        speedtest_duration: Duration::from_secs(30),
        ..Default::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let scheduler = scheduler(&probe, &sink, options(1, 600));

    run_for(&scheduler, 100_500).await;

    // t=1 starts a check; triggers at t=2..5 collapse into one pending.
    assert_eq!(probe.speedtests(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_and_tick_in_same_instant_both_run() {
    // The 10th poll (t=10) reports high latency just as the 10s timer fires.
    let probe = Arc::new(ScriptedProbe {
        high_pings: 9..10,
        ..Default::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let scheduler = scheduler(&probe, &sink, options(1, 10));

    run_for(&scheduler, 10_500).await;

    assert_eq!(probe.pings(), 10);
    // One wake-up per select; the other one is served next, not dropped.
    assert_eq!(probe.speedtests(), 2);
    assert_eq!(sink.throughput.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_paused_network_runs_nothing() {
    let probe = Arc::new(ScriptedProbe {
        high_pings: 0..usize::MAX,
        ..Default::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let scheduler = scheduler(&probe, &sink, options(1, 10));
    scheduler.pause_network();

    let cancel = CancellationToken::new();
    let handle = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.start(cancel).await })
    };

    // Sample between each of five scheduled ticks (t=10..50).
    sleep(Duration::from_millis(5_500)).await;
    for tick in 1..=5 {
        sleep(Duration::from_secs(10)).await;
        assert_eq!(
            scheduler.network_limiter().status(),
            "Paused",
            "after tick {tick}"
        );
        assert_eq!(probe.speedtests(), 0, "after tick {tick}");
    }
    assert!(probe.pings() > 0);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resume_network_starts_with_empty_bucket() {
    let probe = Arc::new(ScriptedProbe::default());
    let sink = Arc::new(RecordingSink::default());
    let scheduler = scheduler(&probe, &sink, options(1, 10));
    scheduler.pause_network();

    let cancel = CancellationToken::new();
    let handle = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.start(cancel).await })
    };

    sleep(Duration::from_millis(55_500)).await;
    scheduler.resume_network();
    assert_eq!(scheduler.network_limiter().status(), format!("{} / 3", 0.1));

    // The tick at t=60 finds under half a token; t=70 finds over one.
    sleep(Duration::from_secs(10)).await;
    assert_eq!(probe.speedtests(), 0);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(probe.speedtests(), 1);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_paused_ping_stops_latency_probes() {
    let probe = Arc::new(ScriptedProbe::default());
    let sink = Arc::new(RecordingSink::default());
    let scheduler = scheduler(&probe, &sink, options(1, 600));
    scheduler.pause_ping();

    run_for(&scheduler, 10_500).await;

    assert_eq!(probe.pings(), 0);
    assert_eq!(scheduler.ping_limiter().status(), "Paused");
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_returns_promptly() {
    let probe = Arc::new(ScriptedProbe::default());
    let sink = Arc::new(RecordingSink::default());
    let scheduler = scheduler(&probe, &sink, options(1, 1));

    let cancel = CancellationToken::new();
    cancel.cancel();
    tokio_test::assert_ok!(timeout(Duration::from_millis(100), scheduler.start(cancel)).await);

    assert_eq!(probe.pings(), 0);
    assert_eq!(probe.speedtests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_running_check() {
    let probe = Arc::new(ScriptedProbe {
        speedtest_duration: Duration::from_secs(3600),
        ..Default::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let scheduler = scheduler(&probe, &sink, options(600, 10));

    // Cancelled at t=15, mid-way through the check that started at t=10.
    run_for(&scheduler, 15_000).await;

    assert_eq!(probe.speedtests(), 1);
    assert_eq!(sink.throughput.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_check_does_not_stop_schedule() {
    let probe = Arc::new(ScriptedProbe {
        failing_speedtests: 1,
        ..Default::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let scheduler = scheduler(&probe, &sink, options(1, 10));

    run_for(&scheduler, 25_000).await;

    assert_eq!(probe.speedtests(), 2);
    assert_eq!(sink.throughput.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.runner().snapshot().1.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sink_errors_are_not_fatal() {
    let probe = Arc::new(ScriptedProbe::default());
    let sink = Arc::new(RecordingSink {
        reject: true,
        ..Default::default()
    });
    let scheduler = scheduler(&probe, &sink, options(1, 600));

    run_for(&scheduler, 5_500).await;

    assert_eq!(probe.pings(), 5);
    assert_eq!(sink.latency.load(Ordering::SeqCst), 5);
    // History is kept even when the sink rejects the write.
    assert_eq!(scheduler.runner().snapshot().0.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_unblocks_stalled_sink_write() {
    let probe = Arc::new(ScriptedProbe::default());
    let sink = Arc::new(RecordingSink {
        stall: true,
        ..Default::default()
    });
    let scheduler = scheduler(&probe, &sink, options(1, 10));

    // The t=1 latency result sits in the sink until cancellation at t=12.
    run_for(&scheduler, 12_000).await;

    assert_eq!(probe.pings(), 1);
    assert_eq!(sink.latency.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_sink_is_bounded_by_deadline() {
    let sink = RecordingSink {
        stall: true,
        ..Default::default()
    };

    tokio_test::assert_ok!(
        timeout(
            Duration::from_secs(10),
            linkwatch::close_sink(&sink, Duration::from_secs(2)),
        )
        .await
    );
    assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_until_with_cancelled_token_exits_cleanly() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    tokio_test::assert_ok!(linkwatch::run_until(Config::default(), cancel).await);
}
