// Probe scheduler: every round, one fire-and-forget task per target.
// Rounds are not joined; a slow target's result arrives whenever it is done,
// stamped with the start time of the round that launched it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::models::{BenchmarkResult, FAILED_LATENCY, Target};
use crate::probe::{ProbeRunner, RetryPolicy, probe_with_retry};

/// Targets, runner, result channel and shutdown for the scheduler.
pub struct SchedulerDeps<P> {
    pub targets: Arc<[Target]>,
    pub runner: Arc<P>,
    pub results_tx: mpsc::UnboundedSender<BenchmarkResult>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub struct SchedulerConfig {
    pub round_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            round_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Starts the round loop. The first round begins immediately. On shutdown no new
/// rounds start; probes already in flight still deliver their results.
pub fn spawn<P: ProbeRunner>(
    deps: SchedulerDeps<P>,
    config: SchedulerConfig,
) -> tokio::task::JoinHandle<()> {
    let SchedulerDeps {
        targets,
        runner,
        results_tx,
        mut shutdown_rx,
    } = deps;
    let SchedulerConfig {
        round_interval,
        retry,
    } = config;

    tokio::spawn(async move {
        let mut tick = interval(round_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut round: u64 = 0;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    round += 1;
                    let started_at = Local::now();
                    info!(round, targets = targets.len(), "round started");
                    for target in targets.iter() {
                        spawn_probe(
                            runner.clone(),
                            target.clone(),
                            retry,
                            started_at,
                            results_tx.clone(),
                        );
                    }
                }
                _ = &mut shutdown_rx => {
                    debug!(rounds = round, "scheduler shutting down");
                    break;
                }
            }
        }
    })
}

/// Runs one target's retrying probe in its own task so a panic there only
/// costs this target's cell for the round; it is reported as a failed probe.
fn spawn_probe<P: ProbeRunner>(
    runner: Arc<P>,
    target: Target,
    retry: RetryPolicy,
    started_at: DateTime<Local>,
    results_tx: mpsc::UnboundedSender<BenchmarkResult>,
) {
    tokio::spawn(async move {
        let name = target.name.clone();
        debug!(site = %name, "testing");
        let probe =
            tokio::spawn(async move { probe_with_retry(runner.as_ref(), &target, &retry).await });
        let rt_ms = match probe.await {
            Ok(outcome) => outcome.rt_ms,
            Err(e) => {
                warn!(site = %name, error = %e, "probe task failed");
                FAILED_LATENCY
            }
        };
        if results_tx
            .send(BenchmarkResult::new(name, rt_ms, started_at))
            .is_err()
        {
            debug!("result channel closed; dropping result");
        }
    });
}
