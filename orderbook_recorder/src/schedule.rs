use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{
    sync::watch,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{error::Result, instrument::CacheKey};

/// Source of the timestamp each tick stamps its rows with.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time anchored once, then advanced by the tokio clock. Under paused
/// time the stamps move in lockstep with the ticks.
pub struct TokioClock {
    anchor: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or(chrono::Duration::MAX);
        self.anchor
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Outcome of one tick across all keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Keys whose work completed.
    pub succeeded: usize,
    /// Keys whose work failed and was dropped.
    pub failed: usize,
    /// Rows written across all keys.
    pub rows: usize,
}

impl TickReport {
    /// Folds per-key results, logging every failure. Failures are not
    /// retried; the next tick starts from scratch.
    pub fn collect(task: &str, keys: &[CacheKey], results: Vec<Result<usize>>) -> Self {
        let mut report = TickReport::default();
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(rows) => {
                    report.succeeded += 1;
                    report.rows += rows;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(task, key = %key, error = %e, "Tick failed for key");
                }
            }
        }
        report
    }
}

/// Runs `tick` every `period` until `shutdown` turns true, passing it
/// `clock.now()`. The first tick fires one period after start; late ticks
/// are skipped rather than replayed. A tick in progress when shutdown
/// arrives runs to completion.
pub async fn run_periodic<F, Fut>(
    task: &'static str,
    period: Duration,
    clock: &dyn Clock,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut(DateTime<Utc>) -> Fut,
    Fut: Future<Output = TickReport>,
{
    let Some(first) = Instant::now().checked_add(period) else {
        error!(
            task,
            period_ms = period.as_millis() as u64,
            "Period out of range, task not started"
        );
        return;
    };
    let mut interval = interval_at(first, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(task, period_ms = period.as_millis() as u64, "Periodic task started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = interval.tick() => {
                let report = tick(clock.now()).await;
                debug!(
                    task,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    rows = report.rows,
                    "Tick completed"
                );
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    info!(task, "Periodic task stopped");
}
