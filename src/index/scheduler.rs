//! Periodic rebuild scheduler
//!
//! A ticker thread wakes on a fixed cadence and sweeps every registered
//! buffer, attempting a rebuild on each from a bounded rayon pool. A buffer
//! whose rebuild fails or panics is logged and skipped; the sweep and the
//! ticker carry on.

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::hot_swap::HotSwapBuffer;
use crate::index::types::OwnerId;
use ahash::AHashMap;
use parking_lot::RwLock;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Owner to buffer map shared between the registry and the ticker
pub type SharedBuffers = Arc<RwLock<AHashMap<OwnerId, Arc<HotSwapBuffer>>>>;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub rebuilt: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Rebuilt,
    Skipped,
    Failed,
}

/// Sweeps a shared set of buffers on a bounded pool
#[derive(Clone)]
pub struct RebuildScheduler {
    buffers: SharedBuffers,
    pool: Arc<ThreadPool>,
    initial_delay: Duration,
    period: Duration,
}

impl RebuildScheduler {
    pub fn new(buffers: SharedBuffers, config: &IndexConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.scheduler_threads)
            .thread_name(|i| format!("kwix-rebuild-{}", i))
            .build()
            .map_err(|e| IndexError::Scheduler(format!("Failed to build rebuild pool: {}", e)))?;

        Ok(Self {
            buffers,
            pool: Arc::new(pool),
            initial_delay: config.scheduler_initial_delay(),
            period: config.scheduler_period(),
        })
    }

    /// Number of threads rebuilding during a sweep
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run one sweep over every currently registered buffer
    pub fn tick(&self) -> SweepReport {
        let current: Vec<Arc<HotSwapBuffer>> = self.buffers.read().values().cloned().collect();
        self.sweep(&current)
    }

    /// Attempt a rebuild on each of `buffers`, in parallel on the pool
    pub fn sweep(&self, buffers: &[Arc<HotSwapBuffer>]) -> SweepReport {
        self.sweep_with(buffers, HotSwapBuffer::try_reindex)
    }

    /// Run `reindex` on each of `buffers` in parallel on the pool. An `Err`
    /// or a panic from one buffer is logged and counted as a failure.
    pub fn sweep_with<F>(&self, buffers: &[Arc<HotSwapBuffer>], reindex: F) -> SweepReport
    where
        F: Fn(&HotSwapBuffer) -> Result<bool> + Sync,
    {
        let outcomes: Vec<Outcome> = self.pool.install(|| {
            buffers
                .par_iter()
                .map(|b| reindex_isolated(b, &reindex))
                .collect()
        });

        let mut report = SweepReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Rebuilt => report.rebuilt += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed => report.failed += 1,
            }
        }
        report
    }

    /// Start ticking after the initial delay, then once per period
    pub fn spawn(&self) -> Result<SchedulerHandle> {
        let (tx, rx) = mpsc::channel::<()>();
        let scheduler = self.clone();

        let thread = thread::Builder::new()
            .name("kwix-scheduler".to_string())
            .spawn(move || {
                let mut wait = scheduler.initial_delay;
                loop {
                    match rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    // Fixed rate; a sweep that overruns the period starts
                    // the next one immediately instead of overlapping
                    let next = Instant::now() + scheduler.period;

                    let start = Instant::now();
                    let report = scheduler.tick();

                    if report.rebuilt > 0 || report.failed > 0 {
                        info!(
                            rebuilt = report.rebuilt,
                            failed = report.failed,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Rebuild sweep finished"
                        );
                    } else {
                        debug!(owners = report.skipped, "Rebuild sweep found nothing to do");
                    }

                    wait = next.saturating_duration_since(Instant::now());
                }
                debug!("Scheduler stopped");
            })
            .map_err(|e| IndexError::Scheduler(format!("Failed to spawn scheduler: {}", e)))?;

        info!(
            initial_delay_ms = self.initial_delay.as_millis() as u64,
            period_ms = self.period.as_millis() as u64,
            threads = self.threads(),
            "Scheduler started"
        );

        Ok(SchedulerHandle {
            shutdown: Some(tx),
            thread: Some(thread),
        })
    }
}

fn reindex_isolated<F>(buffer: &HotSwapBuffer, reindex: &F) -> Outcome
where
    F: Fn(&HotSwapBuffer) -> Result<bool>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| reindex(buffer))) {
        Ok(Ok(true)) => Outcome::Rebuilt,
        Ok(Ok(false)) => Outcome::Skipped,
        Ok(Err(e)) => {
            error!(owner = buffer.owner(), error = %e, "Rebuild failed");
            Outcome::Failed
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(owner = buffer.owner(), panic = %message, "Rebuild panicked");
            Outcome::Failed
        }
    }
}

/// Handle to a running ticker thread. Dropping it stops the ticker.
pub struct SchedulerHandle {
    /// Dropping or signalling the sender wakes and stops the ticker
    shutdown: Option<Sender<()>>,
    /// Thread handle (wrapped in Option to allow taking on shutdown)
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the ticker to stop and wait for an in-flight sweep to finish
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Scheduler thread panicked");
            }
        }
    }

    /// Check if the ticker is still running
    pub fn is_running(&self) -> bool {
        self.shutdown.is_some() && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Poll `condition` until it holds or `timeout` passes
#[cfg(test)]
pub(crate) fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
