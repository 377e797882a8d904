//! Batch-size sweep.
//!
//! Runs one batch per configured size, strictly one after another, and
//! records the total wall-clock time of each. The first failing batch aborts
//! the sweep.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tb_core::{JobResult, Result};

use crate::orchestrator::BatchRunner;

/// Timing of one completed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Number of jobs in the batch.
    pub batch_size: usize,
    /// Wall-clock time from first submission to last completion.
    #[serde(with = "tb_core::duration_secs_f64")]
    pub total: Duration,
    /// Per-job results in submission order.
    pub jobs: Vec<JobResult>,
}

impl BatchReport {
    /// Completed conversions per second of wall-clock time.
    pub fn throughput(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs > 0.0 {
            self.batch_size as f64 / secs
        } else {
            0.0
        }
    }

    /// Mean per-job time, `None` for an empty batch.
    pub fn mean_job_time(&self) -> Option<Duration> {
        let n = u32::try_from(self.jobs.len()).ok().filter(|n| *n > 0)?;
        let sum: Duration = self.jobs.iter().map(|j| j.elapsed).sum();
        Some(sum / n)
    }
}

/// Callback invoked after each batch completes.
pub struct BatchObserver {
    callback: Box<dyn Fn(&BatchReport) + Send + Sync>,
}

impl BatchObserver {
    pub fn new(f: impl Fn(&BatchReport) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(f),
        }
    }

    /// An observer that ignores every report.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    fn notify(&self, report: &BatchReport) {
        (self.callback)(report);
    }
}

impl std::fmt::Debug for BatchObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchObserver").finish_non_exhaustive()
    }
}

/// Sequential sweep over batch sizes.
pub struct Benchmark {
    runner: BatchRunner,
    observer: BatchObserver,
}

impl Benchmark {
    pub fn new(runner: BatchRunner) -> Self {
        Self {
            runner,
            observer: BatchObserver::noop(),
        }
    }

    /// Builder: get notified as each batch finishes.
    pub fn with_observer(mut self, observer: BatchObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Run one batch of `batch_size` jobs and time it.
    ///
    /// Clearing old outputs happens before the clock starts.
    pub async fn run_one(&self, source: &Path, batch_size: usize) -> Result<BatchReport> {
        self.runner.prepare_output_dir().await?;

        tracing::info!("Starting {batch_size} conversions.");
        let start = Instant::now();
        let jobs = self.runner.run_jobs(source, batch_size).await?;
        let total = start.elapsed();
        for job in &jobs {
            tracing::debug!(
                "{}: {:.2} s",
                job.output.display(),
                job.elapsed.as_secs_f64()
            );
        }
        tracing::info!(
            "Completed {batch_size} conversions in {:.2} seconds.",
            total.as_secs_f64()
        );

        Ok(BatchReport {
            batch_size,
            total,
            jobs,
        })
    }

    /// Run every batch size in order.
    ///
    /// # Errors
    ///
    /// The first batch error ends the sweep and is returned unchanged; later
    /// sizes are not attempted.
    pub async fn run(&self, source: &Path, batch_sizes: &[usize]) -> Result<Vec<BatchReport>> {
        let mut reports = Vec::with_capacity(batch_sizes.len());
        for &size in batch_sizes {
            let report = self.run_one(source, size).await?;
            self.observer.notify(&report);
            reports.push(report);
        }
        Ok(reports)
    }
}
