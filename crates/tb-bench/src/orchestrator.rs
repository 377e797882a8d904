//! Batch orchestration: run N transcodes of one source concurrently.
//!
//! Jobs are tokio tasks in a [`JoinSet`]. A [`Semaphore`] caps how many run
//! at once, independently of the batch size. The first failing job aborts
//! every sibling (their processes die with their tasks) and its error is
//! returned as the batch's error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tb_av::Transcoder;
use tb_core::{Error, JobResult, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// File extension of every job output.
const OUTPUT_EXTENSION: &str = "mp4";

/// Runs batches of identical transcode jobs.
pub struct BatchRunner {
    transcoder: Arc<dyn Transcoder>,
    output_dir: PathBuf,
    prefix: String,
    max_concurrency: usize,
}

impl BatchRunner {
    /// Create a runner writing `<output_dir>/<prefix>_<i>.mp4`, with at most
    /// `max_concurrency` jobs in flight.
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        output_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            transcoder,
            output_dir: output_dir.into(),
            prefix: prefix.into(),
            max_concurrency: max_concurrency.clamp(1, Semaphore::MAX_PERMITS),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Output path of job `index`.
    pub fn output_path(&self, index: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_{index}.{OUTPUT_EXTENSION}", self.prefix))
    }

    /// Whether `file_name` is `<prefix>_<i>.mp4` for some job index `i`.
    fn is_batch_output(&self, file_name: &str) -> bool {
        file_name
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| rest.strip_suffix(OUTPUT_EXTENSION))
            .and_then(|rest| rest.strip_suffix('.'))
            .is_some_and(|index| index.parse::<usize>().is_ok())
    }

    /// Create the output directory if needed and delete outputs left by a
    /// previous batch. Returns the number of files removed.
    ///
    /// A file that cannot be removed is logged and skipped; the next encode
    /// overwrites it anyway.
    pub async fn prepare_output_dir(&self) -> Result<usize> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.output_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !self.is_batch_output(name) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove {}: {e}", entry.path().display()),
            }
        }

        if removed > 0 {
            tracing::debug!(
                "Removed {removed} previous outputs from {}",
                self.output_dir.display()
            );
        }
        Ok(removed)
    }

    /// Prepare the output directory, then run `count` jobs.
    ///
    /// One-shot entry point for a single batch. The sweep in
    /// [`crate::Benchmark`] calls the two steps separately so that clearing
    /// old outputs stays off the batch clock.
    pub async fn run_batch(&self, source: &Path, count: usize) -> Result<Vec<JobResult>> {
        self.prepare_output_dir().await?;
        self.run_jobs(source, count).await
    }

    /// Run `count` jobs against `source` and collect their results in
    /// submission order.
    ///
    /// # Errors
    ///
    /// Returns the first job error observed, unchanged. All other jobs are
    /// aborted and awaited before returning, so no encoder outlives the
    /// batch. A panicking job surfaces as [`Error::Internal`].
    pub async fn run_jobs(&self, source: &Path, count: usize) -> Result<Vec<JobResult>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let source: Arc<Path> = Arc::from(source);
        let mut jobs = JoinSet::new();

        for index in 0..count {
            let transcoder = Arc::clone(&self.transcoder);
            let semaphore = Arc::clone(&semaphore);
            let source = Arc::clone(&source);
            let output = self.output_path(index);

            jobs.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| (index, Error::Internal("job semaphore closed".into())))?;
                transcoder
                    .transcode(&source, &output)
                    .await
                    .map(|result| (index, result))
                    .map_err(|e| (index, e))
            });
        }

        let mut results: Vec<Option<JobResult>> = vec![None; count];
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(Ok((index, result))) => results[index] = Some(result),
                Ok(Err((index, e))) => {
                    tracing::error!("Job {index} failed; cancelling the rest of the batch: {e}");
                    jobs.shutdown().await;
                    return Err(e);
                }
                Err(join_err) => {
                    tracing::error!("Job task failed; cancelling the rest of the batch: {join_err}");
                    jobs.shutdown().await;
                    return Err(Error::Internal(format!("job task failed: {join_err}")));
                }
            }
        }

        results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::Internal("a job finished without a result".into()))
    }
}
