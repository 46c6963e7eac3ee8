//! Background transformation jobs
//!
//! Tracks one job per track id. A track may only have a single
//! transformation running at a time; a second request while the first is
//! still processing is refused instead of queued.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;

use crate::effects::Effects;
use crate::error::{LofiError, Result};
use crate::pipeline::{Pipeline, TransformReport};

/// Lifecycle of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed { output: PathBuf, duration_secs: u64 },
    Failed { code: String, message: String },
}

impl JobStatus {
    pub fn is_processing(&self) -> bool {
        matches!(self, JobStatus::Processing)
    }
}

/// One submitted transformation
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub track_id: String,
    pub input: PathBuf,
    pub effects: Effects,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Handle to a running job
#[derive(Debug)]
pub struct JobHandle {
    track_id: String,
    handle: JoinHandle<Result<TransformReport>>,
}

impl JobHandle {
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Block until the job finishes
    pub fn wait(self) -> Result<TransformReport> {
        self.handle
            .join()
            .map_err(|_| LofiError::processing("worker", "job thread panicked"))?
    }
}

/// Runs transformations on background threads, one per track at a time
#[derive(Debug, Clone)]
pub struct JobTracker {
    pipeline: Arc<Pipeline>,
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
}

impl JobTracker {
    pub fn new(pipeline: Pipeline) -> Self {
        Self::with_shared(Arc::new(pipeline))
    }

    pub fn with_shared(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<String, JobRecord>> {
        // A panicking job never holds the lock, so the map is still consistent
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start transforming `input` for `track_id`
    ///
    /// # Errors
    /// `TransformInFlight` if a job for `track_id` is still processing.
    pub fn submit(
        &self,
        track_id: impl Into<String>,
        input: &Path,
        effects: Effects,
    ) -> Result<JobHandle> {
        let track_id = track_id.into();

        {
            let mut jobs = self.lock_jobs();
            if jobs
                .get(&track_id)
                .is_some_and(|job| job.status.is_processing())
            {
                return Err(LofiError::TransformInFlight { track_id });
            }
            jobs.insert(
                track_id.clone(),
                JobRecord {
                    track_id: track_id.clone(),
                    input: input.to_path_buf(),
                    effects,
                    status: JobStatus::Processing,
                    started_at: Utc::now(),
                    finished_at: None,
                },
            );
        }

        info!("Job {} started for {}", track_id, input.display());

        let tracker = self.clone();
        let id = track_id.clone();
        let input = input.to_path_buf();
        let handle = thread::spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                tracker.pipeline.transform_with_report(&input, &effects)
            }))
            .unwrap_or_else(|_| Err(LofiError::processing("worker", "transformation panicked")));

            tracker.finish(&id, &result);
            result
        });

        Ok(JobHandle { track_id, handle })
    }

    fn finish(&self, track_id: &str, result: &Result<TransformReport>) {
        let status = match result {
            Ok(report) => {
                info!(
                    "Job {} completed: {}",
                    track_id,
                    report.output_path.display()
                );
                JobStatus::Completed {
                    output: report.output_path.clone(),
                    duration_secs: report.duration_secs,
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", track_id, e);
                JobStatus::Failed {
                    code: e.error_code().to_string(),
                    message: e.to_string(),
                }
            }
        };

        if let Some(job) = self.lock_jobs().get_mut(track_id) {
            job.status = status;
            job.finished_at = Some(Utc::now());
        }
    }

    /// Current status of a track's job
    pub fn status(&self, track_id: &str) -> Option<JobStatus> {
        self.lock_jobs().get(track_id).map(|job| job.status.clone())
    }

    pub fn record(&self, track_id: &str) -> Option<JobRecord> {
        self.lock_jobs().get(track_id).cloned()
    }

    /// Drop a finished job's record
    ///
    /// # Errors
    /// `TransformInFlight` if the job is still processing.
    pub fn forget(&self, track_id: &str) -> Result<Option<JobRecord>> {
        let mut jobs = self.lock_jobs();
        if jobs
            .get(track_id)
            .is_some_and(|job| job.status.is_processing())
        {
            return Err(LofiError::TransformInFlight {
                track_id: track_id.to_string(),
            });
        }
        Ok(jobs.remove(track_id))
    }

    /// Number of jobs still processing
    pub fn in_flight(&self) -> usize {
        self.lock_jobs()
            .values()
            .filter(|job| job.status.is_processing())
            .count()
    }
}

/// Run a transformation on tokio's blocking pool
#[cfg(feature = "async")]
pub async fn transform_async(
    pipeline: Arc<Pipeline>,
    input: PathBuf,
    effects: Effects,
) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || pipeline.transform(&input, &effects))
        .await
        .map_err(|e| LofiError::processing("worker", e.to_string()))?
}
