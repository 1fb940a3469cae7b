//! Serialized queue of input tables awaiting processing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::pipeline::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub id: u64,
    pub csv_path: PathBuf,
    pub status: JobStatus,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub summary: Option<RunSummary>,
    pub outputs: Vec<PathBuf>,
}

impl ProcessingJob {
    fn new(id: u64, csv_path: PathBuf) -> Self {
        Self {
            id,
            csv_path,
            status: JobStatus::Queued,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            summary: None,
            outputs: Vec::new(),
        }
    }

    /// Sidecar beside the input, if one exists.
    pub fn sidecar_path(&self) -> Option<PathBuf> {
        let path = crate::config::ProcessingConfig::sidecar_path(&self.csv_path);
        path.exists().then_some(path)
    }
}

/// Counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Default)]
struct QueueState {
    jobs: Vec<ProcessingJob>,
    next_id: u64,
}

/// Jobs are handed out in arrival order, one at a time.
#[derive(Default)]
pub struct ProcessingQueue {
    state: Mutex<QueueState>,
}

impl ProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file unless it is already known to the queue.
    /// Returns the job id when a new job was created.
    pub async fn enqueue(&self, csv_path: &Path) -> Option<u64> {
        let mut state = self.state.lock().await;
        if state.jobs.iter().any(|job| job.csv_path == csv_path) {
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.jobs.push(ProcessingJob::new(id, csv_path.to_path_buf()));
        Some(id)
    }

    /// Claim the oldest queued job, unless one is already processing.
    pub async fn start_next(&self) -> Option<ProcessingJob> {
        let mut state = self.state.lock().await;
        if state.jobs.iter().any(|job| job.status == JobStatus::Processing) {
            return None;
        }
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.status == JobStatus::Queued)?;
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        Some(job.clone())
    }

    pub async fn complete(&self, id: u64, summary: RunSummary, outputs: Vec<PathBuf>) {
        self.finish(id, |job| {
            job.status = JobStatus::Completed;
            job.summary = Some(summary);
            job.outputs = outputs;
        })
        .await;
    }

    pub async fn fail(&self, id: u64, error: impl Into<String>) {
        let error = error.into();
        self.finish(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        })
        .await;
    }

    async fn finish<F: FnOnce(&mut ProcessingJob)>(&self, id: u64, apply: F) {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.iter_mut().find(|job| job.id == id) {
            apply(job);
            job.finished_at = Some(Utc::now());
        }
    }

    pub async fn get(&self, id: u64) -> Option<ProcessingJob> {
        let state = self.state.lock().await;
        state.jobs.iter().find(|job| job.id == id).cloned()
    }

    pub async fn jobs(&self) -> Vec<ProcessingJob> {
        self.state.lock().await.jobs.clone()
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        let mut status = QueueStatus::default();
        for job in &state.jobs {
            match job.status {
                JobStatus::Queued => status.queued += 1,
                JobStatus::Processing => status.processing += 1,
                JobStatus::Completed => status.completed += 1,
                JobStatus::Failed => status.failed += 1,
            }
        }
        status
    }
}
