//! In-memory registry of background research jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::progress::{ProgressReporter, ResearchProgress};
use crate::research::{ResearchOrchestrator, ResearchResult, ResearchScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchJob {
    pub id: String,
    pub topic: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ResearchProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Optional observers for one job. All of them run on the job's task.
#[derive(Clone, Default)]
pub struct JobCallbacks {
    pub on_progress: Option<Arc<dyn Fn(&ResearchProgress) + Send + Sync>>,
    pub on_complete: Option<Arc<dyn Fn(&ResearchResult) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

struct JobEntry {
    job: ResearchJob,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct JobRegistry {
    orchestrator: ResearchOrchestrator,
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
}

impl JobRegistry {
    pub fn new(orchestrator: ResearchOrchestrator) -> Self {
        JobRegistry {
            orchestrator,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register `id` as pending and run the research in the background.
    ///
    /// Fails if a job with this id is still pending or running. A finished
    /// job with the same id is replaced.
    pub fn start(
        &self,
        id: impl Into<String>,
        topic: impl Into<String>,
        breadth: usize,
        depth: usize,
        callbacks: JobCallbacks,
    ) -> Result<JoinHandle<()>, JobError> {
        let id = id.into();
        let topic = topic.into();
        let cancel = CancellationToken::new();

        {
            let mut jobs = self.write();
            if let Some(existing) = jobs.get(&id) {
                if !existing.job.status.is_terminal() {
                    return Err(JobError::AlreadyActive {
                        id,
                        status: existing.job.status.to_string(),
                    });
                }
                tracing::debug!(job_id = %id, "replacing finished job");
            }
            jobs.insert(
                id.clone(),
                JobEntry {
                    job: ResearchJob {
                        id: id.clone(),
                        topic: topic.clone(),
                        status: JobStatus::Pending,
                        progress: None,
                        result: None,
                        error: None,
                        created_at: Utc::now(),
                        finished_at: None,
                    },
                    cancel: cancel.clone(),
                },
            );
        }
        tracing::info!(job_id = %id, breadth, depth, "research job registered");

        let registry = self.clone();
        Ok(tokio::spawn(async move {
            registry.execute(id, topic, breadth, depth, callbacks, cancel).await;
        }))
    }

    /// Like [`JobRegistry::start`] with a freshly generated id.
    pub fn submit(
        &self,
        topic: impl Into<String>,
        breadth: usize,
        depth: usize,
        callbacks: JobCallbacks,
    ) -> Result<String, JobError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.start(id.clone(), topic, breadth, depth, callbacks)?;
        Ok(id)
    }

    pub fn status(&self, id: &str) -> Option<ResearchJob> {
        self.read().get(id).map(|entry| entry.job.clone())
    }

    /// Ask an active job to stop. Branches already running finish and the
    /// job completes with what was gathered. Returns false for unknown or
    /// finished jobs.
    pub fn cancel(&self, id: &str) -> bool {
        match self.read().get(id) {
            Some(entry) if !entry.job.status.is_terminal() => {
                entry.cancel.cancel();
                tracing::info!(job_id = %id, "research job cancellation requested");
                true
            }
            _ => false,
        }
    }

    pub fn list(&self) -> Vec<ResearchJob> {
        let mut jobs: Vec<ResearchJob> =
            self.read().values().map(|entry| entry.job.clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    async fn execute(
        &self,
        id: String,
        topic: String,
        breadth: usize,
        depth: usize,
        callbacks: JobCallbacks,
        cancel: CancellationToken,
    ) {
        self.update(&id, |job| job.status = JobStatus::Running);

        let registry = self.clone();
        let job_id = id.clone();
        let on_progress = callbacks.on_progress.clone();
        let progress = ProgressReporter::new(
            breadth,
            depth,
            Some(Arc::new(move |p: &ResearchProgress| {
                registry.update(&job_id, |job| job.progress = Some(p.clone()));
                if let Some(callback) = &on_progress {
                    callback(p);
                }
            })),
        );

        let outcome = self
            .orchestrator
            .run(ResearchScope::new(topic, breadth, depth), &progress, &cancel)
            .await;

        match outcome {
            Ok(result) => {
                tracing::info!(
                    job_id = %id,
                    learnings = result.learnings.len(),
                    urls = result.visited_urls.len(),
                    "research job completed"
                );
                let stored = result.clone();
                self.update(&id, move |job| {
                    job.status = JobStatus::Completed;
                    job.result = Some(stored);
                    job.finished_at = Some(Utc::now());
                });
                if let Some(callback) = &callbacks.on_complete {
                    callback(&result);
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(job_id = %id, error = %message, "research job failed");
                let stored = message.clone();
                self.update(&id, move |job| {
                    job.status = JobStatus::Failed;
                    job.error = Some(stored);
                    job.finished_at = Some(Utc::now());
                });
                if let Some(callback) = &callbacks.on_error {
                    callback(&message);
                }
            }
        }
    }

    // No-op once the job is terminal.
    fn update<F: FnOnce(&mut ResearchJob)>(&self, id: &str, apply: F) {
        if let Some(entry) = self.write().get_mut(id) {
            if !entry.job.status.is_terminal() {
                apply(&mut entry.job);
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobEntry>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobEntry>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
