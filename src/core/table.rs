// src/core/table.rs

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::core::job::{CompletionSender, JobTracker};
use crate::core::models::JobStatus;
use crate::output;

/// User errors from job-table operations; neither has any side effect.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobTableError {
    #[error("{0}: no such job")]
    NoSuchJob(usize),
    #[error("{0}: job already completed")]
    AlreadyCompleted(usize),
}

/// One row of the operator-visible job listing. Formatting and pagination are
/// the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub index: usize,
    pub target: String,
    pub service: String,
    pub scanner: &'static str,
    pub status: String,
    pub active: bool,
}

/// The operator-visible collection of background jobs.
///
/// Insertion order is the display index and never changes while the process
/// runs; completed jobs keep their slot and are only updated in place. The
/// table owns the shared completion channel that every backgrounded job
/// signals on.
pub struct JobTable {
    jobs: Vec<Arc<JobTracker>>,
    events: CompletionSender,
    completions: UnboundedReceiver<Arc<JobTracker>>,
}

impl JobTable {
    pub fn new() -> Self {
        let (events, completions) = mpsc::unbounded_channel();
        Self { jobs: Vec::new(), events, completions }
    }

    /// The shared completion channel, for registering as a job's consumer.
    pub fn sender(&self) -> CompletionSender {
        self.events.clone()
    }

    /// Add a background job; returns its stable display index.
    pub fn append(&mut self, job: Arc<JobTracker>) -> usize {
        self.jobs.push(job);
        self.jobs.len() - 1
    }

    /// Consume any queued completion signals, joining each finished executor
    /// task and clearing its handle. Idempotent: a second pass with no new
    /// completions finds an empty channel and already-cleared handles.
    pub async fn reconcile(&mut self) {
        while let Ok(done) = self.completions.try_recv() {
            if let Some(handle) = done.take_handle().await {
                let _ = handle.await;
                debug!(job = done.id(), "Reconciled completed job.");
            }
        }
    }

    /// Current rows, reconciled first so status is never stale by more than
    /// one pass.
    pub async fn list(&mut self) -> Vec<JobRow> {
        self.reconcile().await;
        let mut rows = Vec::with_capacity(self.jobs.len());
        for (index, job) in self.jobs.iter().enumerate() {
            let status = match job.status().await {
                JobStatus::Running => job
                    .progress()
                    .await
                    .unwrap_or_else(|| "running".to_string()),
                done => done.to_string(),
            };
            rows.push(JobRow {
                index,
                target: job.target.name.clone(),
                service: job.service.label(),
                scanner: job.scanner.name,
                status,
                active: job.is_live().await,
            });
        }
        rows
    }

    /// Request cancellation of a running job. Returns immediately; the job
    /// stays listed as running until the executor honours the request.
    pub async fn cancel(&self, index: usize) -> Result<(), JobTableError> {
        let job = self
            .jobs
            .get(index)
            .ok_or(JobTableError::NoSuchJob(index))?;
        if !job.is_live().await {
            return Err(JobTableError::AlreadyCompleted(index));
        }
        info!(job = job.id(), index, "Cancellation requested.");
        job.request_stop();
        Ok(())
    }

    pub async fn has_live(&self) -> bool {
        for job in &self.jobs {
            if job.is_live().await {
                return true;
            }
        }
        false
    }

    /// Block until every outstanding job has completed, with a two-strike
    /// interrupt policy: the first interrupt requests a cooperative stop on
    /// everything still running and keeps waiting for genuine completions;
    /// the second abandons the remaining execution handles outright, leaving
    /// their tools to run unsupervised.
    pub async fn shutdown(&mut self, interrupts: &mut UnboundedReceiver<()>) {
        self.reconcile().await;
        if !self.has_live().await {
            return;
        }
        output::info("waiting for background jobs to complete");

        let mut interrupted = false;
        loop {
            if !self.has_live().await {
                return;
            }
            tokio::select! {
                done = self.completions.recv() => {
                    // The table holds its own sender, so the channel cannot
                    // close while we wait.
                    let Some(done) = done else { return };
                    if let Some(handle) = done.take_handle().await {
                        let _ = handle.await;
                        debug!(job = done.id(), "Drained completed job.");
                    }
                }
                Some(_) = interrupts.recv() => {
                    if !interrupted {
                        interrupted = true;
                        output::warn("cancelling background jobs");
                        for job in &self.jobs {
                            if job.is_live().await {
                                job.request_stop();
                            }
                        }
                    } else {
                        output::warn("forcing background job exit!");
                        warn!("Abandoning outstanding scan jobs on repeated interrupt.");
                        for job in &self.jobs {
                            job.abandon().await;
                        }
                        return;
                    }
                }
            }
        }
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}
