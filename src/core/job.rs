// src/core/job.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::models::{JobOutcome, JobStatus, Service, Target};
use crate::core::registry::ScannerDefinition;

/// Completion signals are the tracker itself, which tags every signal with
/// its originating job no matter how many jobs share a channel.
pub type CompletionSender = UnboundedSender<Arc<JobTracker>>;

/// The registered consumer of a job's completion signal, guarded by the
/// handoff gate.
type ConsumerSlot = Arc<Mutex<Option<CompletionSender>>>;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(0);

/// Lifecycle state for one running or completed scan job.
///
/// A tracker is shared between the executor task that drives the external
/// tool and whichever single consumer currently owns the job's completion
/// signal (a foreground watch or the background job table). The `consumer`
/// slot doubles as the handoff gate: the creator holds its lock from before
/// the executor task starts until a consumer is registered, and the executor
/// re-acquires it to take-and-send the signal. At the instant of signalling
/// there is therefore exactly one registered consumer, and it will receive
/// the signal exactly once.
pub struct JobTracker {
    id: u64,
    pub target: Arc<Target>,
    pub service: Service,
    pub scanner: &'static ScannerDefinition,
    started: DateTime<Utc>,
    status: Mutex<JobStatus>,
    progress: Mutex<Option<String>>,
    stop: AtomicBool,
    silent: AtomicBool,
    consumer: ConsumerSlot,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JobTracker {
    pub(crate) fn new(
        target: Arc<Target>,
        service: Service,
        scanner: &'static ScannerDefinition,
        silent: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            target,
            service,
            scanner,
            started: Utc::now(),
            status: Mutex::new(JobStatus::Running),
            progress: Mutex::new(None),
            stop: AtomicBool::new(false),
            silent: AtomicBool::new(silent),
            consumer: Arc::new(Mutex::new(None)),
            handle: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// Ask the executor to stop at its next suspension point. Advisory only;
    /// the job stays `Running` until the executor observes the flag and exits.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Suppress tool output echoing; used when a job moves to the background.
    pub fn silence(&self) {
        self.silent.store(true, Ordering::Relaxed);
    }

    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Relaxed)
    }

    pub async fn status(&self) -> JobStatus {
        self.status.lock().await.clone()
    }

    /// Latest progress text reported by the tool, if any.
    pub async fn progress(&self) -> Option<String> {
        self.progress.lock().await.clone()
    }

    pub(crate) async fn set_progress(&self, text: String) {
        *self.progress.lock().await = Some(text);
    }

    /// Close the handoff gate on behalf of the creator.
    ///
    /// Must be called before the executor task starts; the returned guard is
    /// released by `LaunchedJob::deliver_to` once a consumer is registered,
    /// which is what finally allows the completion signal to be sent.
    pub(crate) async fn hold_handoff(&self) -> OwnedMutexGuard<Option<CompletionSender>> {
        Arc::clone(&self.consumer).lock_owned().await
    }

    pub(crate) async fn install_handle(&self, handle: JoinHandle<()>) {
        *self.handle.lock().await = Some(handle);
    }

    /// Take ownership of the execution handle. The handle is present exactly
    /// until the consumer that received the completion signal joins it (or
    /// shutdown abandons it), so `is_live` doubles as the "already completed"
    /// check for cancellation.
    pub async fn take_handle(&self) -> Option<JoinHandle<()>> {
        self.handle.lock().await.take()
    }

    pub async fn is_live(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Drop the execution handle without joining it, leaving the underlying
    /// tool to run unsupervised. Used only by the forced shutdown path.
    pub async fn abandon(&self) {
        if self.take_handle().await.is_some() {
            debug!(job = self.id, "Abandoned execution handle.");
        }
    }

    /// Re-register the consumer of this job's completion signal.
    ///
    /// Blocks while the executor is mid-signal, so the swap is strictly
    /// ordered against delivery. Returns `false` if the signal was already
    /// sent to the previously registered consumer, in which case the caller
    /// still holds the only copy and must forward it itself.
    pub async fn redirect_consumer(&self, events: CompletionSender) -> bool {
        let mut slot = self.consumer.lock().await;
        if slot.is_some() {
            *slot = Some(events);
            true
        } else {
            false
        }
    }

    /// Record the terminal status and deliver the completion signal to the
    /// registered consumer. Called exactly once, by the executor task, on
    /// every exit path.
    pub(crate) async fn complete(self: &Arc<Self>, outcome: JobOutcome) {
        *self.status.lock().await = JobStatus::Completed(outcome);
        let mut slot = self.consumer.lock().await;
        if let Some(events) = slot.take() {
            let _ = events.send(Arc::clone(self));
        }
    }
}
