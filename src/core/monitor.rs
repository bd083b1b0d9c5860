// src/core/monitor.rs

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::core::job::JobTracker;
use crate::core::table::JobTable;
use crate::output;

/// Operator control events delivered to a foreground watch.
///
/// These arrive over an explicit channel fed by the input reader; the monitor
/// consumes them cooperatively at its single suspension point rather than
/// through an asynchronous signal handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Move the watched job to the background without losing it.
    Detach,
    /// Request cooperative cancellation of the watched job.
    Interrupt,
}

/// How a foreground watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The job completed while being watched; its handle has been joined.
    Completed,
    /// The job was handed over to the job table and is still the table's to
    /// reconcile.
    Detached,
}

/// Block the command loop on a single job's completion.
///
/// The watched job must have been delivered to `completion`'s sender. An
/// `Interrupt` sets the stop flag and keeps waiting (cancellation is
/// requested, not assumed). A `Detach` silences the job, re-registers the
/// table's shared channel as its consumer and appends it to the table; if the
/// completion signal already landed on the private channel, it is forwarded
/// to the table instead, so the signal reaches exactly one consumer exactly
/// once on every interleaving.
pub async fn watch(
    job: Arc<JobTracker>,
    mut completion: UnboundedReceiver<Arc<JobTracker>>,
    controls: &mut UnboundedReceiver<ControlSignal>,
    table: &mut JobTable,
) -> WatchOutcome {
    loop {
        tokio::select! {
            done = completion.recv() => {
                if let Some(done) = done {
                    if let Some(handle) = done.take_handle().await {
                        let _ = handle.await;
                    }
                }
                debug!(job = job.id(), "Foreground job completed.");
                return WatchOutcome::Completed;
            }
            Some(signal) = controls.recv() => match signal {
                ControlSignal::Interrupt => {
                    output::warn(format!(
                        "cancelling {} for {}",
                        job.scanner.name,
                        job.service.label()
                    ));
                    job.request_stop();
                }
                ControlSignal::Detach => {
                    job.silence();
                    if !job.redirect_consumer(table.sender()).await {
                        // The executor already signalled our private channel;
                        // hand the queued signal to the table so reconciliation
                        // still observes the completion.
                        if let Ok(done) = completion.try_recv() {
                            let _ = table.sender().send(done);
                        }
                    }
                    let index = table.append(Arc::clone(&job));
                    info!(job = job.id(), index, "Foreground job detached.");
                    output::warn(format!(
                        "backgrounding {} for {} as job {index}",
                        job.scanner.name,
                        job.service.label()
                    ));
                    return WatchOutcome::Detached;
                }
            }
        }
    }
}
