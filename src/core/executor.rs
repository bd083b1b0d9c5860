// src/core/executor.rs

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::job::{CompletionSender, JobTracker};
use crate::core::models::{JobOutcome, ScanEvent, Service, Target};
use crate::core::registry::ScannerDefinition;
use crate::output;

/// How often the stop flag is polled while the tool is quiet.
const STOP_POLL: Duration = Duration::from_millis(200);
/// Grace period between asking the tool to die and reaping it unconditionally.
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Failures surfaced synchronously at job-creation time. Anything that goes
/// wrong after the tool is running becomes a `JobOutcome` instead.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{tool}: unable to launch: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// A freshly started job whose handoff gate is still closed.
///
/// The executor task is already driving the tool, but it cannot announce
/// completion until `deliver_to` registers the one consumer of the signal
/// and releases the gate.
pub struct LaunchedJob {
    job: Arc<JobTracker>,
    slot: OwnedMutexGuard<Option<CompletionSender>>,
}

impl LaunchedJob {
    /// Register the completion consumer and open the handoff gate.
    pub fn deliver_to(self, events: CompletionSender) -> Arc<JobTracker> {
        let LaunchedJob { job, mut slot } = self;
        *slot = Some(events);
        drop(slot);
        job
    }
}

/// Start `scanner` against `(target, service)` as an independent unit of work.
///
/// The external tool is spawned before any tracker state exists, so a tool
/// that cannot start (missing binary, permissions) fails synchronously with
/// `ScanError::Launch` and no job is ever created. On success the returned
/// job is `Running` with its handoff gate held by the caller.
pub async fn launch(
    target: Arc<Target>,
    service: Service,
    scanner: &'static ScannerDefinition,
    silent: bool,
    config: &Config,
) -> Result<LaunchedJob, ScanError> {
    if let Err(e) = tokio::fs::create_dir_all(config.scan_output_dir()).await {
        warn!(error = %e, "Unable to create scan artifact directory.");
    }

    let argv = (scanner.command)(&target, &service, config);
    debug!(scanner = scanner.name, ?argv, "Spawning scan tool.");

    let mut command = Command::new(&argv[0]);
    command
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    let child = command.spawn().map_err(|source| ScanError::Launch {
        tool: argv[0].clone(),
        source,
    })?;

    let job = JobTracker::new(target, service, scanner, silent);
    // Gate must be closed before the executor task exists, or a fast tool
    // could signal completion before anyone is registered to hear it.
    let slot = job.hold_handoff().await;
    let handle = tokio::spawn(run(Arc::clone(&job), child));
    job.install_handle(handle).await;

    info!(
        job = job.id(),
        scanner = scanner.name,
        target = %job.target.name,
        service = %job.service.label(),
        "Scan job started."
    );
    Ok(LaunchedJob { job, slot })
}

async fn run(job: Arc<JobTracker>, mut child: Child) {
    let outcome = drive(&job, &mut child).await;
    info!(job = job.id(), outcome = %outcome, "Scan job finished.");
    job.complete(outcome).await;
}

/// Stream the tool's stdout to completion, honouring stop requests between
/// lines and at every poll interval while the tool is quiet.
async fn drive(job: &Arc<JobTracker>, child: &mut Child) -> JobOutcome {
    let Some(stdout) = child.stdout.take() else {
        shutdown_tool(child).await;
        return JobOutcome::Failed("tool stdout unavailable".into());
    };
    let mut lines = BufReader::new(stdout).lines();
    let mut discovered: Vec<Service> = Vec::new();

    loop {
        if job.stop_requested() {
            shutdown_tool(child).await;
            return JobOutcome::Stopped;
        }
        match timeout(STOP_POLL, lines.next_line()).await {
            // Quiet tool; go around and poll the stop flag again.
            Err(_) => continue,
            Ok(Ok(None)) => break,
            Ok(Ok(Some(line))) => {
                if !job.is_silent() {
                    output::tool_line(&line);
                }
                for event in (job.scanner.parse_line)(&line) {
                    match event {
                        ScanEvent::Discovered(service) => discovered.push(service),
                        ScanEvent::Progress(text) => job.set_progress(text).await,
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(job = job.id(), error = %e, "Failed reading tool output.");
                shutdown_tool(child).await;
                return JobOutcome::Failed(format!("output read failed: {e}"));
            }
        }
    }

    match child.wait().await {
        Ok(status) if status.success() => {
            let added = job.target.record_services(discovered).await;
            if added > 0 {
                info!(job = job.id(), added, "Recorded newly discovered services.");
            }
            JobOutcome::Finished
        }
        Ok(status) => JobOutcome::Failed(format!("{} exited with {status}", job.scanner.name)),
        Err(e) => JobOutcome::Failed(format!("could not reap {}: {e}", job.scanner.name)),
    }
}

async fn shutdown_tool(child: &mut Child) {
    if child.start_kill().is_err() {
        // Already reaped.
        return;
    }
    if timeout(KILL_GRACE, child.wait()).await.is_err() {
        let _ = child.kill().await;
    }
}
