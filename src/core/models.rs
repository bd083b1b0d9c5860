// src/core/models.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::Mutex;

/// Transport protocol of a discovered service endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A service endpoint discovered on a lab target.
///
/// Membership in a target's service set is keyed by `(port, protocol)`; the
/// name is descriptive only and never participates in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub port: u16,
    pub protocol: Protocol,
    pub name: String,
}

impl Service {
    pub fn endpoint(&self) -> (u16, Protocol) {
        (self.port, self.protocol)
    }

    /// Operator-facing label, e.g. `80/tcp (http)`.
    pub fn label(&self) -> String {
        format!("{}/{} ({})", self.port, self.protocol, self.name)
    }
}

/// A lab machine under test.
///
/// The identity fields are a snapshot of the lab API catalogue; the service
/// set is live state, appended to by scan jobs as they discover endpoints.
pub struct Target {
    pub id: u64,
    pub name: String,
    pub addr: String,
    pub os: String,
    pub running: bool,
    services: Mutex<Vec<Service>>,
}

impl Target {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        addr: impl Into<String>,
        os: impl Into<String>,
        running: bool,
        services: Vec<Service>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            addr: addr.into(),
            os: os.into(),
            running,
            services: Mutex::new(services),
        }
    }

    /// Snapshot of the currently known services.
    pub async fn services(&self) -> Vec<Service> {
        self.services.lock().await.clone()
    }

    /// Merge newly discovered services into the set.
    ///
    /// Re-adding an already-known `(port, protocol)` endpoint is a no-op, so
    /// a re-run scan never produces duplicate rows. Returns how many entries
    /// were actually new.
    pub async fn record_services(&self, found: Vec<Service>) -> usize {
        let mut services = self.services.lock().await;
        let mut added = 0;
        for service in found {
            if services.iter().any(|s| s.endpoint() == service.endpoint()) {
                continue;
            }
            services.push(service);
            added += 1;
        }
        added
    }
}

/// How a scan job ended.
///
/// Tool failure is data, not an error: a scanner that exits non-zero or whose
/// output cannot be read completes with `Failed`, and nothing propagates
/// across the task boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The tool ran to completion.
    Finished,
    /// The job honoured a cooperative stop request before the tool was done.
    Stopped,
    /// The tool could not be run to a useful end; the payload says why.
    Failed(String),
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Finished => write!(f, "completed"),
            JobOutcome::Stopped => write!(f, "stopped early"),
            JobOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Lifecycle state of a scan job. `Running` is initial, `Completed` terminal;
/// the transition happens exactly once, when the executor task exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed(JobOutcome),
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed(outcome) => write!(f, "{outcome}"),
        }
    }
}

/// A unit of information extracted from one line of scan-tool output.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A service endpoint to merge into the target's service set.
    Discovered(Service),
    /// Progress text to surface in the job listing while the tool runs.
    Progress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_round_trips_through_strings() {
        assert_eq!("tcp".parse::<Protocol>().ok(), Some(Protocol::Tcp));
        assert_eq!(Protocol::Udp.to_string(), "udp");
    }

    #[tokio::test]
    async fn record_services_is_keyed_by_endpoint() {
        let target = Target::new(
            1,
            "box",
            "10.0.0.4",
            "linux",
            true,
            vec![Service { port: 80, protocol: Protocol::Tcp, name: "http".into() }],
        );

        let added = target
            .record_services(vec![
                Service { port: 80, protocol: Protocol::Tcp, name: "http-alt".into() },
                Service { port: 80, protocol: Protocol::Udp, name: "quic".into() },
            ])
            .await;

        assert_eq!(added, 1);
        assert_eq!(target.services().await.len(), 2);
    }
}
