// src/console/mod.rs

pub mod render;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use color_eyre::eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};

use crate::api::{LabClient, TargetAction};
use crate::config::Config;
use crate::core::executor::{self, LaunchedJob};
use crate::core::models::{JobOutcome, JobStatus, Protocol, Target};
use crate::core::monitor::{self, ControlSignal, WatchOutcome};
use crate::core::registry;
use crate::core::table::JobTable;
use crate::output;

/// The interactive operator console: a session cache of lab targets, the
/// background job table, and the command loop that drives both.
pub struct Console {
    config: Config,
    client: LabClient,
    targets: Vec<Arc<Target>>,
    table: JobTable,
}

impl Console {
    pub async fn new(config: Config) -> Result<Self> {
        let client = LabClient::new(&config)?;
        let mut console = Self {
            config,
            client,
            targets: Vec::new(),
            table: JobTable::new(),
        };
        console.refresh_targets().await?;
        Ok(console)
    }

    pub async fn has_live_jobs(&self) -> bool {
        self.table.has_live().await
    }

    /// Drain outstanding jobs at exit; see `JobTable::shutdown` for the
    /// two-strike interrupt policy.
    pub async fn drain_jobs(&mut self, interrupts: &mut UnboundedReceiver<()>) {
        self.table.shutdown(interrupts).await;
    }

    async fn refresh_targets(&mut self) -> Result<()> {
        let records = self.client.targets().await?;
        info!(count = records.len(), "Refreshed target catalogue.");
        self.targets = records
            .into_iter()
            .map(|r| Arc::new(Target::new(r.id, r.name, r.ip, r.os, r.running, r.services)))
            .collect();
        Ok(())
    }

    /// The interactive command loop. Returns on `quit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print_prompt();
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if self.dispatch(line).await {
                break;
            }
        }
        Ok(())
    }

    /// Run one operator command. Returns `true` when the console should quit.
    /// Command failures are reported to the operator, never propagated; a
    /// malformed scan or a failed request must not kill the command loop.
    pub async fn dispatch(&mut self, line: &str) -> bool {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let result = match tokens.as_slice() {
            [] => Ok(()),
            ["quit"] | ["exit"] => return true,
            ["help"] => {
                print_help();
                Ok(())
            }
            ["refresh"] => self.refresh_targets().await,
            ["target", rest @ ..] => self.cmd_target(rest).await,
            ["jobs", rest @ ..] => self.cmd_jobs(rest).await,
            ["lab", rest @ ..] => self.cmd_lab(rest).await,
            [other, ..] => {
                output::error(format!("{other}: unknown command (try \"help\")"));
                Ok(())
            }
        };
        if let Err(e) = result {
            output::error(format!("request failed: {e}"));
        }
        false
    }

    // --- TARGET COMMANDS ---

    async fn cmd_target(&mut self, args: &[&str]) -> Result<()> {
        match args {
            [] | ["list"] => {
                println!("{}", render::target_table(&self.targets));
                Ok(())
            }
            ["info", name] => self.target_info(name).await,
            ["start", name] => self.target_state(name, TargetAction::Start).await,
            ["stop", name] => self.target_state(name, TargetAction::Stop).await,
            ["reset", name] => self.target_state(name, TargetAction::Reset).await,
            ["scan", rest @ ..] => self.target_scan(rest).await,
            _ => {
                output::error("usage: target [list|info|start|stop|reset|scan] ...");
                Ok(())
            }
        }
    }

    async fn target_info(&self, name: &str) -> Result<()> {
        let Some(target) = self.find_target(name) else {
            output::error(format!("{name}: no such target"));
            return Ok(());
        };
        let state = if target.running { "up" } else { "off" };
        println!(
            "{} - {} - {} - {state}",
            target.name.clone().bold().green(),
            target.addr,
            target.os
        );
        let services = target.services().await;
        if services.is_empty() {
            println!("{}", "No enumerated services.".bold());
        } else {
            println!("{}", render::service_table(&services));
        }
        Ok(())
    }

    async fn target_state(&self, name: &str, action: TargetAction) -> Result<()> {
        let Some(target) = self.find_target(name) else {
            output::error(format!("{name}: no such target"));
            return Ok(());
        };
        match action {
            TargetAction::Start if target.running => {
                output::info(format!("{}: already running", target.name));
                return Ok(());
            }
            TargetAction::Stop | TargetAction::Reset if !target.running => {
                output::info(format!("{}: not running", target.name));
                return Ok(());
            }
            _ => {}
        }
        self.client.set_target_state(target.id, action).await?;
        output::success(format!("{}: scheduled {action}", target.name));
        Ok(())
    }

    async fn target_scan(&mut self, args: &[&str]) -> Result<()> {
        let Some(request) = ScanRequest::parse(args) else {
            return Ok(());
        };
        let Some(target) = self.find_target(request.target) else {
            output::error(format!("{}: no such target", request.target));
            return Ok(());
        };

        let mut services = target.services().await;
        if let Some(spec) = request.service {
            let Some((port, protocol)) = parse_service_spec(spec) else {
                output::error(format!("{spec}: expected PORT/PROTOCOL"));
                return Ok(());
            };
            services.retain(|s| s.endpoint() == (port, protocol));
        }
        if services.is_empty() {
            output::error("no matching services found");
            return Ok(());
        }

        let scanners = registry::applicable(&services, request.scanner, request.recommended);
        if scanners.is_empty() {
            output::error("no matching scanners found");
            return Ok(());
        }

        // No deduplication of identical (target, service, scanner) triples:
        // re-submitting a scan that is already in flight is the operator's
        // call to make.
        for service in &services {
            for &scanner in &scanners {
                if !scanner.matches_service(service) {
                    continue;
                }
                output::info(format!(
                    "beginning {} scan on {}",
                    scanner.name,
                    service.label()
                ));
                let launched = match executor::launch(
                    Arc::clone(&target),
                    service.clone(),
                    scanner,
                    request.background,
                    &self.config,
                )
                .await
                {
                    Ok(launched) => launched,
                    Err(e) => {
                        warn!(scanner = scanner.name, error = %e, "Scan launch failed.");
                        output::error(e.to_string());
                        continue;
                    }
                };
                if request.background {
                    let job = launched.deliver_to(self.table.sender());
                    let index = self.table.append(job);
                    output::info(format!("job {index} running in the background"));
                } else {
                    self.watch_foreground(launched).await?;
                }
            }
        }
        Ok(())
    }

    /// Watch one just-launched job in the foreground. Raw mode is enabled for
    /// the duration so Ctrl-Z (detach) and Ctrl-C (cancel) arrive as key
    /// events on the control channel instead of process signals.
    async fn watch_foreground(&mut self, launched: LaunchedJob) -> Result<()> {
        let (events, completion) = mpsc::unbounded_channel();
        let job = launched.deliver_to(events);

        output::info("ctrl-z to background, ctrl-c to cancel");
        terminal::enable_raw_mode()?;
        let watching = Arc::new(AtomicBool::new(true));
        let mut controls = spawn_control_reader(Arc::clone(&watching));

        let outcome =
            monitor::watch(Arc::clone(&job), completion, &mut controls, &mut self.table).await;

        watching.store(false, Ordering::Relaxed);
        terminal::disable_raw_mode()?;

        if outcome == WatchOutcome::Completed {
            let elapsed = render::format_elapsed(Utc::now() - job.started());
            match job.status().await {
                JobStatus::Completed(JobOutcome::Finished) => {
                    output::success(format!("{}: completed in {elapsed}", job.scanner.name));
                }
                JobStatus::Completed(JobOutcome::Stopped) => {
                    output::warn(format!("{}: stopped early", job.scanner.name));
                }
                JobStatus::Completed(JobOutcome::Failed(reason)) => {
                    output::error(format!("{}: {reason}", job.scanner.name));
                }
                JobStatus::Running => {}
            }
        }
        Ok(())
    }

    // --- JOB COMMANDS ---

    async fn cmd_jobs(&mut self, args: &[&str]) -> Result<()> {
        match args {
            [] | ["list"] => {
                let rows = self.table.list().await;
                if rows.is_empty() {
                    output::info("no jobs");
                } else {
                    println!("{}", render::job_table(&rows));
                }
                Ok(())
            }
            ["kill", index] => {
                let Ok(index) = index.parse::<usize>() else {
                    output::error(format!("{index}: expected a job index"));
                    return Ok(());
                };
                match self.table.cancel(index).await {
                    Ok(()) => output::info(format!("killing job {index}")),
                    Err(e) => output::error(e.to_string()),
                }
                Ok(())
            }
            _ => {
                output::error("usage: jobs [list|kill INDEX]");
                Ok(())
            }
        }
    }

    // --- LAB COMMANDS ---

    async fn cmd_lab(&self, args: &[&str]) -> Result<()> {
        match args {
            [] | ["status"] => {
                let lab = self.client.lab_status().await?;
                println!(
                    "{} {} ({}:{})",
                    "Server:".bold(),
                    lab.name.clone().cyan(),
                    lab.hostname,
                    lab.port
                );
                if lab.connected {
                    println!("{} {}", "Status:".bold(), "Connected".green());
                    if let Some(ipv4) = &lab.ipv4 {
                        println!("{} {ipv4}", "IPv4 Address:".bold());
                    }
                    if let Some(ipv6) = &lab.ipv6 {
                        println!("{} {ipv6}", "IPv6 Address:".bold());
                    }
                } else {
                    println!("{} {}", "Status:".bold(), "Disconnected".red());
                }
                Ok(())
            }
            ["config"] => {
                let profile = self.client.vpn_config().await?;
                println!("{profile}");
                Ok(())
            }
            _ => {
                output::error("usage: lab [status|config]");
                Ok(())
            }
        }
    }

    /// Look a target up by name (case-insensitive) or numeric id.
    fn find_target(&self, name: &str) -> Option<Arc<Target>> {
        let id: Option<u64> = name.parse().ok();
        self.targets
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name) || Some(t.id) == id)
            .cloned()
    }
}

/// Parsed arguments of `target scan`.
struct ScanRequest<'a> {
    target: &'a str,
    service: Option<&'a str>,
    scanner: Option<&'a str>,
    recommended: bool,
    background: bool,
}

impl<'a> ScanRequest<'a> {
    /// Reports usage errors itself and returns `None` for them.
    fn parse(args: &[&'a str]) -> Option<Self> {
        let mut target = None;
        let mut service = None;
        let mut scanner = None;
        let mut recommended = false;
        let mut background = false;

        let mut it = args.iter();
        while let Some(&arg) = it.next() {
            match arg {
                "--service" | "-v" => service = it.next().copied(),
                "--scanner" | "-s" => scanner = it.next().copied(),
                "--recommended" | "-r" => recommended = true,
                "--background" | "-b" => background = true,
                other if target.is_none() && !other.starts_with('-') => target = Some(other),
                other => {
                    output::error(format!("{other}: unexpected argument"));
                    return None;
                }
            }
        }

        let Some(target) = target else {
            output::error(
                "usage: target scan NAME [--service PORT/PROTO] [--scanner NAME] \
                 [--recommended] [--background]",
            );
            return None;
        };
        Some(Self { target, service, scanner, recommended, background })
    }
}

/// Parse an operator service spec like `80/tcp`.
fn parse_service_spec(spec: &str) -> Option<(u16, Protocol)> {
    let (port, protocol) = spec.split_once('/')?;
    Some((port.parse().ok()?, protocol.parse().ok()?))
}

fn print_prompt() {
    use std::io::Write;
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "{} {} ", "lab".cyan(), "➜".green().bold());
    let _ = stdout.flush();
}

fn print_help() {
    println!("target list                         list lab targets");
    println!("target info NAME                    show a target and its services");
    println!("target start|stop|reset NAME        control a target");
    println!("target scan NAME [-v PORT/PROTO] [-s SCANNER] [-r] [-b]");
    println!("                                    launch scans, -b for background");
    println!("jobs [list]                         list background scan jobs");
    println!("jobs kill INDEX                     request cancellation of a job");
    println!("lab [status]                        show lab session status");
    println!("lab config                          print the OpenVPN profile");
    println!("refresh                             re-fetch the target catalogue");
    println!("quit                                leave (draining running jobs)");
}

/// Read control keys while a foreground job is being watched and push them
/// onto an explicit channel for the monitor to consume at its suspension
/// point. The reader polls so it can notice when the watch has ended.
fn spawn_control_reader(watching: Arc<AtomicBool>) -> UnboundedReceiver<ControlSignal> {
    let (events, receiver) = mpsc::unbounded_channel();
    tokio::task::spawn_blocking(move || {
        while watching.load(Ordering::Relaxed) {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => {
                    let Ok(Event::Key(key)) = event::read() else {
                        continue;
                    };
                    if key.kind != KeyEventKind::Press
                        || !key.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        continue;
                    }
                    let signal = match key.code {
                        KeyCode::Char('z') => ControlSignal::Detach,
                        KeyCode::Char('c') => ControlSignal::Interrupt,
                        _ => continue,
                    };
                    if events.send(signal).is_err() {
                        break;
                    }
                }
                Ok(false) => {}
                Err(_) => break,
            }
        }
    });
    receiver
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_specs_parse_port_and_protocol() {
        assert_eq!(parse_service_spec("80/tcp"), Some((80, Protocol::Tcp)));
        assert_eq!(parse_service_spec("161/udp"), Some((161, Protocol::Udp)));
        assert_eq!(parse_service_spec("80"), None);
        assert_eq!(parse_service_spec("eighty/tcp"), None);
        assert_eq!(parse_service_spec("80/icmp"), None);
    }

    #[test]
    fn scan_requests_accept_flags_in_any_order() {
        let request =
            ScanRequest::parse(&["-b", "sandbox", "--service", "80/tcp", "-r"]).unwrap();
        assert_eq!(request.target, "sandbox");
        assert_eq!(request.service, Some("80/tcp"));
        assert!(request.recommended);
        assert!(request.background);
        assert!(request.scanner.is_none());
    }

    #[test]
    fn scan_requests_require_a_target() {
        assert!(ScanRequest::parse(&["--recommended"]).is_none());
    }
}
