// src/core/registry.rs

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::core::models::{Protocol, ScanEvent, Service, Target};

/// A named external reconnaissance tool plus its applicability predicates.
///
/// Definitions are static data: the catalogue is fixed at compile time and
/// never mutated, so unsynchronized concurrent reads are safe.
pub struct ScannerDefinition {
    pub name: &'static str,
    /// Part of the default set run by `--recommended`.
    pub recommended: bool,
    /// Well-known ports this scanner applies to.
    pub ports: &'static [u16],
    pub protocols: &'static [Protocol],
    /// Fallback match on the service name when the port is not well known.
    pub service_pattern: Option<&'static Lazy<Regex>>,
    /// Builds the argv used to invoke the external tool.
    pub command: fn(&Target, &Service, &Config) -> Vec<String>,
    /// Extracts service discoveries and progress text from one output line.
    pub parse_line: fn(&str) -> Vec<ScanEvent>,
}

impl ScannerDefinition {
    /// Whether this scanner applies to a single service.
    pub fn matches_service(&self, service: &Service) -> bool {
        self.protocols.contains(&service.protocol)
            && (self.ports.contains(&service.port)
                || self
                    .service_pattern
                    .is_some_and(|re| re.is_match(&service.name)))
    }

    /// Whether this scanner applies to any of the given services.
    pub fn matches_any(&self, services: &[Service]) -> bool {
        services.iter().any(|service| self.matches_service(service))
    }
}

static RE_ANY_SERVICE: Lazy<Regex> = Lazy::new(|| Regex::new(r".*").unwrap());
static RE_WEB_SERVICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(http|web)").unwrap());

const WEB_PORTS: &[u16] = &[80, 443, 8080, 8443, 8888];
const TLS_WEB_PORTS: &[u16] = &[443, 8443];

/// The built-in scanner catalogue, populated at compile time.
pub static SCANNERS: &[ScannerDefinition] = &[
    ScannerDefinition {
        name: "nmap-sv",
        recommended: true,
        ports: &[],
        protocols: &[Protocol::Tcp, Protocol::Udp],
        service_pattern: Some(&RE_ANY_SERVICE),
        command: nmap_command,
        parse_line: nmap_parse,
    },
    ScannerDefinition {
        name: "gobuster",
        recommended: true,
        ports: WEB_PORTS,
        protocols: &[Protocol::Tcp],
        service_pattern: Some(&RE_WEB_SERVICE),
        command: gobuster_command,
        parse_line: gobuster_parse,
    },
    ScannerDefinition {
        name: "nikto",
        recommended: false,
        ports: WEB_PORTS,
        protocols: &[Protocol::Tcp],
        service_pattern: Some(&RE_WEB_SERVICE),
        command: nikto_command,
        parse_line: no_events,
    },
    ScannerDefinition {
        name: "onesixtyone",
        recommended: true,
        ports: &[161],
        protocols: &[Protocol::Udp],
        service_pattern: None,
        command: onesixtyone_command,
        parse_line: no_events,
    },
];

/// Select the scanners from the built-in catalogue that apply to at least one
/// of the given services.
///
/// # Arguments
///
/// * `services` - The candidate services, already narrowed by the caller.
/// * `name_filter` - Restrict the selection to a single scanner by name.
/// * `recommended_only` - Intersect with the recommended set.
pub fn applicable(
    services: &[Service],
    name_filter: Option<&str>,
    recommended_only: bool,
) -> Vec<&'static ScannerDefinition> {
    select_from(SCANNERS, services, name_filter, recommended_only)
}

/// Selection over an explicit catalogue. `applicable` is the `SCANNERS`
/// shorthand; this form exists so alternate catalogues can be filtered with
/// the same policy.
pub fn select_from(
    catalogue: &'static [ScannerDefinition],
    services: &[Service],
    name_filter: Option<&str>,
    recommended_only: bool,
) -> Vec<&'static ScannerDefinition> {
    catalogue
        .iter()
        .filter(|scanner| !recommended_only || scanner.recommended)
        .filter(|scanner| name_filter.is_none_or(|name| scanner.name == name))
        .filter(|scanner| scanner.matches_any(services))
        .collect()
}

// --- COMMAND BUILDERS ---

fn nmap_command(target: &Target, service: &Service, _config: &Config) -> Vec<String> {
    let mut argv = vec!["nmap".to_string(), "-sV".into(), "-Pn".into()];
    if service.protocol == Protocol::Udp {
        argv.push("-sU".into());
    }
    argv.extend([
        "-p".into(),
        service.port.to_string(),
        "-oG".into(),
        "-".into(),
        target.addr.clone(),
    ]);
    argv
}

fn gobuster_command(target: &Target, service: &Service, config: &Config) -> Vec<String> {
    let scheme = if TLS_WEB_PORTS.contains(&service.port) { "https" } else { "http" };
    let artifact = config
        .scan_output_dir()
        .join(format!("gobuster-{}-{}.txt", target.name, service.port));
    vec![
        "gobuster".into(),
        "dir".into(),
        "-w".into(),
        config.gobuster_wordlist.clone(),
        "-f".into(),
        "-k".into(),
        "-o".into(),
        artifact.to_string_lossy().into_owned(),
        "-u".into(),
        format!("{scheme}://{}:{}", target.addr, service.port),
    ]
}

fn nikto_command(target: &Target, service: &Service, _config: &Config) -> Vec<String> {
    let mut argv = vec![
        "nikto".to_string(),
        "-host".into(),
        target.addr.clone(),
        "-port".into(),
        service.port.to_string(),
    ];
    if TLS_WEB_PORTS.contains(&service.port) {
        argv.push("-ssl".into());
    }
    argv
}

fn onesixtyone_command(target: &Target, _service: &Service, _config: &Config) -> Vec<String> {
    vec!["onesixtyone".to_string(), target.addr.clone()]
}

// --- OUTPUT PARSERS ---

/// Parse one line of nmap greppable (`-oG -`) output.
///
/// Port entries look like `80/open/tcp//http//nginx/`; only `open` entries
/// become service discoveries.
fn nmap_parse(line: &str) -> Vec<ScanEvent> {
    let Some(ports) = line.split("Ports:").nth(1) else {
        return Vec::new();
    };
    ports
        .split(',')
        .filter_map(|entry| {
            let fields: Vec<&str> = entry.trim().split('/').collect();
            if fields.len() < 5 || fields[1] != "open" {
                return None;
            }
            let port = fields[0].parse().ok()?;
            let protocol = fields[2].parse().ok()?;
            Some(ScanEvent::Discovered(Service {
                port,
                protocol,
                name: fields[4].to_string(),
            }))
        })
        .collect()
}

/// Gobuster interleaves `Progress: …` status lines with its findings; the
/// findings themselves land in the artifact file, so only progress is lifted.
fn gobuster_parse(line: &str) -> Vec<ScanEvent> {
    line.split("Progress:")
        .nth(1)
        .map(|rest| ScanEvent::Progress(rest.trim().to_string()))
        .into_iter()
        .collect()
}

fn no_events(_line: &str) -> Vec<ScanEvent> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(port: u16, protocol: Protocol, name: &str) -> Service {
        Service { port, protocol, name: name.to_string() }
    }

    #[test]
    fn nmap_parse_reads_greppable_output() {
        let line = "Host: 10.10.10.5 ()\tPorts: 22/open/tcp//ssh//OpenSSH 8.2/, \
                    80/open/tcp//http//nginx/, 53/closed/udp//domain///\tIgnored State: filtered (997)";
        let events = nmap_parse(line);
        assert_eq!(events.len(), 2);
        let ScanEvent::Discovered(first) = &events[0] else {
            panic!("expected a discovery");
        };
        assert_eq!(first.endpoint(), (22, Protocol::Tcp));
        assert_eq!(first.name, "ssh");
    }

    #[test]
    fn nmap_parse_ignores_unrelated_lines() {
        assert!(nmap_parse("# Nmap 7.94 scan initiated").is_empty());
    }

    #[test]
    fn gobuster_parse_lifts_progress_text() {
        let events = gobuster_parse("Progress: 1234 / 4614 (26.75%)");
        assert!(matches!(&events[0], ScanEvent::Progress(p) if p == "1234 / 4614 (26.75%)"));
        assert!(gobuster_parse("/admin (Status: 301)").is_empty());
    }

    #[test]
    fn web_scanners_match_by_port_or_name() {
        let gobuster = SCANNERS.iter().find(|s| s.name == "gobuster").unwrap();
        assert!(gobuster.matches_service(&service(8080, Protocol::Tcp, "unknown")));
        assert!(gobuster.matches_service(&service(3000, Protocol::Tcp, "http-proxy")));
        assert!(!gobuster.matches_service(&service(22, Protocol::Tcp, "ssh")));
        assert!(!gobuster.matches_service(&service(80, Protocol::Udp, "http")));
    }

    #[test]
    fn name_filter_narrows_to_a_single_scanner() {
        let services = [service(80, Protocol::Tcp, "http")];
        let selected = applicable(&services, Some("nikto"), false);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "nikto");
    }

    #[test]
    fn recommended_only_excludes_optional_scanners() {
        let services = [service(80, Protocol::Tcp, "http")];
        let selected = applicable(&services, None, true);
        assert!(selected.iter().all(|s| s.recommended));
        assert!(!selected.iter().any(|s| s.name == "nikto"));
    }

    #[test]
    fn no_services_means_no_scanners() {
        assert!(applicable(&[], None, false).is_empty());
    }
}
