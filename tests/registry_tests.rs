// Selection-policy tests against a purpose-built catalogue, plus a few
// checks of the built-in one.

use foothold::config::Config;
use foothold::core::models::{Protocol, ScanEvent, Service, Target};
use foothold::core::registry::{self, ScannerDefinition, select_from};

fn tool_command(_t: &Target, _s: &Service, _c: &Config) -> Vec<String> {
    vec!["true".into()]
}

fn no_events(_line: &str) -> Vec<ScanEvent> {
    Vec::new()
}

static CATALOGUE: &[ScannerDefinition] = &[
    ScannerDefinition {
        name: "s1",
        recommended: true,
        ports: &[80],
        protocols: &[Protocol::Tcp],
        service_pattern: None,
        command: tool_command,
        parse_line: no_events,
    },
    ScannerDefinition {
        name: "s2",
        recommended: false,
        ports: &[80],
        protocols: &[Protocol::Tcp],
        service_pattern: None,
        command: tool_command,
        parse_line: no_events,
    },
    ScannerDefinition {
        name: "udp-only",
        recommended: true,
        ports: &[161],
        protocols: &[Protocol::Udp],
        service_pattern: None,
        command: tool_command,
        parse_line: no_events,
    },
];

fn service(port: u16, protocol: Protocol, name: &str) -> Service {
    Service { port, protocol, name: name.to_string() }
}

#[test]
fn recommended_only_yields_only_recommended_matches() {
    let services = [service(80, Protocol::Tcp, "http")];
    let selected = select_from(CATALOGUE, &services, None, true);
    let names: Vec<_> = selected.iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["s1"]);
}

#[test]
fn unfiltered_selection_includes_unrecommended_scanners() {
    let services = [service(80, Protocol::Tcp, "http")];
    let names: Vec<_> = select_from(CATALOGUE, &services, None, false)
        .iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["s1", "s2"]);
}

#[test]
fn name_filter_intersects_with_service_match() {
    let services = [service(80, Protocol::Tcp, "http")];
    // Name matches but no applicable service: empty, a user error upstream.
    assert!(select_from(CATALOGUE, &services, Some("udp-only"), false).is_empty());

    let snmp = [service(161, Protocol::Udp, "snmp")];
    let selected = select_from(CATALOGUE, &snmp, Some("udp-only"), false);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].name, "udp-only");
}

#[test]
fn protocol_gates_the_port_match() {
    let wrong_protocol = [service(80, Protocol::Udp, "http")];
    assert!(select_from(CATALOGUE, &wrong_protocol, None, false).is_empty());
}

#[test]
fn builtin_catalogue_matches_web_services_by_name_regex() {
    // Non-standard port, recognizably-web service name.
    let services = [service(3000, Protocol::Tcp, "http-proxy")];
    let names: Vec<_> = registry::applicable(&services, None, false)
        .iter()
        .map(|s| s.name)
        .collect();
    assert!(names.contains(&"gobuster"));
    assert!(names.contains(&"nikto"));
}

#[test]
fn builtin_catalogue_is_never_mutated_by_selection() {
    let before = registry::SCANNERS.len();
    let services = [service(80, Protocol::Tcp, "http")];
    let _ = registry::applicable(&services, None, false);
    let _ = registry::applicable(&services, Some("gobuster"), true);
    assert_eq!(registry::SCANNERS.len(), before);
}
