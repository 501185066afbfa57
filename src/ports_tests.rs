use std::net::TcpListener;

use super::ports::*;
use super::test_support::{config, RecordingProbe};

fn key(address: &str, port: u16) -> ListenKey {
    ListenKey {
        address: address.to_string(),
        port,
    }
}

#[test]
fn test_parse_mappings() {
    let cases = [
        ("8080:80", "", 8080, 80),
        ("127.0.0.1:8080:80", "127.0.0.1", 8080, 80),
        ("5353:53/udp", "", 5353, 53),
        ("[::1]:8080:80", "::1", 8080, 80),
        (" 9000:9000 ", "", 9000, 9000),
    ];
    for (entry, ip, host, container) in cases {
        let mapping = PortMapping::parse(entry).unwrap();
        assert_eq!(mapping.host_ip, ip, "{}", entry);
        assert_eq!(mapping.host_port, host, "{}", entry);
        assert_eq!(mapping.container_port, container, "{}", entry);
    }
}

#[test]
fn test_parse_malformed() {
    assert_eq!(
        PortMapping::parse("80"),
        Err(PortMappingError::SegmentCount(1))
    );
    assert_eq!(
        PortMapping::parse("a:b:c:d"),
        Err(PortMappingError::SegmentCount(4))
    );
    assert_eq!(
        PortMapping::parse("[::1:80:80"),
        Err(PortMappingError::UnterminatedAddress)
    );
    assert!(matches!(
        PortMapping::parse("http:80"),
        Err(PortMappingError::InvalidPort { which: "host", .. })
    ));
    assert!(matches!(
        PortMapping::parse("0:80"),
        Err(PortMappingError::InvalidPort { which: "host", .. })
    ));
    assert!(matches!(
        PortMapping::parse("8080:99999"),
        Err(PortMappingError::InvalidPort { which: "container", .. })
    ));
}

#[test]
fn test_listen_key_display() {
    assert_eq!(key("", 8080).to_string(), ":8080");
    assert_eq!(key("127.0.0.1", 8080).to_string(), "127.0.0.1:8080");
    assert_eq!(key("::1", 8080).to_string(), "[::1]:8080");
}

#[test]
fn test_internal_conflict_is_not_probed() {
    let config = config(
        r#"
services:
  web:
    ports: ["8080:80"]
  cache:
    ports: ["8080:6379"]
  db:
    ports: ["3306:3306"]
"#,
    );
    let probe = RecordingProbe::default();
    let report = diagnose(config.services().values(), &probe);

    let owners: Vec<&String> = report.internal[&key("", 8080)].iter().collect();
    assert_eq!(owners, vec!["cache", "web"]);
    assert_eq!(report.internal.len(), 1);

    assert_eq!(*probe.probed.lock().unwrap(), vec![key("", 3306)]);
    assert_eq!(report.host.len(), 1);
    assert_eq!(report.host[0].service, "db");
    assert!(report.has_conflicts());

    let text = render_report(&report);
    assert!(text.contains(
        "[!] Internal Conflict: Port 8080 (address: :8080) is defined by multiple services: cache, web"
    ));
    assert!(text.contains(
        "[OK] Port Available: Port 3306 (address: :3306, defined for service 'db') is available on the host."
    ));
    assert!(!text.contains("defined for service 'web'"));
}

#[test]
fn test_different_addresses_do_not_conflict() {
    let config = config(
        r#"
services:
  api:
    ports: ["127.0.0.1:8080:80"]
  web:
    ports: ["8080:80"]
"#,
    );
    let probe = RecordingProbe {
        occupied: vec![key("127.0.0.1", 8080)],
        ..RecordingProbe::default()
    };
    let report = diagnose(config.services().values(), &probe);

    assert!(report.internal.is_empty());
    assert_eq!(report.host.len(), 2);
    assert_eq!(report.host[0].service, "api");
    assert_eq!(
        report.host[0].availability,
        Availability::Occupied("in use by another application".to_string())
    );
    assert_eq!(report.host[1].availability, Availability::Available);

    let text = render_report(&report);
    assert!(text.contains("[OK] No internal port conflicts found."));
    assert!(text.contains(
        "[!] Host Conflict: Port 8080 (address: 127.0.0.1:8080, defined for service 'api') is in use by another application on the host."
    ));
}

#[test]
fn test_malformed_entries_are_reported() {
    let config = config(
        "services:\n  web:\n    ports: [\"80\", \"1:2:3:4\", \"8080:80\"]\n",
    );
    let report = diagnose(config.services().values(), &RecordingProbe::default());

    let entries: Vec<&str> = report.malformed.iter().map(|m| m.entry.as_str()).collect();
    assert_eq!(entries, vec!["80", "1:2:3:4"]);
    assert_eq!(report.host.len(), 1);
    assert_eq!(report.host[0].key, key("", 8080));
    assert!(!report.has_conflicts());

    let text = render_report(&report);
    assert!(text.contains("[?] Skipped: '80' of service 'web'"));
    assert!(text.contains("[?] Skipped: '1:2:3:4' of service 'web'"));
}

#[test]
fn test_no_ports() {
    let config = config("services:\n  web:\n    image: nginx\n");
    let report = diagnose(config.services().values(), &RecordingProbe::default());
    assert!(!report.has_conflicts());
    assert!(render_report(&report).contains("No ports to check."));
}

#[test]
fn test_tcp_probe_occupied() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    match TcpProbe.probe(&key("127.0.0.1", port)) {
        Availability::Occupied(reason) => assert_eq!(reason, "in use by another application"),
        Availability::Available => panic!("Expected port {} to be occupied", port),
    }
}

#[test]
fn test_tcp_probe_available() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    assert_eq!(TcpProbe.probe(&key("127.0.0.1", port)), Availability::Available);
}

#[test]
fn test_loopback_mapping_available() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = config(&format!(
        "services:\n  api:\n    ports: [\"127.0.0.1:{}:9000\"]\n",
        port
    ));
    let report = diagnose(config.services().values(), &TcpProbe);

    assert!(report.internal.is_empty());
    assert_eq!(report.host.len(), 1);
    assert_eq!(report.host[0].key, key("127.0.0.1", port));
    assert_eq!(report.host[0].availability, Availability::Available);
}

#[test]
fn test_explicit_wildcard_conflicts_with_omitted_address() {
    let config = config(
        r#"
services:
  web:
    ports: ["8080:80"]
  cache:
    ports: ["0.0.0.0:8080:6379"]
  dns:
    ports: ["[::]:5353:53/udp"]
"#,
    );
    let probe = RecordingProbe::default();
    let report = diagnose(config.services().values(), &probe);

    let owners: Vec<&String> = report.internal[&key("", 8080)].iter().collect();
    assert_eq!(owners, vec!["cache", "web"]);
    assert_eq!(*probe.probed.lock().unwrap(), vec![key("", 5353)]);
    assert!(render_report(&report).contains(
        "[!] Internal Conflict: Port 8080 (address: :8080) is defined by multiple services: cache, web"
    ));
}

#[test]
fn test_diagnose_held_port() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = config(&format!(
        "services:\n  api:\n    ports: [\"127.0.0.1:{}:9000\"]\n",
        port
    ));
    let report = diagnose(config.services().values(), &TcpProbe);

    assert_eq!(report.host.len(), 1);
    assert_eq!(
        report.host[0].availability,
        Availability::Occupied("in use by another application".to_string())
    );
    assert!(report.has_conflicts());
    drop(listener);
}
