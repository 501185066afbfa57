use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::ErrorKind;
use std::net::TcpListener;
use thiserror::Error;

use crate::config::ServiceDeclaration;

/// A parsed `[host_ip:]host_port:container_port[/protocol]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// Empty means all interfaces.
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortMappingError {
    #[error("expected [host_ip:]host_port:container_port, found {0} segment(s)")]
    SegmentCount(usize),

    #[error("invalid {which} port '{value}'")]
    InvalidPort { which: &'static str, value: String },

    #[error("unterminated IPv6 address")]
    UnterminatedAddress,
}

fn parse_port(which: &'static str, value: &str) -> Result<u16, PortMappingError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(PortMappingError::InvalidPort {
            which,
            value: value.to_string(),
        }),
    }
}

impl PortMapping {
    pub fn parse(entry: &str) -> Result<Self, PortMappingError> {
        let entry = entry.trim();

        // A bracketed IPv6 address contains colons of its own.
        let (host_ip, rest) = match entry.strip_prefix('[') {
            Some(stripped) => {
                let end = stripped
                    .find(']')
                    .ok_or(PortMappingError::UnterminatedAddress)?;
                let rest = stripped[end + 1..]
                    .strip_prefix(':')
                    .ok_or(PortMappingError::SegmentCount(1))?;
                (Some(stripped[..end].to_string()), rest)
            }
            None => (None, entry),
        };

        let segments: Vec<&str> = rest.split(':').collect();
        let (host_ip, host, container) = match (host_ip, segments.as_slice()) {
            (Some(ip), [host, container]) => (ip, *host, *container),
            (None, [host, container]) => (String::new(), *host, *container),
            (None, [ip, host, container]) => (ip.to_string(), *host, *container),
            (Some(_), other) => return Err(PortMappingError::SegmentCount(other.len() + 1)),
            (None, other) => return Err(PortMappingError::SegmentCount(other.len())),
        };

        let container = container.split('/').next().unwrap_or(container);

        Ok(PortMapping {
            host_ip,
            host_port: parse_port("host", host)?,
            container_port: parse_port("container", container)?,
        })
    }

    /// Explicit wildcard addresses share the key of an omitted address, so
    /// `8080:80` and `0.0.0.0:8080:80` claim the same listen address.
    pub fn key(&self) -> ListenKey {
        let address = match self.host_ip.as_str() {
            "0.0.0.0" | "::" => String::new(),
            ip => ip.to_string(),
        };
        ListenKey {
            address,
            port: self.host_port,
        }
    }
}

/// The address a published port binds on the host. An empty address is the
/// wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenKey {
    pub address: String,
    pub port: u16,
}

impl ListenKey {
    fn bind_address(&self) -> &str {
        if self.address.is_empty() {
            "0.0.0.0"
        } else {
            &self.address
        }
    }
}

impl fmt::Display for ListenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// Could not bind; carries a human-readable reason.
    Occupied(String),
}

/// Checks whether the host lets us listen on an address.
pub trait HostProbe {
    fn probe(&self, key: &ListenKey) -> Availability;
}

/// Binds a TCP listener and drops it straight away.
///
/// The answer is only true for the instant of the check: another process
/// may take the port before the compose engine binds it.
pub struct TcpProbe;

impl HostProbe for TcpProbe {
    fn probe(&self, key: &ListenKey) -> Availability {
        match TcpListener::bind((key.bind_address(), key.port)) {
            Ok(listener) => {
                drop(listener);
                Availability::Available
            }
            Err(err) => Availability::Occupied(match err.kind() {
                ErrorKind::AddrInUse => "in use by another application".to_string(),
                ErrorKind::PermissionDenied => "not bindable (permission denied)".to_string(),
                ErrorKind::AddrNotAvailable => "not bindable (address not available)".to_string(),
                _ => format!("not bindable ({})", err),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedPort {
    pub service: String,
    pub entry: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFinding {
    pub key: ListenKey,
    pub service: String,
    pub availability: Availability,
}

#[derive(Debug, Default)]
pub struct PortConflictReport {
    /// Keys claimed by more than one service. Never probed.
    pub internal: BTreeMap<ListenKey, BTreeSet<String>>,
    /// Probe results for every other key, ordered by service then key.
    pub host: Vec<HostFinding>,
    pub malformed: Vec<MalformedPort>,
}

impl PortConflictReport {
    pub fn has_conflicts(&self) -> bool {
        !self.internal.is_empty()
            || self
                .host
                .iter()
                .any(|f| f.availability != Availability::Available)
    }
}

/// Groups the declared host ports by listen address, reports addresses
/// claimed by several services and probes the host for the rest.
pub fn diagnose<'a, I, P>(services: I, probe: &P) -> PortConflictReport
where
    I: IntoIterator<Item = &'a ServiceDeclaration>,
    P: HostProbe + ?Sized,
{
    let mut report = PortConflictReport::default();
    let mut claims: BTreeMap<ListenKey, BTreeSet<String>> = BTreeMap::new();

    for service in services {
        for entry in &service.ports {
            match PortMapping::parse(entry) {
                Ok(mapping) => {
                    debug!(
                        "Service '{}' publishes {} -> {}",
                        service.name,
                        mapping.key(),
                        mapping.container_port
                    );
                    claims
                        .entry(mapping.key())
                        .or_default()
                        .insert(service.name.clone());
                }
                Err(err) => {
                    warn!(
                        "Skipping port mapping '{}' of service '{}': {}",
                        entry, service.name, err
                    );
                    report.malformed.push(MalformedPort {
                        service: service.name.clone(),
                        entry: entry.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    for (key, owners) in claims {
        if owners.len() > 1 {
            report.internal.insert(key, owners);
            continue;
        }
        if let Some(service) = owners.into_iter().next() {
            let availability = probe.probe(&key);
            report.host.push(HostFinding {
                key,
                service,
                availability,
            });
        }
    }

    report
        .host
        .sort_by(|a, b| (&a.service, &a.key).cmp(&(&b.service, &b.key)));
    report
}

/// The doctor's port section.
pub fn render_report(report: &PortConflictReport) -> String {
    let mut out = String::new();
    let mut line = |s: String| {
        out.push_str(&s);
        out.push('\n');
    };

    line("Checking for internal port conflicts within the configuration...".to_string());
    if report.internal.is_empty() {
        line("[OK] No internal port conflicts found.".to_string());
    }
    for (key, owners) in &report.internal {
        line(format!(
            "[!] Internal Conflict: Port {} (address: {}) is defined by multiple services: {}",
            key.port,
            key,
            owners.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    for bad in &report.malformed {
        line(format!(
            "[?] Skipped: '{}' of service '{}' ({})",
            bad.entry, bad.service, bad.reason
        ));
    }

    line("Checking unique service ports against host activity...".to_string());
    if report.host.is_empty() {
        line("No ports to check.".to_string());
    }
    for finding in &report.host {
        line(match &finding.availability {
            Availability::Available => format!(
                "[OK] Port Available: Port {} (address: {}, defined for service '{}') is available on the host.",
                finding.key.port, finding.key, finding.service
            ),
            Availability::Occupied(reason) => format!(
                "[!] Host Conflict: Port {} (address: {}, defined for service '{}') is {} on the host.",
                finding.key.port, finding.key, finding.service, reason
            ),
        });
    }

    out
}
