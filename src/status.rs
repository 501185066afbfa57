use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::config::ServiceDeclaration;
use crate::engine::{CommandRunner, ComposeEngine};
use crate::errors::EngineError;

/// One line of `compose ps --format json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StatusRecord {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub image: String,
    pub command: String,
    pub service: String,
    pub state: String,
    pub status: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub publishers: Vec<Publisher>,

    /// Raw PORTS column, only set by the table fallback.
    #[serde(skip)]
    pub ports_text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Publisher {
    #[serde(rename = "URL")]
    pub url: String,
    pub target_port: u16,
    pub published_port: u16,
    pub protocol: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Publisher>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Publisher>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Publisher {
    fn describe(&self) -> String {
        let url = match self.url.as_str() {
            "" | "::" => "0.0.0.0",
            other => other,
        };
        if self.published_port == 0 {
            return format!("{}/{}", self.target_port, self.protocol);
        }
        format!(
            "{}:{}->{}/{}",
            url, self.published_port, self.target_port, self.protocol
        )
    }
}

impl StatusRecord {
    fn ports(&self) -> Vec<String> {
        if let Some(text) = self.ports_text.as_ref() {
            return text
                .split(", ")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        self.publishers.iter().map(Publisher::describe).collect()
    }
}

/// Parses structured `ps` output.
///
/// Newer engines print one JSON object per line, older ones a single JSON
/// array. A line that does not parse is skipped with a warning.
pub fn parse_records(output: &str) -> Vec<StatusRecord> {
    let trimmed = output.trim();
    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<StatusRecord>>(trimmed) {
            Ok(records) => return records,
            Err(err) => warn!("Could not parse 'ps' output as a JSON array: {}", err),
        }
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<StatusRecord>(line) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("Could not parse JSON line from 'ps': {}\nLine: {}", err, line);
                None
            }
        })
        .collect()
}

const TABLE_COLUMNS: [&str; 7] = [
    "NAME", "IMAGE", "COMMAND", "SERVICE", "CREATED", "STATUS", "PORTS",
];

/// Parses the human-readable `ps` table by the offsets of its header.
///
/// Best effort only: column widths and headers vary between engine versions
/// and locales, which is why the JSON format is always tried first.
pub fn parse_table(output: &str) -> Vec<StatusRecord> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let header = match lines.next() {
        Some(h) => h,
        None => return Vec::new(),
    };

    let mut columns: Vec<(&str, usize)> = TABLE_COLUMNS
        .iter()
        .filter_map(|name| find_column(header, name).map(|offset| (*name, offset)))
        .collect();
    columns.sort_by_key(|(_, offset)| *offset);

    if !columns.iter().any(|(name, _)| *name == "SERVICE") {
        warn!("'ps' table has no SERVICE column, cannot match services");
        return Vec::new();
    }

    // Truncated cells end in a multi-byte ellipsis, so offsets are counted in
    // chars rather than bytes.
    let columns: Vec<(&str, usize)> = columns
        .into_iter()
        .map(|(name, offset)| (name, header[..offset].chars().count()))
        .collect();

    lines
        .filter_map(|line| {
            let chars: Vec<char> = line.chars().collect();
            let mut fields: HashMap<&str, String> = HashMap::new();
            for (i, (name, start)) in columns.iter().enumerate() {
                let end = columns
                    .get(i + 1)
                    .map(|(_, o)| *o)
                    .unwrap_or(chars.len())
                    .min(chars.len());
                let value: String = chars.get(*start..end).unwrap_or(&[]).iter().collect();
                fields.insert(*name, value.trim().trim_matches('"').to_string());
            }

            let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
            let service = field("SERVICE");
            if service.is_empty() {
                warn!("Skipping 'ps' table row without a service: {}", line);
                return None;
            }

            let status = field("STATUS");
            let state = if status.starts_with("Up") {
                "running".to_string()
            } else {
                status.split_whitespace().next().unwrap_or("").to_lowercase()
            };
            let ports = field("PORTS");

            Some(StatusRecord {
                name: field("NAME"),
                image: field("IMAGE"),
                command: field("COMMAND"),
                service,
                state,
                status,
                ports_text: Some(ports),
                ..StatusRecord::default()
            })
        })
        .collect()
}

// Header names are separated by at least two spaces; match whole words only.
fn find_column(header: &str, name: &str) -> Option<usize> {
    header.match_indices(name).map(|(i, _)| i).find(|&i| {
        let before = header[..i].chars().next_back();
        let after = header[i + name.len()..].chars().next();
        before.map_or(true, char::is_whitespace) && after.map_or(true, char::is_whitespace)
    })
}

/// Details of a running instance.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveInstance {
    pub id: String,
    pub name: String,
    pub image: String,
    pub command: String,
    pub state: String,
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    pub name: String,
    pub live: Option<LiveInstance>,
}

impl ServiceStatus {
    pub fn is_running(&self) -> bool {
        self.live.is_some()
    }
}

#[derive(Debug, Default)]
pub struct StatusReport {
    pub services: Vec<ServiceStatus>,
    /// Requested names that are not declared in the configuration.
    pub unknown: Vec<String>,
}

/// Joins declared services with live records by the record's service field.
///
/// With a non-empty `requested` list only those services are reported, and
/// requested names absent from the configuration are returned in `unknown`.
/// Live records for services that are not declared are ignored.
pub fn reconcile(
    configured: &BTreeMap<String, ServiceDeclaration>,
    requested: &[String],
    records: Vec<StatusRecord>,
) -> StatusReport {
    let mut live: HashMap<String, StatusRecord> = HashMap::new();
    for record in records {
        if record.service.is_empty() {
            warn!("Ignoring 'ps' record without a service name: {}", record.name);
            continue;
        }
        live.insert(record.service.clone(), record);
    }

    let mut unknown = Vec::new();
    let mut names: Vec<&String> = if requested.is_empty() {
        configured.keys().collect()
    } else {
        let mut names = Vec::new();
        for name in requested {
            match configured.get_key_value(name) {
                Some((key, _)) => names.push(key),
                None => unknown.push(name.clone()),
            }
        }
        names
    };
    names.sort();
    names.dedup();

    let services = names
        .into_iter()
        .map(|name| ServiceStatus {
            name: name.clone(),
            live: live.get(name).map(|record| LiveInstance {
                id: record.id.clone(),
                name: record.name.clone(),
                image: record.image.clone(),
                command: record.command.clone(),
                state: if record.state.is_empty() {
                    record.status.clone()
                } else {
                    record.state.clone()
                },
                ports: record.ports(),
            }),
        })
        .collect();

    StatusReport { services, unknown }
}

/// Fetches live records, JSON first, table second. Failures degrade to an
/// empty set so the configured services are still listed.
pub async fn query<R: CommandRunner>(
    compose: &ComposeEngine<'_, R>,
    services: &[String],
) -> Vec<StatusRecord> {
    let err = match compose.ps_json(services).await {
        Ok(out) => return parse_records(&out),
        Err(err) => err,
    };

    if let EngineError::Spawn { .. } = err {
        warn!("Could not query running services: {}", err);
        return Vec::new();
    }

    warn!("Structured 'ps' output unavailable ({}), parsing the table instead", err);
    match compose.ps_table(services).await {
        Ok(out) => parse_table(&out),
        Err(err) => {
            warn!("Could not query running services: {}", err);
            Vec::new()
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

pub fn render_table(statuses: &[ServiceStatus]) -> String {
    let row = |cells: [&str; 8]| {
        format!(
            "{:<16} {:<12} {:<12} {:<20} {:<24} {:<20} {:<17} {}",
            cells[0], cells[1], cells[2], cells[3], cells[4], cells[5], cells[6], cells[7]
        )
    };

    let header = row([
        "SERVICE", "STATUS", "ID", "NAME", "IMAGE", "COMMAND", "STATE", "PORTS",
    ]);
    let mut out = String::new();
    out.push_str(&header);
    out.push('\n');
    out.push_str(&"-".repeat(header.len()));
    out.push('\n');

    for status in statuses {
        let line = match status.live.as_ref() {
            Some(live) => row([
                &status.name,
                "Running",
                or_dash(&short_id(&live.id)),
                or_dash(&live.name),
                &truncate(or_dash(&live.image), 24),
                &truncate(or_dash(&live.command), 20),
                &truncate(or_dash(&live.state), 17),
                or_dash(&live.ports.join(", ")),
            ]),
            None => row([&status.name, "Not Running", "-", "-", "-", "-", "-", "-"]),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
