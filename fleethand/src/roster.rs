//! Flat-text server roster parsing
//!
//! One entry per line: `ID<SEP>HOST<SEP>USER<SEP>PASS[<SEP>PORT]`, where
//! `<SEP>` is the first matching delimiter from the priority list. A first
//! line whose id field starts with `#` is a tunnel directive, not a server.

use std::path::Path;

use secrecy::SecretString;

use crate::errors::FleetError;
use crate::filesys::File;

/// Field separators, tried in this priority order. The four/three/two-dash
/// variants come before the wide-dash variants, longest first, so a shorter
/// delimiter never matches inside a longer one.
const DELIMITERS: [&str; 5] = ["----", "---", "--", "————", "——"];

/// Marker prefix turning roster line 0 into a tunnel directive
const TUNNEL_MARKER: char = '#';

/// One parsed roster entry
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub id: String,
    pub host: String,
    pub user: String,
    pub pass: SecretString,
    pub port: u16,
}

/// Kind of tunnel requested by a roster directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelKind {
    None,
    Wireguard,
    Vpn,
}

impl TunnelKind {
    fn parse(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "" | "none" => TunnelKind::None,
            "wg" | "wireguard" => TunnelKind::Wireguard,
            _ => TunnelKind::Vpn,
        }
    }
}

/// Optional first-line directive: all entries are reached through the named
/// tunnel profile.
#[derive(Debug, Clone)]
pub struct TunnelDirective {
    pub profile: String,
    pub kind: TunnelKind,
}

/// Discriminated parse result for a single roster line
#[derive(Debug, Clone)]
pub enum ParsedLine {
    Server(ServerRecord),
    Tunnel(TunnelDirective),
}

/// Split a line on the first matching delimiter
fn split_fields(line: &str) -> Result<Vec<&str>, FleetError> {
    for sep in DELIMITERS {
        if line.contains(sep) {
            return Ok(line.split(sep).map(str::trim).collect());
        }
    }
    Err(FleetError::AuthFormat(line.to_string()))
}

/// Parse one roster line. `is_first` enables tunnel directive detection.
pub fn parse_line(line: &str, is_first: bool) -> Result<ParsedLine, FleetError> {
    let fields = split_fields(line)?;

    if is_first && fields[0].starts_with(TUNNEL_MARKER) {
        let profile = fields[0].trim_start_matches(TUNNEL_MARKER).to_string();
        let kind = TunnelKind::parse(fields.get(1).copied().unwrap_or(""));
        return Ok(ParsedLine::Tunnel(TunnelDirective { profile, kind }));
    }

    if fields.len() < 4 || fields.len() > 5 || fields[0].is_empty() {
        return Err(FleetError::AuthFormat(line.to_string()));
    }
    let port = match fields.get(4) {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| FleetError::AuthFormat(line.to_string()))?,
        None => 22,
    };

    Ok(ParsedLine::Server(ServerRecord {
        id: fields[0].to_string(),
        host: fields[1].to_string(),
        user: fields[2].to_string(),
        pass: SecretString::from(fields[3].to_string()),
        port,
    }))
}

/// A parsed roster: the indexable server set plus an optional tunnel
/// directive taken from line 0.
#[derive(Debug)]
pub struct Roster {
    records: Vec<ServerRecord>,
    tunnel: Option<TunnelDirective>,
}

impl Roster {
    /// Parse a full roster file content
    pub fn parse(content: &str) -> Result<Self, FleetError> {
        let mut records = Vec::new();
        let mut tunnel = None;
        let mut first = true;

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line, first)? {
                ParsedLine::Server(record) => records.push(record),
                // not a server entry, excluded from the iteration range
                ParsedLine::Tunnel(directive) => tunnel = Some(directive),
            }
            first = false;
        }

        Ok(Self { records, tunnel })
    }

    /// Load and parse a roster from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        let content = File::new(path.as_ref()).read_string().await?;
        Self::parse(&content)
    }

    /// Number of server entries (tunnel directive excluded)
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Record at `index % count`, so callers may pass monotonically
    /// increasing counters. None only for an empty roster.
    pub fn read_at(&self, index: usize) -> Option<&ServerRecord> {
        if self.records.is_empty() {
            return None;
        }
        Some(&self.records[index % self.records.len()])
    }

    /// Tunnel directive from line 0, if present
    pub fn tunnel(&self) -> Option<&TunnelDirective> {
        self.tunnel.as_ref()
    }
}
