//! Parser for the human-readable output of `avahi-browse`.
//!
//! With `-r`, `avahi-browse` prints one line per event: a marker, the
//! interface, the address family, the instance name, the service type and the
//! domain. Resolved (`=`) events are followed by indented detail lines:
//!
//! ```text
//! +   eth0 IPv4 BeagleBoneMusicBox                            _musicbox._tcp       local
//! =   eth0 IPv4 BeagleBoneMusicBox                            _musicbox._tcp       local
//!    hostname = [beaglebone.local]
//!    address = [192.168.0.199]
//!    port = [8070]
//!    txt = ["LivingRoom"]
//! ```
//!
//! [`OutputParser`] is fed one line at a time and yields [`BrowseEvent`]s once
//! enough lines have been seen. Malformed input produces a [`ParseError`] and
//! never panics; the parser resynchronises on the next event line.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

use crate::service::{Service, Snapshot};

/// Marker for a service that appeared but is not resolved yet.
pub const MARKER_ADD: &str = "+";
/// Marker for a service that went away.
pub const MARKER_REMOVE: &str = "-";
/// Marker for a resolved service, followed by its detail lines.
pub const MARKER_RESOLVE: &str = "=";

/// Minimum columns on an event line: marker, interface, protocol, name, type, domain.
const MIN_EVENT_COLUMNS: usize = 6;

/// Errors produced while parsing tool output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// An event line without enough columns to find the name.
    #[error("Event line has too few columns: {line:?}")]
    ShortLine { line: String },

    /// A detail line whose value is not wrapped in `[...]`.
    #[error("Field {field} is not wrapped in brackets: {line:?}")]
    MalformedField { field: &'static str, line: String },

    /// A detail line arrived out of order.
    #[error("Expected {expected} but found {found}: {line:?}")]
    UnexpectedField {
        expected: &'static str,
        found: &'static str,
        line: String,
    },

    /// The port value is not a base-10 number in `0..=65535`.
    #[error("Invalid port {value:?}: {line:?}")]
    InvalidPort { value: String, line: String },

    /// A resolved record was interrupted before all required details arrived.
    #[error("Record for {name:?} ended before its {missing} line")]
    IncompleteRecord { name: String, missing: &'static str },

    /// A detail line with no resolved record in progress.
    #[error("Field {field} outside of a resolved record: {line:?}")]
    OrphanedField { field: &'static str, line: String },
}

impl ParseError {
    /// The offending line, when there is one.
    pub fn line(&self) -> Option<&str> {
        match self {
            Self::ShortLine { line }
            | Self::MalformedField { line, .. }
            | Self::UnexpectedField { line, .. }
            | Self::InvalidPort { line, .. }
            | Self::OrphanedField { line, .. } => Some(line),
            Self::IncompleteRecord { .. } => None,
        }
    }
}

/// Kind of event an event line announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Add,
    Remove,
    Resolve,
}

impl EventKind {
    /// Map a leading token to an event kind.
    pub fn from_marker(token: &str) -> Option<Self> {
        match token {
            MARKER_ADD => Some(Self::Add),
            MARKER_REMOVE => Some(Self::Remove),
            MARKER_RESOLVE => Some(Self::Resolve),
            _ => None,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::Add => MARKER_ADD,
            Self::Remove => MARKER_REMOVE,
            Self::Resolve => MARKER_RESOLVE,
        }
    }
}

/// The columns of a `+`, `-` or `=` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLine {
    pub kind: EventKind,
    pub interface: String,
    pub protocol: String,
    pub name: String,
    pub service_type: String,
    pub domain: String,
}

impl EventLine {
    /// Parse an event line.
    ///
    /// Returns `Ok(None)` when the line does not start with a marker. The
    /// name is every column between the protocol and the trailing type and
    /// domain columns, rejoined with single spaces.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let columns: Vec<&str> = line.split_whitespace().collect();
        let Some(kind) = columns.first().and_then(|marker| EventKind::from_marker(marker)) else {
            return Ok(None);
        };

        if columns.len() < MIN_EVENT_COLUMNS {
            return Err(ParseError::ShortLine {
                line: line.trim_end().to_string(),
            });
        }

        let last = columns.len();
        Ok(Some(Self {
            kind,
            interface: columns[1].to_string(),
            protocol: columns[2].to_string(),
            name: columns[3..last - 2].join(" "),
            service_type: columns[last - 2].to_string(),
            domain: columns[last - 1].to_string(),
        }))
    }
}

/// An event decoded from tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseEvent {
    /// A service appeared; details follow in a later resolve event.
    Added(EventLine),
    /// A service disappeared.
    Removed(EventLine),
    /// A service was resolved to its full details.
    Resolved(Service),
}

impl BrowseEvent {
    /// Name of the service the event is about.
    pub fn name(&self) -> &str {
        match self {
            Self::Added(line) | Self::Removed(line) => &line.name,
            Self::Resolved(service) => &service.name,
        }
    }

    /// Apply the event to a snapshot.
    ///
    /// Returns `true` when the event should be reported to watchers. Removing
    /// a name that is not present leaves the snapshot untouched but still
    /// counts as a reportable event.
    pub fn apply(self, snapshot: &mut Snapshot) -> bool {
        match self {
            Self::Added(_) => false,
            Self::Removed(line) => {
                snapshot.remove(&line.name);
                true
            }
            Self::Resolved(service) => {
                snapshot.insert(service.name.clone(), service);
                true
            }
        }
    }
}

/// Detail lines following a resolve event, in the order they must appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Hostname,
    Address,
    Port,
    Txt,
}

impl Field {
    fn key(&self) -> &'static str {
        match self {
            Self::Hostname => "hostname",
            Self::Address => "address",
            Self::Port => "port",
            Self::Txt => "txt",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "hostname" => Some(Self::Hostname),
            "address" => Some(Self::Address),
            "port" => Some(Self::Port),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }
}

enum Line {
    Event(EventLine),
    Field(Field, String),
    Ignored,
}

fn classify(line: &str) -> Result<Line, ParseError> {
    if let Some(event) = EventLine::parse(line)? {
        return Ok(Line::Event(event));
    }

    let Some((key, value)) = line.trim().split_once('=') else {
        return Ok(Line::Ignored);
    };
    let Some(field) = Field::from_key(key.trim()) else {
        return Ok(Line::Ignored);
    };

    match value
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        Some(inner) => Ok(Line::Field(field, inner.to_string())),
        None => Err(ParseError::MalformedField {
            field: field.key(),
            line: line.trim_end().to_string(),
        }),
    }
}

#[derive(Debug)]
struct PendingService {
    header: EventLine,
    hostname: Option<String>,
    address: Option<String>,
    port: Option<u16>,
}

impl PendingService {
    fn new(header: EventLine) -> Self {
        Self {
            header,
            hostname: None,
            address: None,
            port: None,
        }
    }

    fn expected(&self) -> Field {
        if self.hostname.is_none() {
            Field::Hostname
        } else if self.address.is_none() {
            Field::Address
        } else if self.port.is_none() {
            Field::Port
        } else {
            Field::Txt
        }
    }

    fn into_service(self, txt: Option<&str>) -> Service {
        let txt_records = txt.map(split_txt).unwrap_or_default();
        Service {
            name: self.header.name,
            hostname: self.hostname.unwrap_or_default(),
            service_type: self.header.service_type,
            address: self.address.unwrap_or_default(),
            port: self.port.unwrap_or_default(),
            txt: txt_records.join(" "),
            txt_records,
            interface: self.header.interface,
            protocol: self.header.protocol,
            domain: self.header.domain,
        }
    }
}

/// Outcome of feeding one line to the parser.
pub type ParsedLine = Result<BrowseEvent, ParseError>;

/// Incremental parser for `avahi-browse -r` output.
#[derive(Debug, Default)]
pub struct OutputParser {
    pending: Option<PendingService>,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a resolved record is waiting for more detail lines.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed one line (with or without its trailing newline).
    ///
    /// A single line can complete one record and start another, so more than
    /// one result may come back.
    pub fn push_line(&mut self, line: &str) -> Vec<ParsedLine> {
        let mut out = Vec::new();

        match classify(line) {
            Ok(Line::Ignored) => {}
            Ok(Line::Event(event)) => {
                self.flush(&mut out);
                match event.kind {
                    EventKind::Resolve => self.pending = Some(PendingService::new(event)),
                    EventKind::Add => out.push(Ok(BrowseEvent::Added(event))),
                    EventKind::Remove => out.push(Ok(BrowseEvent::Removed(event))),
                }
            }
            Ok(Line::Field(field, value)) => self.push_field(field, &value, line, &mut out),
            Err(e) => {
                // A broken event line still ends the record before it.
                if matches!(e, ParseError::ShortLine { .. }) {
                    self.flush(&mut out);
                } else {
                    self.pending = None;
                }
                out.push(Err(e));
            }
        }

        out
    }

    /// Signal end of output, flushing any record that is still open.
    pub fn finish(&mut self) -> Vec<ParsedLine> {
        let mut out = Vec::new();
        self.flush(&mut out);
        out
    }

    fn push_field(&mut self, field: Field, value: &str, line: &str, out: &mut Vec<ParsedLine>) {
        let orphaned = || ParseError::OrphanedField {
            field: field.key(),
            line: line.trim_end().to_string(),
        };

        let Some(mut pending) = self.pending.take() else {
            out.push(Err(orphaned()));
            return;
        };

        let expected = pending.expected();
        if field != expected {
            if expected == Field::Txt {
                out.push(Ok(BrowseEvent::Resolved(pending.into_service(None))));
                out.push(Err(orphaned()));
            } else {
                out.push(Err(ParseError::UnexpectedField {
                    expected: expected.key(),
                    found: field.key(),
                    line: line.trim_end().to_string(),
                }));
            }
            return;
        }

        match field {
            Field::Hostname => pending.hostname = Some(value.trim().to_string()),
            Field::Address => pending.address = Some(value.trim().to_string()),
            Field::Port => match value.trim().parse::<u16>() {
                Ok(port) => pending.port = Some(port),
                Err(_) => {
                    out.push(Err(ParseError::InvalidPort {
                        value: value.to_string(),
                        line: line.trim_end().to_string(),
                    }));
                    return;
                }
            },
            Field::Txt => {
                out.push(Ok(BrowseEvent::Resolved(pending.into_service(Some(value)))));
                return;
            }
        }

        self.pending = Some(pending);
    }

    fn flush(&mut self, out: &mut Vec<ParsedLine>) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        match pending.expected() {
            Field::Txt => out.push(Ok(BrowseEvent::Resolved(pending.into_service(None)))),
            missing => out.push(Err(ParseError::IncompleteRecord {
                name: pending.header.name,
                missing: missing.key(),
            })),
        }
    }
}

/// Parse a complete block of output into a snapshot.
///
/// Add and remove events are ignored, as a one-shot listing only reports
/// what resolved. Errors are returned alongside the services that did parse.
pub fn parse_output(output: &str) -> (Snapshot, Vec<ParseError>) {
    let mut parser = OutputParser::new();
    let mut snapshot = Snapshot::new();
    let mut errors = Vec::new();

    let results = output
        .lines()
        .flat_map(|line| parser.push_line(line))
        .collect::<Vec<_>>()
        .into_iter()
        .chain(parser.finish());

    for result in results {
        match result {
            Ok(BrowseEvent::Resolved(service)) => {
                snapshot.insert(service.name.clone(), service);
            }
            Ok(_) => {}
            Err(e) => errors.push(e),
        }
    }

    (snapshot, errors)
}

/// Split a TXT payload such as `"a=1" "b=2"` into its strings.
///
/// Unquoted payloads are kept as a single record.
fn split_txt(payload: &str) -> Vec<String> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Vec::new();
    }
    if !payload.starts_with('"') {
        return vec![payload.to_string()];
    }

    let mut records = Vec::new();
    // Escapes decode to raw bytes, so a record is assembled as bytes.
    let mut current: Vec<u8> = Vec::new();
    let mut in_quotes = false;
    let mut chars = payload.chars().peekable();

    while let Some(c) = chars.next() {
        if !in_quotes {
            if c == '"' {
                in_quotes = true;
            }
            continue;
        }
        match c {
            '"' => {
                records.push(String::from_utf8_lossy(&current).into_owned());
                current.clear();
                in_quotes = false;
            }
            '\\' => push_escaped(&mut current, &mut chars),
            _ => push_char(&mut current, c),
        }
    }

    if in_quotes {
        records.push(String::from_utf8_lossy(&current).into_owned());
    }

    records
}

fn push_char(record: &mut Vec<u8>, c: char) {
    let mut buf = [0; 4];
    record.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Decode a backslash escape: `\"`, `\\` or a three-digit decimal byte.
fn push_escaped(record: &mut Vec<u8>, chars: &mut Peekable<Chars<'_>>) {
    let mut digits = String::new();
    while digits.len() < 3 {
        match chars.peek() {
            Some(d) if d.is_ascii_digit() => {
                digits.push(*d);
                chars.next();
            }
            _ => break,
        }
    }

    if digits.is_empty() {
        if let Some(next) = chars.next() {
            push_char(record, next);
        }
        return;
    }

    match digits.parse::<u8>() {
        Ok(byte) if digits.len() == 3 => record.push(byte),
        _ => record.extend_from_slice(digits.as_bytes()),
    }
}
