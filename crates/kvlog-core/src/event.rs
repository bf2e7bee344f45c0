//! Record format for the kvlog transaction log
//!
//! Every record is one line of text with four tab-separated columns:
//!
//! ```text
//! <sequence>\t<kind>\t<key>\t<quoted value>\n
//! ```
//!
//! `kind` is `1` for Put and `2` for Delete. The value column is always
//! present; Delete records carry `""`.

use crate::escape::{quote, unquote};

/// Number of tab-separated columns in a record
pub const FIELD_COUNT: usize = 4;

/// Log event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// Insert or update a key-value pair
    Put = 1,
    /// Delete a key
    Delete = 2,
}

impl EventKind {
    /// Numeric code written in the kind column
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse the kind column
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(EventKind::Put),
            2 => Some(EventKind::Delete),
            _ => None,
        }
    }
}

/// A single durable record: one mutation with its assigned sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub sequence: u64,
    pub kind: EventKind,
    pub key: String,
    /// Ignored for [`EventKind::Delete`]
    pub value: String,
}

impl Event {
    pub fn put(sequence: u64, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { sequence, kind: EventKind::Put, key: key.into(), value: value.into() }
    }

    pub fn delete(sequence: u64, key: impl Into<String>) -> Self {
        Self { sequence, kind: EventKind::Delete, key: key.into(), value: String::new() }
    }

    /// Encode as a complete log line, trailing newline included.
    pub fn encode(&self) -> String {
        let value = match self.kind {
            EventKind::Put => quote(&self.value),
            EventKind::Delete => quote(""),
        };
        format!("{}\t{}\t{}\t{}\n", self.sequence, self.kind.code(), self.key, value)
    }

    /// Parse one log line. A trailing `\n` or `\r\n` is tolerated.
    ///
    /// The error is a bare reason string; the replay iterator attaches the
    /// path and line number.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        let fields: Vec<&str> = line.splitn(FIELD_COUNT, '\t').collect();
        if fields.len() < FIELD_COUNT {
            return Err(format!(
                "expected {} tab-separated fields, found {}",
                FIELD_COUNT,
                fields.len()
            ));
        }

        let sequence = fields[0]
            .parse::<u64>()
            .map_err(|e| format!("invalid sequence {:?}: {}", fields[0], e))?;
        let kind = fields[1]
            .parse::<u8>()
            .ok()
            .and_then(EventKind::from_code)
            .ok_or_else(|| format!("invalid event kind {:?}", fields[1]))?;
        let key = fields[2].to_string();
        let value = unquote(fields[3])?;

        Ok(Self { sequence, kind, key, value })
    }
}

/// Why a key cannot be written to the log, if it cannot.
///
/// The key column is unquoted, so it must not contain the column or record
/// separators.
pub fn key_violation(key: &str) -> Option<&'static str> {
    if key.contains('\t') {
        Some("key contains a tab")
    } else if key.contains('\n') {
        Some("key contains a newline")
    } else if key.contains('\r') {
        Some("key contains a carriage return")
    } else {
        None
    }
}
