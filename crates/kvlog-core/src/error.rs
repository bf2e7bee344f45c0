//! Error types for kvlog operations
//!
//! Every failure is a variant of [`KvError`]. Variants carry plain data
//! (paths, kinds, messages) rather than boxed sources so the error stays
//! `Clone` and can be handed across the writer thread's error channel.

use std::path::PathBuf;

use thiserror::Error;

/// kvlog error types with detailed context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    /// Get on a key that is not in the map
    #[error("no such key: {key}")]
    NotFound {
        /// The key that was looked up
        key: String,
    },

    /// A log line could not be parsed during replay
    #[error("malformed record in {} at line {line}: {reason}", .path.display())]
    MalformedRecord {
        /// Log file being replayed
        path: PathBuf,
        /// 1-based line number of the bad record
        line: u64,
        /// What was wrong with it
        reason: String,
    },

    /// A replayed record did not advance the sequence
    #[error(
        "transaction sequence out of order in {} at line {line}: {found} follows {last}",
        .path.display()
    )]
    OutOfOrderSequence {
        /// Log file being replayed
        path: PathBuf,
        /// 1-based line number of the offending record
        line: u64,
        /// Highest sequence seen before this record
        last: u64,
        /// Sequence carried by the record
        found: u64,
    },

    /// The log writer failed to append a record and has stopped
    #[error("log write failed in {} at sequence {sequence}: {message} ({kind})", .path.display())]
    WriteFailure {
        /// Log file being appended to
        path: PathBuf,
        /// Sequence number of the record that could not be written
        sequence: u64,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// I/O operation failed outside the writer thread
    #[error("{}", fmt_io(.path, .message, .kind))]
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// Key cannot be stored in the tab-separated log format
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// Key or value exceeds the configured limit
    #[error("entry {component} too large: {entry_size} bytes exceeds limit of {max_size} bytes")]
    OversizedEntry {
        /// Whether it's the key or value that's oversized
        component: String,
        /// Size of the oversized component
        entry_size: u64,
        /// Maximum allowed size
        max_size: u64,
    },

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn fmt_io(path: &Option<PathBuf>, message: &str, kind: &std::io::ErrorKind) -> String {
    match path {
        Some(path) => format!("I/O error in {}: {} ({})", path.display(), message, kind),
        None => format!("I/O error: {} ({})", message, kind),
    }
}

impl KvError {
    /// True for the expected "key absent" outcome of a lookup.
    ///
    /// A request layer maps this to its not-found status and everything
    /// else to an internal failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound { .. })
    }

    /// True for errors that abort recovery (the log on disk is unusable).
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            KvError::MalformedRecord { .. } | KvError::OutOfOrderSequence { .. }
        )
    }

    pub(crate) fn io_at(path: &std::path::Path, err: &std::io::Error, what: &str) -> Self {
        KvError::Io {
            path: Some(path.to_path_buf()),
            kind: err.kind(),
            message: format!("{}: {}", what, err),
        }
    }
}

/// Convert std::io::Error to KvError::Io
impl From<std::io::Error> for KvError {
    fn from(err: std::io::Error) -> Self {
        KvError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for kvlog operations
pub type KvResult<T> = Result<T, KvError>;
