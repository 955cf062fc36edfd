//! Error types for machine storage
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Location/machine mismatches are deliberately absent: they are reported as
//! `tracing` warnings and never abort an operation.

use std::io;
use thiserror::Error;

/// Result type alias for machine storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Structural errors in an encoded index or data blob.
///
/// Any of these is fatal to the load attempt that hit it. A corrupt buffer
/// is never retried and never treated as "empty".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Version byte does not match the codec's supported version
    #[error("unsupported format version: expected {expected}, got {actual}")]
    UnsupportedVersion {
        /// Version this codec reads and writes
        expected: u8,
        /// Version found in the buffer
        actual: u8,
    },

    /// Buffer ended before a field could be read
    #[error("truncated buffer while reading {field}")]
    Truncated {
        /// Field being read
        field: &'static str,
    },

    /// A length-prefixed string was not valid UTF-8
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 {
        /// Field being read
        field: &'static str,
    },

    /// A field holds a value outside its allowed range
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Field being read or written
        field: &'static str,
        /// Offending value
        value: i64,
    },

    /// Bytes remain after the last expected field
    #[error("{0} trailing bytes after end of buffer")]
    TrailingBytes(usize),

    /// Any other structural inconsistency
    #[error("malformed buffer: {0}")]
    Malformed(String),
}

/// Error types for machine storage
#[derive(Debug, Error)]
pub enum Error {
    /// Encoded index or data blob is unreadable
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// No factory is registered for a stored type tag
    #[error("Unknown machine type: {type_tag}")]
    UnknownType {
        /// The unresolvable type tag
        type_tag: String,
    },

    /// A single machine record could not be encoded or decoded
    #[error("Record error: {0}")]
    Record(String),

    /// Invalid arguments, rejected before any state is touched
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// I/O error in a persistence backend
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persistence backend found its own data corrupt
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`Error::Precondition`]
    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    /// Returns true if this error only affects a single record.
    ///
    /// Record-local failures are skipped during chunk load; everything else
    /// aborts the load.
    pub fn is_record_local(&self) -> bool {
        matches!(self, Error::UnknownType { .. } | Error::Record(_))
    }
}
