//! # Error Module - Custom *Colbridge* Error Type
//!
//! Defines the unified error type for Colbridge.
//!
//! ## Features
//! - Covers decode failures on foreign schemas and arrays, buffer and child count
//!   mismatches, stream errors, CSV configuration and structural-character failures,
//!   and sink IO.
//! - Implements `Display` for readable output and `Error` for integration
//!   with standard Rust error handling.

use std::error::Error;
use std::fmt;
use std::io;

/// Catch all error type for `Colbridge`
#[derive(Debug, PartialEq)]
pub enum ColbridgeError {
    /// Invalid input or configuration, e.g. a null string containing quotes.
    Invalid {
        message: String,
    },
    /// A type or feature the crate deliberately does not implement.
    NotImplemented {
        message: String,
    },
    BufferCountMismatch {
        dtype: String,
        expected: usize,
        found: i64,
    },
    ChildCountMismatch {
        dtype: String,
        expected: usize,
        found: i64,
    },
    UnsupportedBitWidth {
        dtype: String,
        bits: usize,
    },
    /// Malformed or released C Data Interface structure.
    Ffi {
        message: String,
    },
    /// Non-zero errno returned by a foreign `ArrowArrayStream` callback.
    Stream {
        errno: i32,
        message: String,
    },
    Io {
        kind: io::ErrorKind,
        message: String,
    },
    ColumnLengthMismatch {
        col: usize,
        expected: usize,
        found: usize,
    },
    SchemaMismatch {
        message: String,
    },
    TypeError {
        from: String,
        to: &'static str,
        message: Option<String>,
    },
}

impl ColbridgeError {
    /// Shorthand for [`ColbridgeError::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        ColbridgeError::Invalid { message: message.into() }
    }

    /// Shorthand for [`ColbridgeError::NotImplemented`].
    pub fn not_implemented(message: impl Into<String>) -> Self {
        ColbridgeError::NotImplemented { message: message.into() }
    }

    /// Shorthand for [`ColbridgeError::Ffi`].
    pub fn ffi(message: impl Into<String>) -> Self {
        ColbridgeError::Ffi { message: message.into() }
    }
}

impl fmt::Display for ColbridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColbridgeError::Invalid { message } => write!(f, "Invalid: {}", message),
            ColbridgeError::NotImplemented { message } => {
                write!(f, "Not implemented: {}", message)
            }
            ColbridgeError::BufferCountMismatch { dtype, expected, found } => write!(
                f,
                "expected {} buffers for imported type {}, ArrowArray has {}",
                expected, dtype, found
            ),
            ColbridgeError::ChildCountMismatch { dtype, expected, found } => write!(
                f,
                "expected {} children, for imported type {}, ArrowArray has {}",
                expected, dtype, found
            ),
            ColbridgeError::UnsupportedBitWidth { dtype, bits } => write!(
                f,
                "invalid bitwidth {} for imported type {}: only 1 or multiples of 8 are supported",
                bits, dtype
            ),
            ColbridgeError::Ffi { message } => write!(f, "C Data Interface error: {}", message),
            ColbridgeError::Stream { errno, message } => {
                write!(f, "stream error (errno {}): {}", errno, message)
            }
            ColbridgeError::Io { kind, message } => write!(f, "IO error ({:?}): {}", kind, message),
            ColbridgeError::ColumnLengthMismatch { col, expected, found } => {
                write!(
                    f,
                    "Column length mismatch in column {}: expected {}, found {}.",
                    col, expected, found
                )
            }
            ColbridgeError::SchemaMismatch { message } => write!(f, "Schema mismatch: {}", message),
            ColbridgeError::TypeError { from, to, message } => {
                if let Some(msg) = message {
                    write!(f, "Type error: cannot cast from '{}' to '{}': {}", from, to, msg)
                } else {
                    write!(f, "Type error: cannot cast from '{}' to '{}'.", from, to)
                }
            }
        }
    }
}

impl Error for ColbridgeError {}

impl From<io::Error> for ColbridgeError {
    fn from(e: io::Error) -> Self {
        ColbridgeError::Io { kind: e.kind(), message: e.to_string() }
    }
}

impl From<fmt::Error> for ColbridgeError {
    fn from(_: fmt::Error) -> Self {
        ColbridgeError::invalid("value formatting failed")
    }
}
