//! Storage Error Types
//!
//! This module defines all error types that can occur during freezer operations.
//!
//! ## Error Categories
//!
//! ### Lookup Errors
//! - `NotFound`: The sequence number is not committed, or its group blob is absent
//!
//! ### Write Path Errors
//! - `OutOfOrder`: Append was given a number other than the current frozen count
//! - `Encode`: A group could not be serialized
//!
//! ### Remote Errors
//! - `Remote`: A remote store call failed (transient I/O; no automatic retry)
//! - `Timeout`: A remote call exceeded the configured deadline
//! - `Cancelled`: The caller's cancellation token fired mid-operation
//!
//! ### Truncate Errors
//! - `CleanupPending`: The truncation is committed but deleting the groups past
//!   it failed; the next Sync, Truncate or Repair finishes the deletes
//!
//! ### Data Errors
//! - `Decode`: A stored blob (group, marker, layout) is malformed
//! - `Corrupt`: Remote state contradicts the index marker
//! - `GroupSizeMismatch`: The dataset was written with a different group size
//!
//! ### Other
//! - `Unsupported`: Operations the backend cannot answer cheaply (e.g. size by kind)
//! - `InvalidConfig`: Rejected configuration values
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, Error>`. A failed Sync or Truncate never advances the index
//! marker or the frozen count, so the same call can simply be retried. The one
//! exception is `CleanupPending`, which reports a truncation that did take
//! effect.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No such ancient record: {0}")]
    NotFound(u64),

    #[error("Out of order append: expected {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("Failed to decode {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Failed to encode group: {0}")]
    Encode(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Remote {op} failed for {key}: {source}")]
    Remote {
        op: &'static str,
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("Remote {op} timed out for {key}")]
    Timeout { op: &'static str, key: String },

    #[error("Operation cancelled during remote {0}")]
    Cancelled(&'static str),

    #[error("Truncated to {frozen}, but deleting later groups failed: {source}")]
    CleanupPending {
        frozen: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("Group size mismatch: dataset uses {stored}, configured {configured}")]
    GroupSizeMismatch { stored: u64, configured: u64 },

    #[error("Corrupt freezer state: {0}")]
    Corrupt(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn remote(op: &'static str, key: &str, source: object_store::Error) -> Self {
        Error::Remote {
            op,
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn decode(key: &str, reason: impl ToString) -> Self {
        Error::Decode {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for "no such ancient record", the only non-fatal lookup outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True when the requested truncation is in effect despite the error.
    pub fn is_committed(&self) -> bool {
        matches!(self, Error::CleanupPending { .. })
    }

    /// Short label used for the `error_type` metric dimension.
    pub(crate) fn kind_label(&self) -> &'static str {
        match self {
            Error::Timeout { .. } => "timeout",
            Error::Cancelled(_) => "cancelled",
            _ => "failed",
        }
    }
}
