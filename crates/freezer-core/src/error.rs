//! Error Types for the Freezer Record Model
//!
//! Errors raised at the boundary where callers name a field kind or hand in
//! hex-encoded field bytes. Storage-level failures live in `freezer-storage`.
//!
//! ## Error Categories
//!
//! - `UnknownKind`: A field kind tag that is not one of the five known tables
//! - `InvalidHex`: A field value that is not valid `0x`-prefixed hex
//! - `InvalidRecord`: A JSON record line that is missing fields or malformed

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown field kind: {0}")]
    UnknownKind(String),

    #[error("Invalid hex field: {0}")]
    InvalidHex(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, Error>;
