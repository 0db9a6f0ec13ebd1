//! Field Kinds
//!
//! Every ancient record carries exactly five fields. Readers select one of
//! them by `FieldKind`; the set is closed, so an unknown tag can only come
//! from outside the process (CLI arguments, configuration) and is rejected
//! by `FromStr` before it reaches the store.
//!
//! The string tags are the historical table names (`hashes`, `headers`,
//! `bodies`, `receipts`, `diffs`). Singular aliases are accepted on input.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five fields stored for every ancient record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Hash,
    Header,
    Body,
    Receipts,
    Difficulty,
}

impl FieldKind {
    /// All kinds in storage order.
    pub const ALL: [FieldKind; 5] = [
        FieldKind::Hash,
        FieldKind::Header,
        FieldKind::Body,
        FieldKind::Receipts,
        FieldKind::Difficulty,
    ];

    /// Table name used for this kind in tags and log fields.
    pub fn table_name(self) -> &'static str {
        match self {
            FieldKind::Hash => "hashes",
            FieldKind::Header => "headers",
            FieldKind::Body => "bodies",
            FieldKind::Receipts => "receipts",
            FieldKind::Difficulty => "diffs",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for FieldKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashes" | "hash" => Ok(FieldKind::Hash),
            "headers" | "header" => Ok(FieldKind::Header),
            "bodies" | "body" => Ok(FieldKind::Body),
            "receipts" | "receipt" => Ok(FieldKind::Receipts),
            "diffs" | "difficulty" | "td" => Ok(FieldKind::Difficulty),
            _ => Err(Error::UnknownKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_names() {
        for kind in FieldKind::ALL {
            let parsed: FieldKind = kind.table_name().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("Header".parse::<FieldKind>().unwrap(), FieldKind::Header);
        assert_eq!("difficulty".parse::<FieldKind>().unwrap(), FieldKind::Difficulty);
        assert_eq!(" body ".parse::<FieldKind>().unwrap(), FieldKind::Body);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "transactions".parse::<FieldKind>().unwrap_err();
        assert_eq!(err, Error::UnknownKind("transactions".to_string()));
    }

    #[test]
    fn test_display_matches_table_name() {
        assert_eq!(FieldKind::Difficulty.to_string(), "diffs");
    }
}
