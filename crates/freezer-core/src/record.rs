//! Ancient Record Data Structure
//!
//! An `AncientRecord` is one immutable entry in the freezer. It is never
//! self-describing: its sequence number is implied by its position in the
//! dataset, and each of its five fields is an opaque byte string produced by
//! whatever serializer the caller uses for hashes, headers, bodies, receipts
//! and difficulties.
//!
//! ## Serialized Form
//!
//! Records are persisted inside group blobs as JSON objects whose fields are
//! `0x`-prefixed hex strings:
//!
//! ```text
//! {"hash":"0xd4e5...","header":"0xf90211...","body":"0xc0c0",
//!  "receipts":"0xc0","difficulty":"0x8502540be400"}
//! ```
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` so records can be shared between the write buffer,
//!   read snapshots and the read cache without copying payloads
//! - Field selection goes through `FieldKind`, never through a string

use crate::error::{Error, Result};
use crate::kind::FieldKind;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single frozen record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncientRecord {
    #[serde(with = "hex_bytes")]
    pub hash: Bytes,

    #[serde(with = "hex_bytes")]
    pub header: Bytes,

    #[serde(with = "hex_bytes")]
    pub body: Bytes,

    #[serde(with = "hex_bytes")]
    pub receipts: Bytes,

    #[serde(with = "hex_bytes")]
    pub difficulty: Bytes,
}

impl AncientRecord {
    pub fn new(
        hash: impl Into<Bytes>,
        header: impl Into<Bytes>,
        body: impl Into<Bytes>,
        receipts: impl Into<Bytes>,
        difficulty: impl Into<Bytes>,
    ) -> Self {
        Self {
            hash: hash.into(),
            header: header.into(),
            body: body.into(),
            receipts: receipts.into(),
            difficulty: difficulty.into(),
        }
    }

    /// Borrow the encoded bytes of one field.
    pub fn field(&self, kind: FieldKind) -> &Bytes {
        match kind {
            FieldKind::Hash => &self.hash,
            FieldKind::Header => &self.header,
            FieldKind::Body => &self.body,
            FieldKind::Receipts => &self.receipts,
            FieldKind::Difficulty => &self.difficulty,
        }
    }

    /// Estimate the in-memory payload size of this record in bytes
    pub fn estimated_size(&self) -> usize {
        FieldKind::ALL.iter().map(|k| self.field(*k).len()).sum()
    }

    /// Encode to a single JSON line (the export/import format).
    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidRecord(e.to_string()))
    }

    /// Decode one JSON line produced by [`AncientRecord::to_json_line`].
    pub fn from_json_line(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| Error::InvalidRecord(e.to_string()))
    }
}

/// Parse a hex string with or without a `0x` prefix.
pub fn decode_hex(s: &str) -> Result<Bytes> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| Error::InvalidHex(format!("{s:?}: {e}")))
}

/// Render bytes as `0x`-prefixed lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex(&s).map_err(serde::de::Error::custom)
    }
}
