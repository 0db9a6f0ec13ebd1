//! Group Codec and Key Scheme
//!
//! Records are flushed in fixed-size groups, one remote blob per group:
//!
//! ```text
//! group_size = 4
//!
//! seq:    0 1 2 3 | 4 5 6 7 | 8 9
//! group:     0    |    1    |  2      (last group may be short)
//! key:    blocks/000000000.json
//!         blocks/000000001.json
//!         blocks/000000002.json
//! ```
//!
//! Addressing is purely arithmetic: `group_index = seq / group_size`, and the
//! record sits at `seq % group_size` inside its blob. Group keys are
//! zero-padded to nine digits so lexicographic listing order equals numeric
//! order. Because the arithmetic depends on `group_size`, a dataset must
//! never be reopened with a different one (see `layout`).
//!
//! ## Blob Format
//!
//! A group blob is a JSON array of records in ascending sequence order.

use crate::error::{Error, Result};
use bytes::Bytes;
use freezer_core::AncientRecord;

/// Listing prefix shared by all group blobs.
pub const GROUPS_PREFIX: &str = "blocks/";

const GROUP_KEY_SUFFIX: &str = ".json";

/// Storage key of a group.
pub fn group_key(index: u64) -> String {
    format!("{}{:09}{}", GROUPS_PREFIX, index, GROUP_KEY_SUFFIX)
}

/// Inverse of [`group_key`]; `None` for keys that are not group blobs.
pub fn parse_group_key(key: &str) -> Option<u64> {
    let digits = key
        .strip_prefix(GROUPS_PREFIX)?
        .strip_suffix(GROUP_KEY_SUFFIX)?;
    if digits.len() < 9 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Maps sequence numbers onto groups for one fixed group size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupCodec {
    group_size: u64,
}

impl GroupCodec {
    pub fn new(group_size: u64) -> Result<Self> {
        if group_size == 0 {
            return Err(Error::InvalidConfig("group_size must be > 0".to_string()));
        }
        Ok(Self { group_size })
    }

    pub fn group_size(&self) -> u64 {
        self.group_size
    }

    pub fn group_index(&self, seq: u64) -> u64 {
        seq / self.group_size
    }

    /// First sequence number of a group.
    pub fn group_start(&self, index: u64) -> u64 {
        index * self.group_size
    }

    /// Position of `seq` inside its group blob.
    pub fn offset_in_group(&self, seq: u64) -> usize {
        (seq % self.group_size) as usize
    }

    /// Round `seq` down to its group boundary.
    pub fn align_down(&self, seq: u64) -> u64 {
        seq - seq % self.group_size
    }

    pub fn is_aligned(&self, seq: u64) -> bool {
        seq % self.group_size == 0
    }

    /// Key of the group holding `seq`.
    pub fn key_for(&self, seq: u64) -> String {
        group_key(self.group_index(seq))
    }
}

/// Serialize a group for upload.
pub fn encode_group(records: &[AncientRecord]) -> Result<Bytes> {
    serde_json::to_vec(records)
        .map(Bytes::from)
        .map_err(|e| Error::Encode(e.to_string()))
}

/// Parse a downloaded group blob.
pub fn decode_group(key: &str, data: &[u8]) -> Result<Vec<AncientRecord>> {
    serde_json::from_slice(data).map_err(|e| Error::decode(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seed: u8) -> AncientRecord {
        AncientRecord::new(vec![seed; 32], vec![seed], vec![seed], vec![], vec![seed, seed])
    }

    #[test]
    fn test_group_key_format() {
        assert_eq!(group_key(0), "blocks/000000000.json");
        assert_eq!(group_key(42), "blocks/000000042.json");
        assert_eq!(group_key(123_456_789), "blocks/123456789.json");
    }

    #[test]
    fn test_parse_group_key() {
        assert_eq!(parse_group_key("blocks/000000042.json"), Some(42));
        assert_eq!(parse_group_key("index-marker"), None);
        assert_eq!(parse_group_key("blocks/42.json"), None);
        assert_eq!(parse_group_key("blocks/00000004x.json"), None);
        assert_eq!(parse_group_key("blocks/000000042.json.tmp"), None);
    }

    #[test]
    fn test_addressing_default_group_size() {
        let codec = GroupCodec::new(32).unwrap();
        assert_eq!(codec.group_index(0), 0);
        assert_eq!(codec.group_index(31), 0);
        assert_eq!(codec.group_index(32), 1);
        assert_eq!(codec.offset_in_group(33), 1);
        assert_eq!(codec.key_for(65), "blocks/000000002.json");
        assert_eq!(codec.group_start(2), 64);
        assert_eq!(codec.align_down(65), 64);
        assert!(codec.is_aligned(96));
        assert!(!codec.is_aligned(97));
    }

    #[test]
    fn test_zero_group_size_rejected() {
        assert!(matches!(GroupCodec::new(0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_group_blob_is_json_array() {
        let records = vec![record(1), record(2)];
        let blob = encode_group(&records).unwrap();
        assert_eq!(blob[0], b'[');

        let decoded = decode_group("blocks/000000000.json", &blob).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_decode_malformed_blob() {
        let err = decode_group("blocks/000000003.json", b"{not json").unwrap_err();
        match err {
            Error::Decode { key, .. } => assert_eq!(key, "blocks/000000003.json"),
            other => panic!("expected Decode, got {other:?}"),
        }
    }
}
