//! Index Marker and Dataset Layout
//!
//! Two small blobs at fixed keys anchor a dataset:
//!
//! - `index-marker`: the durable frozen count as a UTF-8 decimal string,
//!   written after every successful Sync and Truncate. It is the only thing
//!   recovery trusts; records appended after the last marker write are lost
//!   on a crash.
//! - `freezer-layout`: `{"version":1,"group_size":N}`, written once when the
//!   dataset is first opened. Reopening with another group size would
//!   misaddress every group, so it is refused.

use crate::error::{Error, Result};
use crate::remote::RemoteStore;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const INDEX_MARKER_KEY: &str = "index-marker";
pub const LAYOUT_KEY: &str = "freezer-layout";

const LAYOUT_VERSION: u32 = 1;

pub fn encode_marker(frozen: u64) -> Bytes {
    Bytes::from(frozen.to_string())
}

pub fn decode_marker(data: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(data).map_err(|e| Error::decode(INDEX_MARKER_KEY, e))?;
    text.trim()
        .parse::<u64>()
        .map_err(|e| Error::decode(INDEX_MARKER_KEY, format!("{text:?}: {e}")))
}

/// Read the marker; an absent marker means an empty dataset.
pub async fn read_marker(remote: &dyn RemoteStore) -> Result<u64> {
    match remote.get(INDEX_MARKER_KEY).await? {
        Some(data) => decode_marker(&data),
        None => Ok(0),
    }
}

pub async fn write_marker(remote: &dyn RemoteStore, frozen: u64) -> Result<()> {
    tracing::info!(number = frozen, "Setting index marker");
    remote.put(INDEX_MARKER_KEY, encode_marker(frozen)).await
}

/// Persisted description of how a dataset is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLayout {
    pub version: u32,
    pub group_size: u64,
}

impl DatasetLayout {
    pub fn new(group_size: u64) -> Self {
        Self {
            version: LAYOUT_VERSION,
            group_size,
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| Error::Encode(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let layout: Self = serde_json::from_slice(data).map_err(|e| Error::decode(LAYOUT_KEY, e))?;
        if layout.version != LAYOUT_VERSION {
            return Err(Error::decode(
                LAYOUT_KEY,
                format!("unsupported layout version {}", layout.version),
            ));
        }
        Ok(layout)
    }
}

pub async fn read_layout(remote: &dyn RemoteStore) -> Result<Option<DatasetLayout>> {
    match remote.get(LAYOUT_KEY).await? {
        Some(data) => DatasetLayout::decode(&data).map(Some),
        None => Ok(None),
    }
}

pub async fn write_layout(remote: &dyn RemoteStore, layout: DatasetLayout) -> Result<()> {
    remote.put(LAYOUT_KEY, layout.encode()?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ObjectStoreRemote;
    use object_store::memory::InMemory;
    use std::sync::Arc;

    #[test]
    fn test_marker_is_plain_decimal() {
        assert_eq!(encode_marker(1234).as_ref(), b"1234");
        assert_eq!(decode_marker(b"1234").unwrap(), 1234);
        assert_eq!(decode_marker(b"77\n").unwrap(), 77);
    }

    #[test]
    fn test_malformed_marker_is_decode_error() {
        assert!(matches!(decode_marker(b"-3"), Err(Error::Decode { .. })));
        assert!(matches!(decode_marker(b""), Err(Error::Decode { .. })));
        assert!(matches!(decode_marker(&[0xff, 0xfe]), Err(Error::Decode { .. })));
    }

    #[tokio::test]
    async fn test_absent_marker_reads_as_zero() {
        let remote = ObjectStoreRemote::new(Arc::new(InMemory::new()));
        assert_eq!(read_marker(&remote).await.unwrap(), 0);

        write_marker(&remote, 96).await.unwrap();
        assert_eq!(read_marker(&remote).await.unwrap(), 96);
    }

    #[tokio::test]
    async fn test_layout_persisted() {
        let remote = ObjectStoreRemote::new(Arc::new(InMemory::new()));
        assert!(read_layout(&remote).await.unwrap().is_none());

        write_layout(&remote, DatasetLayout::new(32)).await.unwrap();
        let layout = read_layout(&remote).await.unwrap().unwrap();
        assert_eq!(layout.group_size, 32);
    }

    #[test]
    fn test_unknown_layout_version_rejected() {
        let err = DatasetLayout::decode(br#"{"version":9,"group_size":32}"#).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}
