//! Freezer Integration Tests
//!
//! End-to-end behaviour of the freezer against an in-memory object store:
//! append / sync / reopen round trips, group boundaries, truncation at every
//! position relative to the write buffer, layout enforcement and concurrent
//! readers.

use bytes::Bytes;
use freezer_core::{AncientRecord, FieldKind};
use freezer_storage::group::{encode_group, group_key};
use freezer_storage::marker::{read_layout, read_marker, write_marker};
use freezer_storage::{
    CancellationToken, Error, Freezer, FreezerConfig, ObjectStoreRemote, RemoteStore,
};
use object_store::memory::InMemory;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn record(n: u64) -> AncientRecord {
    AncientRecord::new(
        n.to_be_bytes().to_vec(),
        format!("header-{n}").into_bytes(),
        format!("body-{n}").into_bytes(),
        format!("receipts-{n}").into_bytes(),
        (n * 1000).to_be_bytes().to_vec(),
    )
}

fn config(group_size: u64) -> FreezerConfig {
    FreezerConfig {
        group_size,
        ..Default::default()
    }
}

fn memory() -> Arc<ObjectStoreRemote> {
    Arc::new(ObjectStoreRemote::new(Arc::new(InMemory::new())))
}

async fn open(remote: &Arc<ObjectStoreRemote>, config: FreezerConfig) -> Freezer {
    Freezer::open(remote.clone(), config).await.unwrap()
}

async fn fill(freezer: &Freezer, range: std::ops::Range<u64>) {
    for n in range {
        freezer.append(n, record(n)).await.unwrap();
    }
}

async fn group_keys(remote: &ObjectStoreRemote) -> Vec<String> {
    remote.list("blocks/", None, 10_000).await.unwrap().keys
}

// ============================================================================
// Round Trips
// ============================================================================

#[tokio::test]
async fn test_round_trip_after_reopen() {
    let remote = memory();
    let freezer = open(&remote, FreezerConfig::default()).await;
    fill(&freezer, 0..100).await;
    freezer.sync().await.unwrap();
    drop(freezer);

    let reopened = open(&remote, FreezerConfig::default()).await;
    assert_eq!(reopened.ancients(), 100);
    for n in [0, 1, 31, 32, 63, 64, 95, 96, 99] {
        for kind in FieldKind::ALL {
            let expected = record(n).field(kind).clone();
            assert_eq!(reopened.ancient(kind, n).await.unwrap(), expected, "{kind} {n}");
        }
    }
    assert!(matches!(
        reopened.ancient(FieldKind::Header, 100).await,
        Err(Error::NotFound(100))
    ));
}

#[tokio::test]
async fn test_unsynced_records_lost_on_reopen() {
    let remote = memory();
    let freezer = open(&remote, config(4)).await;
    fill(&freezer, 0..6).await;
    freezer.sync().await.unwrap();
    fill(&freezer, 6..9).await;
    assert_eq!(freezer.ancients(), 9);
    drop(freezer);

    let reopened = open(&remote, config(4)).await;
    assert_eq!(reopened.ancients(), 6);
    assert_eq!(reopened.buffered(), 2);
    reopened.append(6, record(6)).await.unwrap();
}

#[tokio::test]
async fn test_reads_served_from_buffer_before_sync() {
    let freezer = open(&memory(), config(4)).await;
    fill(&freezer, 0..3).await;
    assert_eq!(
        freezer.ancient(FieldKind::Body, 2).await.unwrap(),
        Bytes::from("body-2")
    );
    assert!(freezer.has_ancient(FieldKind::Hash, 0).await.unwrap());
    assert!(!freezer.has_ancient(FieldKind::Hash, 3).await.unwrap());
}

#[tokio::test]
async fn test_append_batch() {
    let freezer = open(&memory(), config(4)).await;
    let frozen = freezer
        .append_batch(0, (0..10).map(record).collect())
        .await
        .unwrap();
    assert_eq!(frozen, 10);

    let err = freezer
        .append_batch(12, vec![record(12)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OutOfOrder { expected: 10, got: 12 }));
    assert_eq!(freezer.ancients(), 10);
}

// ============================================================================
// Group Boundaries
// ============================================================================

#[tokio::test]
async fn test_sync_buffer_remainder_at_group_boundaries() {
    for (count, remainder) in [(32u64, 0u64), (33, 1), (31, 31)] {
        let remote = memory();
        let freezer = open(&remote, FreezerConfig::default()).await;
        fill(&freezer, 0..count).await;
        freezer.sync().await.unwrap();

        let status = freezer.status().await;
        assert_eq!(status.buffered, remainder, "count {count}");
        assert_eq!(status.durable, count);
        assert_eq!(read_marker(&*remote).await.unwrap(), count);

        let expected_groups = count.div_ceil(32) as usize;
        assert_eq!(group_keys(&remote).await.len(), expected_groups);
    }
}

#[tokio::test]
async fn test_partial_group_is_rewritten_by_next_sync() {
    let remote = memory();
    let freezer = open(&remote, config(4)).await;
    fill(&freezer, 0..6).await;
    freezer.sync().await.unwrap();
    fill(&freezer, 6..8).await;
    freezer.sync().await.unwrap();

    assert_eq!(freezer.buffered(), 0);
    assert_eq!(group_keys(&remote).await, vec![group_key(0), group_key(1)]);

    let reopened = open(&remote, config(4)).await;
    for n in 0..8 {
        assert_eq!(reopened.ancient_record(n).await.unwrap(), record(n));
    }
}

#[tokio::test]
async fn test_sync_empty_buffer_writes_nothing() {
    let remote = memory();
    let freezer = open(&remote, config(4)).await;
    freezer.sync().await.unwrap();
    assert!(remote.get("index-marker").await.unwrap().is_none());
    assert!(group_keys(&remote).await.is_empty());
}

// ============================================================================
// Truncation
// ============================================================================

#[tokio::test]
async fn test_truncate_inside_buffer_after_sync() {
    let remote = memory();
    let freezer = open(&remote, config(4)).await;
    fill(&freezer, 0..6).await;
    freezer.sync().await.unwrap();

    freezer.truncate_ancients(5).await.unwrap();
    assert_eq!(freezer.ancients(), 5);
    assert_eq!(freezer.buffered(), 1);
    assert!(matches!(
        freezer.ancient(FieldKind::Hash, 5).await,
        Err(Error::NotFound(5))
    ));

    // Reuse of the truncated number survives a restart.
    let replacement = AncientRecord::new(vec![9], vec![9], vec![9], vec![9], vec![9]);
    freezer.append(5, replacement.clone()).await.unwrap();
    freezer.sync().await.unwrap();
    drop(freezer);

    let reopened = open(&remote, config(4)).await;
    assert_eq!(reopened.ancients(), 6);
    assert_eq!(reopened.ancient_record(5).await.unwrap(), replacement);
    assert_eq!(reopened.ancient_record(4).await.unwrap(), record(4));
}

#[tokio::test]
async fn test_truncate_below_buffer_mid_group() {
    let remote = memory();
    let freezer = open(&remote, config(4)).await;
    fill(&freezer, 0..14).await;
    freezer.sync().await.unwrap();

    freezer.truncate_ancients(6).await.unwrap();
    assert_eq!(freezer.ancients(), 6);
    assert_eq!(freezer.buffered(), 2);
    assert_eq!(freezer.ancient_record(5).await.unwrap(), record(5));
    for n in 6..14 {
        assert!(!freezer.has_ancient(FieldKind::Hash, n).await.unwrap());
    }

    // The survivors' group stays; everything after it is gone.
    assert_eq!(group_keys(&remote).await, vec![group_key(0), group_key(1)]);
    assert_eq!(read_marker(&*remote).await.unwrap(), 6);

    fill(&freezer, 6..10).await;
    freezer.sync().await.unwrap();
    drop(freezer);

    let reopened = open(&remote, config(4)).await;
    assert_eq!(reopened.ancients(), 10);
    for n in 0..10 {
        assert_eq!(reopened.ancient_record(n).await.unwrap(), record(n));
    }
}

#[tokio::test]
async fn test_truncate_below_buffer_on_group_boundary() {
    let remote = memory();
    let freezer = open(&remote, config(4)).await;
    fill(&freezer, 0..13).await;
    freezer.sync().await.unwrap();

    freezer.truncate_ancients(8).await.unwrap();
    assert_eq!(freezer.ancients(), 8);
    assert_eq!(freezer.buffered(), 0);
    assert_eq!(freezer.ancient_record(7).await.unwrap(), record(7));
    assert_eq!(group_keys(&remote).await, vec![group_key(0), group_key(1)]);
}

#[tokio::test]
async fn test_truncate_to_zero() {
    let remote = memory();
    let freezer = open(&remote, config(4)).await;
    fill(&freezer, 0..9).await;
    freezer.sync().await.unwrap();

    freezer.truncate_ancients(0).await.unwrap();
    assert_eq!(freezer.ancients(), 0);
    assert!(group_keys(&remote).await.is_empty());
    assert_eq!(read_marker(&*remote).await.unwrap(), 0);

    freezer.append(0, record(100)).await.unwrap();
    assert_eq!(freezer.ancient_record(0).await.unwrap(), record(100));
}

#[tokio::test]
async fn test_truncate_is_idempotent() {
    let remote = memory();
    let freezer = open(&remote, config(4)).await;
    fill(&freezer, 0..20).await;
    freezer.sync().await.unwrap();

    freezer.truncate_ancients(9).await.unwrap();
    let first = freezer.status().await;
    let keys = group_keys(&remote).await;

    freezer.truncate_ancients(9).await.unwrap();
    assert_eq!(freezer.status().await, first);
    assert_eq!(group_keys(&remote).await, keys);

    // A target at or beyond the frozen count changes nothing.
    freezer.truncate_ancients(50).await.unwrap();
    assert_eq!(freezer.ancients(), 9);
}

#[tokio::test]
async fn test_truncate_invalidates_cached_group() {
    let freezer = open(&memory(), config(4)).await;
    fill(&freezer, 0..12).await;
    freezer.sync().await.unwrap();

    // Warm the cache with group 1, then cut into it.
    assert_eq!(freezer.ancient_record(6).await.unwrap(), record(6));
    freezer.truncate_ancients(5).await.unwrap();
    assert!(matches!(
        freezer.ancient_record(6).await,
        Err(Error::NotFound(6))
    ));

    let replacement = AncientRecord::new(vec![1], vec![], vec![], vec![], vec![]);
    fill(&freezer, 5..6).await;
    freezer.append(6, replacement.clone()).await.unwrap();
    freezer.sync().await.unwrap();
    fill(&freezer, 7..12).await;
    freezer.sync().await.unwrap();
    assert_eq!(freezer.ancient_record(6).await.unwrap(), replacement);
}

#[tokio::test]
async fn test_truncate_paginates_deletes() {
    let remote = memory();
    let freezer = open(
        &remote,
        FreezerConfig {
            group_size: 2,
            list_page_size: 3,
            ..Default::default()
        },
    )
    .await;
    fill(&freezer, 0..40).await;
    freezer.sync().await.unwrap();
    assert_eq!(group_keys(&remote).await.len(), 20);

    freezer.truncate_ancients(3).await.unwrap();
    assert_eq!(group_keys(&remote).await, vec![group_key(0), group_key(1)]);
}

// ============================================================================
// Layout
// ============================================================================

#[tokio::test]
async fn test_reopen_with_other_group_size_refused() {
    let remote = memory();
    let freezer = open(&remote, config(4)).await;
    fill(&freezer, 0..8).await;
    freezer.sync().await.unwrap();
    drop(freezer);

    let err = Freezer::open(remote.clone(), config(8)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::GroupSizeMismatch {
            stored: 4,
            configured: 8
        }
    ));
}

#[tokio::test]
async fn test_dataset_without_layout_is_adopted() {
    let remote = memory();
    for index in 0..2u64 {
        let records: Vec<_> = (index * 4..index * 4 + 4).map(record).collect();
        remote
            .put(&group_key(index), encode_group(&records).unwrap())
            .await
            .unwrap();
    }
    write_marker(&*remote, 8).await.unwrap();

    let err = Freezer::open(remote.clone(), config(8)).await.unwrap_err();
    assert!(matches!(err, Error::GroupSizeMismatch { stored: 4, .. }));
    assert!(read_layout(&*remote).await.unwrap().is_none());

    let freezer = open(&remote, config(4)).await;
    assert_eq!(freezer.ancients(), 8);
    assert_eq!(freezer.ancient_record(7).await.unwrap(), record(7));
    assert_eq!(read_layout(&*remote).await.unwrap().unwrap().group_size, 4);
}

#[tokio::test]
async fn test_dataset_without_layout_or_first_group_is_refused() {
    let remote = memory();
    let records: Vec<_> = (4..8).map(record).collect();
    remote
        .put(&group_key(1), encode_group(&records).unwrap())
        .await
        .unwrap();
    write_marker(&*remote, 8).await.unwrap();

    let err = Freezer::open(remote.clone(), config(4)).await.unwrap_err();
    assert!(matches!(err, Error::Corrupt(msg) if msg.contains("unknown group size")));

    // Nothing was adopted or cleaned up.
    assert!(read_layout(&*remote).await.unwrap().is_none());
    assert_eq!(read_marker(&*remote).await.unwrap(), 8);
    assert_eq!(group_keys(&remote).await, vec![group_key(1)]);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_during_sync() {
    let remote = memory();
    let freezer = Arc::new(open(&remote, config(8)).await);
    fill(&freezer, 0..200).await;

    let mut readers = Vec::new();
    for r in 0..4u64 {
        let freezer = freezer.clone();
        readers.push(tokio::spawn(async move {
            for i in 0..300u64 {
                let n = (i * 7 + r * 13) % 200;
                let got = freezer.ancient_record(n).await.unwrap();
                assert_eq!(got, record(n));
            }
        }));
    }

    freezer.sync().await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(freezer.status().await.durable, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_during_deep_truncate() {
    let remote = memory();
    let freezer = Arc::new(open(&remote, config(4)).await);
    fill(&freezer, 0..40).await;
    freezer.sync().await.unwrap();

    let mut readers = Vec::new();
    for r in 0..4u64 {
        let freezer = freezer.clone();
        readers.push(tokio::spawn(async move {
            for i in 0..400u64 {
                let n = (i * 11 + r * 5) % 40;
                match freezer.ancient_record(n).await {
                    Ok(got) => assert_eq!(got, record(n), "record {n}"),
                    // Records at or past the truncation point may vanish.
                    Err(Error::NotFound(missing)) if n >= 6 => assert_eq!(missing, n),
                    Err(e) => panic!("read of {n} failed: {e}"),
                }
            }
        }));
    }

    for _ in 0..5 {
        freezer.truncate_ancients(6).await.unwrap();
        assert_eq!(freezer.ancients(), 6);
        fill(&freezer, 6..40).await;
        freezer.sync().await.unwrap();
    }
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(freezer.status().await.durable, 40);
    for n in [0, 5, 6, 7, 39] {
        assert_eq!(freezer.ancient_record(n).await.unwrap(), record(n));
    }
}

#[tokio::test]
async fn test_background_sync_flushes_until_cancelled() {
    let remote = memory();
    let freezer = Arc::new(
        open(
            &remote,
            FreezerConfig {
                group_size: 4,
                sync_interval_ms: 20,
                ..Default::default()
            },
        )
        .await,
    );

    let token = CancellationToken::new();
    let handle = freezer.clone().start_background_sync(token.clone());
    fill(&freezer, 0..10).await;

    let mut durable = 0;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        durable = freezer.status().await.durable;
        if durable == 10 {
            break;
        }
    }
    assert_eq!(durable, 10);

    token.cancel();
    handle.await.unwrap();
    assert_eq!(read_marker(&*remote).await.unwrap(), 10);
}

#[tokio::test]
async fn test_close_flushes_buffer() {
    let remote = memory();
    let freezer = open(&remote, config(4)).await;
    fill(&freezer, 0..3).await;
    freezer.close().await.unwrap();
    assert_eq!(read_marker(&*remote).await.unwrap(), 3);
}

// ============================================================================
// Local Filesystem Backend
// ============================================================================

#[tokio::test]
async fn test_local_filesystem_truncate_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = object_store::local::LocalFileSystem::new_with_prefix(dir.path()).unwrap();
    let remote = Arc::new(ObjectStoreRemote::new(Arc::new(store)).with_unordered_listing());
    let config = FreezerConfig {
        group_size: 2,
        list_page_size: 3,
        ..Default::default()
    };

    let freezer = open(&remote, config.clone()).await;
    fill(&freezer, 0..20).await;
    freezer.sync().await.unwrap();
    assert_eq!(group_keys(&remote).await.len(), 10);

    freezer.truncate_ancients(5).await.unwrap();
    assert_eq!(
        group_keys(&remote).await,
        vec![group_key(0), group_key(1), group_key(2)]
    );
    drop(freezer);

    let reopened = open(&remote, config).await;
    assert_eq!(reopened.ancients(), 5);
    assert_eq!(reopened.ancient_record(4).await.unwrap(), record(4));
    assert!(!reopened.has_ancient(FieldKind::Body, 5).await.unwrap());
}
