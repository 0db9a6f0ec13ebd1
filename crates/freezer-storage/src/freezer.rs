//! Freezer Facade
//!
//! `Freezer` owns the frozen count, the write buffer and the read cache, and
//! is the only thing that talks to the remote store.
//!
//! ## Write Flow
//!
//! ```text
//! append(n, record)          n must equal the frozen count
//!     ↓
//! WriteBuffer.push()         in memory only
//!     ↓
//! sync()                     periodic (background loop) or explicit
//!     ↓
//! PUT blocks/{group}.json    one blob per buffered group, bounded concurrency
//!     ↓
//! PUT index-marker           commit point
//!     ↓
//! buffer keeps len % group_size records
//! ```
//!
//! ## Read Flow
//!
//! ```text
//! ancient(kind, n)
//!     ↓
//! n >= frozen?               → NotFound
//! n in buffer snapshot?      → buffered record
//! n in cached group?         → cached record
//! GET blocks/{n / group}     → replace cache, return record (absent → NotFound)
//! ```
//!
//! ## Consistency
//!
//! Append, Sync, Truncate and Repair serialize on one async mutex. Readers
//! never take it: after every mutation the writer publishes an immutable
//! `ReadSnapshot` (frozen count, buffer chunks, truncation generation)
//! through an `ArcSwap`, and a read works against whichever snapshot it
//! loaded. The buffer's start is always a group boundary, so any record a
//! reader fetches remotely lives in a group that is immutable until the next
//! Truncate, and Truncate bumps the generation the read cache is keyed on.
//!
//! ## Failure Semantics
//!
//! Sync and Truncate mutate in-memory state only after their commit point
//! (the index marker write). Any earlier failure, timeout or cancellation
//! leaves the marker, frozen count and buffer exactly as they were, so the
//! call can be retried. The marker write itself is never raced against the
//! cancellation token. A Truncate whose group deletes fail after the commit
//! reports `CleanupPending`.

use crate::buffer::WriteBuffer;
use crate::cache::{CacheStats, ReadCache};
use crate::config::FreezerConfig;
use crate::error::{Error, Result};
use crate::group::{
    decode_group, encode_group, group_key, parse_group_key, GroupCodec, GROUPS_PREFIX,
};
use crate::marker::{self, DatasetLayout, INDEX_MARKER_KEY, LAYOUT_KEY};
use crate::remote::RemoteStore;
use arc_swap::ArcSwap;
use bytes::Bytes;
use freezer_core::{AncientRecord, FieldKind};
use freezer_observability::metrics;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Immutable view of the dataset handed to readers.
#[derive(Debug)]
struct ReadSnapshot {
    frozen: u64,
    buffer: WriteBuffer,
    generation: u64,
}

#[derive(Debug)]
struct WriterState {
    buffer: WriteBuffer,

    /// Value of the index marker as last written (or read at startup)
    marker: u64,

    /// Bumped whenever remote groups below the buffer are rewritten
    generation: u64,

    /// First group index still waiting to be deleted after a committed truncate
    pending_cleanup: Option<u64>,
}

/// Outcome of a repair pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    /// Index marker found on the remote
    pub marker_before: u64,

    /// Frozen count after reconciling with the remote groups
    pub marker_after: u64,

    /// Records reloaded into the write buffer (the partial tail group)
    pub buffered: u64,

    /// Group blobs beyond the recovered tail that were deleted
    pub orphans_deleted: usize,
}

/// Point-in-time counters for status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezerStatus {
    pub frozen: u64,
    pub buffered: u64,
    pub durable: u64,
    pub group_size: u64,
}

/// Append-only store of ancient records backed by remote blob storage.
#[derive(Debug)]
pub struct Freezer {
    remote: Arc<dyn RemoteStore>,
    codec: GroupCodec,
    config: FreezerConfig,
    writer: Mutex<WriterState>,
    snapshot: ArcSwap<ReadSnapshot>,
    cache: ReadCache,
}

impl Freezer {
    /// Open (or create) the dataset behind `remote`.
    ///
    /// Verifies the container, enforces the stored group size, reads the
    /// index marker and runs [`Freezer::repair`]'s reconciliation before the
    /// first snapshot is published.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig`: Rejected configuration
    /// - `GroupSizeMismatch`: The dataset was created with another group size
    /// - `Remote` / `Timeout`: The remote store is unreachable
    /// - `Decode`: The marker or layout blob is malformed
    pub async fn open(remote: Arc<dyn RemoteStore>, config: FreezerConfig) -> Result<Self> {
        config.validate()?;
        let codec = GroupCodec::new(config.group_size)?;
        let empty = WriteBuffer::new(codec, 0)?;

        let freezer = Self {
            remote,
            codec,
            config,
            writer: Mutex::new(WriterState {
                buffer: empty.clone(),
                marker: 0,
                generation: 0,
                pending_cleanup: None,
            }),
            snapshot: ArcSwap::from_pointee(ReadSnapshot {
                frozen: 0,
                buffer: empty,
                generation: 0,
            }),
            cache: ReadCache::new(),
        };

        tracing::info!(group_size = codec.group_size(), "Opening freezer");

        freezer
            .guarded(None, "create_container", "/", freezer.remote.create_container())
            .await?;
        freezer.check_layout().await?;

        {
            let mut state = freezer.writer.lock().await;
            let report = freezer.repair_locked(&mut state, None).await?;
            tracing::info!(
                frozen = report.marker_after,
                buffered = report.buffered,
                orphans_deleted = report.orphans_deleted,
                "Freezer opened"
            );
        }

        Ok(freezer)
    }

    pub fn group_size(&self) -> u64 {
        self.codec.group_size()
    }

    pub fn config(&self) -> &FreezerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Number of records committed (buffered or flushed).
    pub fn ancients(&self) -> u64 {
        self.snapshot.load().frozen
    }

    /// Length of the in-memory write buffer as of the latest snapshot.
    pub fn buffered(&self) -> u64 {
        self.snapshot.load().buffer.len()
    }

    /// Retrieve one field of record `number`.
    pub async fn ancient(&self, kind: FieldKind, number: u64) -> Result<Bytes> {
        let record = self.ancient_record(number).await?;
        Ok(record.field(kind).clone())
    }

    /// Whether record `number` is retrievable. Only NotFound maps to `false`.
    pub async fn has_ancient(&self, kind: FieldKind, number: u64) -> Result<bool> {
        match self.ancient(kind, number).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Retrieve every field of record `number`.
    pub async fn ancient_record(&self, number: u64) -> Result<AncientRecord> {
        let snapshot = self.snapshot.load_full();
        if number >= snapshot.frozen {
            return Err(Error::NotFound(number));
        }

        if let Some(record) = snapshot.buffer.get(number) {
            metrics::BUFFER_HITS_TOTAL.inc();
            return Ok(record.clone());
        }

        if let Some(record) = self.cache.get(snapshot.generation, number) {
            return Ok(record);
        }

        let index = self.codec.group_index(number);
        let records = self
            .fetch_group(index, None)
            .await?
            .ok_or(Error::NotFound(number))?;

        let found = records.get(self.codec.offset_in_group(number)).cloned();
        self.cache
            .replace(snapshot.generation, self.codec.group_start(index), records);

        found.ok_or(Error::NotFound(number))
    }

    /// Total stored size of one field kind.
    ///
    /// Object stores have no cheap aggregate size query, so this is
    /// explicitly unsupported rather than reported as zero.
    pub fn ancient_size(&self, _kind: FieldKind) -> Result<u64> {
        Err(Error::Unsupported("ancient size by field kind"))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn status(&self) -> FreezerStatus {
        let state = self.writer.lock().await;
        FreezerStatus {
            frozen: state.buffer.end(),
            buffered: state.buffer.len(),
            durable: state.marker,
            group_size: self.codec.group_size(),
        }
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Append record `number`, which must equal the current frozen count.
    pub async fn append(&self, number: u64, record: AncientRecord) -> Result<()> {
        let mut state = self.writer.lock().await;

        let expected = state.buffer.end();
        if number != expected {
            tracing::warn!(expected, got = number, "Rejected out-of-order append");
            return Err(Error::OutOfOrder {
                expected,
                got: number,
            });
        }

        state.buffer.push(record);
        metrics::RECORDS_APPENDED_TOTAL.inc();
        self.publish(&state);

        Ok(())
    }

    /// Append consecutive records starting at `first`, returning the new frozen count.
    pub async fn append_batch(&self, first: u64, records: Vec<AncientRecord>) -> Result<u64> {
        let mut state = self.writer.lock().await;

        let expected = state.buffer.end();
        if first != expected {
            tracing::warn!(expected, got = first, "Rejected out-of-order batch append");
            return Err(Error::OutOfOrder {
                expected,
                got: first,
            });
        }

        let count = records.len() as u64;
        for record in records {
            state.buffer.push(record);
        }
        metrics::RECORDS_APPENDED_TOTAL.inc_by(count);
        self.publish(&state);

        Ok(state.buffer.end())
    }

    /// Flush buffered groups and advance the index marker.
    pub async fn sync(&self) -> Result<()> {
        self.sync_with(&CancellationToken::new()).await
    }

    /// [`Freezer::sync`] that aborts cleanly when `token` is cancelled.
    #[tracing::instrument(skip(self, token))]
    pub async fn sync_with(&self, token: &CancellationToken) -> Result<()> {
        let mut state = self.writer.lock().await;
        self.sync_locked(&mut state, Some(token)).await
    }

    async fn sync_locked(
        &self,
        state: &mut WriterState,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        self.finish_cleanup(state, token).await?;

        let frozen = state.buffer.end();
        if state.buffer.is_empty() || frozen == state.marker {
            return Ok(());
        }

        let backlog = state.buffer.len();
        tracing::info!(backlog, frozen, "Syncing ancients");
        let start = Instant::now();

        // Groups entirely at or below the marker are already durable.
        let group_size = self.codec.group_size();
        let durable = state.marker;
        let uploads = state
            .buffer
            .groups()
            .filter(|(index, records)| index * group_size + records.len() as u64 > durable)
            .map(|(index, records)| -> Result<(String, Bytes)> {
                Ok((group_key(index), encode_group(records)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let group_count = uploads.len();

        self.upload_groups(uploads, token).await?;

        self.guarded(
            None,
            "put",
            INDEX_MARKER_KEY,
            marker::write_marker(self.remote.as_ref(), frozen),
        )
        .await?;

        state.marker = frozen;
        state.buffer.retain_remainder();
        self.publish(state);

        let elapsed = start.elapsed();
        metrics::SYNC_DURATION.observe(elapsed.as_secs_f64());
        let records_per_sec = backlog as f64 / elapsed.as_secs_f64().max(f64::EPSILON);

        tracing::info!(
            backlog,
            groups = group_count,
            remaining = state.buffer.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            records_per_sec,
            "Finished syncing ancients"
        );

        Ok(())
    }

    /// Discard every record numbered `target` or higher.
    pub async fn truncate_ancients(&self, target: u64) -> Result<()> {
        self.truncate_ancients_with(target, &CancellationToken::new())
            .await
    }

    /// [`Freezer::truncate_ancients`] that aborts cleanly when `token` is cancelled.
    ///
    /// Targets inside the write buffer are handled in memory (plus a marker
    /// rewrite if the discarded records were already durable). Deeper targets
    /// run in two phases:
    ///
    /// 1. **Stage**: fetch the group straddling `target` and keep its first
    ///    `target % group_size` records as the new buffer. Nothing remote is
    ///    modified, so cancellation or failure here changes nothing.
    /// 2. **Commit**: write `index-marker = target`, swap in the new buffer
    ///    and frozen count, then delete every group after the survivors'
    ///    group, paginating the listing to the end.
    ///
    /// The survivors' group is left in place remotely; its records past
    /// `target` are masked by the marker and overwritten by the next Sync.
    /// If the delete phase fails, the truncation stays committed and
    /// [`Error::CleanupPending`] is returned. The cleanup is retried by the
    /// next Sync or Truncate, or removed as orphans by repair after a restart.
    #[tracing::instrument(skip(self, token))]
    pub async fn truncate_ancients_with(
        &self,
        target: u64,
        token: &CancellationToken,
    ) -> Result<()> {
        let mut state = self.writer.lock().await;

        let frozen = state.buffer.end();
        if target >= frozen {
            return self
                .finish_cleanup(&mut state, Some(token))
                .await
                .map_err(|e| cleanup_pending(frozen, e));
        }

        if target >= state.buffer.start() {
            if state.marker > target {
                self.guarded(
                    None,
                    "put",
                    INDEX_MARKER_KEY,
                    marker::write_marker(self.remote.as_ref(), target),
                )
                .await?;
                state.marker = target;
            }
            state.buffer.truncate(target);
            self.publish(&state);

            tracing::info!(ancients = frozen, target, "Truncated write buffer");
            return Ok(());
        }

        tracing::info!(
            ancients = frozen,
            target,
            delta = frozen - target,
            "Truncating ancients"
        );
        let start = Instant::now();

        // Stage: rescue the records of the straddling group below the target.
        let survivor_group = self.codec.group_index(target);
        let survivor_count = self.codec.offset_in_group(target);
        let survivors = if survivor_count == 0 {
            Vec::new()
        } else {
            let key = group_key(survivor_group);
            let mut records = self
                .fetch_group(survivor_group, Some(token))
                .await?
                .ok_or_else(|| {
                    Error::Corrupt(format!("{key} missing while truncating to {target}"))
                })?;
            if records.len() < survivor_count {
                return Err(Error::Corrupt(format!(
                    "{key} holds {} records, truncating to {target} needs {survivor_count}",
                    records.len()
                )));
            }
            records.truncate(survivor_count);
            records
        };
        let buffer =
            WriteBuffer::with_records(self.codec, self.codec.align_down(target), survivors)?;

        if token.is_cancelled() {
            return Err(Error::Cancelled("truncate"));
        }

        // Commit.
        self.guarded(
            None,
            "put",
            INDEX_MARKER_KEY,
            marker::write_marker(self.remote.as_ref(), target),
        )
        .await?;

        state.buffer = buffer;
        state.marker = target;
        state.generation += 1;
        state.pending_cleanup = Some(if survivor_count == 0 {
            survivor_group
        } else {
            survivor_group + 1
        });
        self.cache.invalidate();
        self.publish(&state);

        let deleted = self
            .finish_cleanup(&mut state, Some(token))
            .await
            .map_err(|e| cleanup_pending(target, e));

        tracing::info!(
            target,
            buffered = state.buffer.len(),
            cleanup_ok = deleted.is_ok(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Finished truncating ancients"
        );

        deleted
    }

    /// Reconcile the in-memory state with the remote groups.
    ///
    /// Pending records are flushed first, then the tail is rebuilt from the
    /// index marker and the groups actually present. A short tail group
    /// lowers the frozen count to its length. A missing one is resolved with
    /// a single listing pass to the last group of the gap-free run starting
    /// at group 0. Groups past the recovered tail are deleted. This also runs
    /// on every open.
    pub async fn repair(&self) -> Result<RepairReport> {
        self.repair_with(&CancellationToken::new()).await
    }

    #[tracing::instrument(skip(self, token))]
    pub async fn repair_with(&self, token: &CancellationToken) -> Result<RepairReport> {
        let mut state = self.writer.lock().await;
        self.sync_locked(&mut state, Some(token)).await?;
        self.repair_locked(&mut state, Some(token)).await
    }

    async fn repair_locked(
        &self,
        state: &mut WriterState,
        token: Option<&CancellationToken>,
    ) -> Result<RepairReport> {
        let marker_before = self
            .guarded(
                token,
                "get",
                INDEX_MARKER_KEY,
                marker::read_marker(self.remote.as_ref()),
            )
            .await?;

        let mut frozen = 0;
        let mut tail = Vec::new();
        if marker_before > 0 {
            let last = self.codec.group_index(marker_before - 1);
            let mut expected = marker_before - self.codec.group_start(last);
            let mut candidate = Some(last);
            while let Some(index) = candidate {
                let Some(mut records) = self.fetch_group(index, token).await? else {
                    tracing::warn!(
                        key = %group_key(index),
                        marker = marker_before,
                        "Group missing below index marker"
                    );
                    candidate = self.contiguous_groups_below(index, token).await?;
                    expected = self.codec.group_size();
                    continue;
                };

                let available = (records.len() as u64).min(expected);
                if available < expected {
                    tracing::warn!(
                        key = %group_key(index),
                        expected,
                        available,
                        "Tail group shorter than index marker implies"
                    );
                }
                records.truncate(available as usize);
                frozen = self.codec.group_start(index) + available;
                tail = records;
                break;
            }
        }

        // A complete tail group is durable; only a partial one is buffered.
        let buffered = if self.codec.is_aligned(frozen) {
            Vec::new()
        } else {
            tail
        };
        let buffer =
            WriteBuffer::with_records(self.codec, self.codec.align_down(frozen), buffered)?;

        let first_orphan = if frozen == 0 {
            0
        } else {
            self.codec.group_index(frozen - 1) + 1
        };
        let orphans_deleted = self.delete_groups_from(first_orphan, token).await?;
        if orphans_deleted > 0 {
            tracing::warn!(orphans_deleted, first_orphan, "Deleted orphaned groups");
        }

        if frozen != marker_before {
            tracing::warn!(
                marker_before,
                marker_after = frozen,
                "Lowering index marker to recovered length"
            );
            self.guarded(
                None,
                "put",
                INDEX_MARKER_KEY,
                marker::write_marker(self.remote.as_ref(), frozen),
            )
            .await?;
        }

        state.buffer = buffer;
        state.marker = frozen;
        state.generation += 1;
        state.pending_cleanup = None;
        self.cache.invalidate();
        self.publish(state);

        Ok(RepairReport {
            marker_before,
            marker_after: frozen,
            buffered: state.buffer.len(),
            orphans_deleted,
        })
    }

    /// Final flush before shutdown.
    pub async fn close(&self) -> Result<()> {
        self.sync().await?;
        tracing::info!(frozen = self.ancients(), "Freezer closed");
        Ok(())
    }

    /// Spawn a task that syncs every `sync_interval` until `token` is cancelled.
    ///
    /// Failures are logged and retried on the next tick; a failed Sync leaves
    /// the buffer intact.
    pub fn start_background_sync(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let interval = self.config.sync_interval();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("Background sync stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        tracing::trace!("Background sync tick");
                        match self.sync_with(&token).await {
                            Ok(()) | Err(Error::Cancelled(_)) => {}
                            Err(e) => {
                                tracing::error!(error = %e, "Background sync failed");
                            }
                        }
                    }
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn publish(&self, state: &WriterState) {
        let frozen = state.buffer.end();
        self.snapshot.store(Arc::new(ReadSnapshot {
            frozen,
            buffer: state.buffer.clone(),
            generation: state.generation,
        }));
        metrics::FROZEN_RECORDS.set(frozen as i64);
        metrics::BUFFERED_RECORDS.set(state.buffer.len() as i64);
    }

    async fn check_layout(&self) -> Result<()> {
        let configured = self.codec.group_size();

        let stored = self
            .guarded(None, "get", LAYOUT_KEY, marker::read_layout(self.remote.as_ref()))
            .await?;
        if let Some(layout) = stored {
            if layout.group_size != configured {
                return Err(Error::GroupSizeMismatch {
                    stored: layout.group_size,
                    configured,
                });
            }
            return Ok(());
        }

        // No layout yet: either a new dataset or one that predates the layout blob.
        let frozen = self
            .guarded(
                None,
                "get",
                INDEX_MARKER_KEY,
                marker::read_marker(self.remote.as_ref()),
            )
            .await?;
        if frozen > 0 {
            // Without group 0 the group size cannot be verified; adopt and delete nothing.
            let Some(first) = self.fetch_group(0, None).await? else {
                return Err(Error::Corrupt(format!(
                    "{} missing with index marker at {frozen} and no {LAYOUT_KEY}; \
                     refusing to adopt a dataset of unknown group size",
                    group_key(0)
                )));
            };
            let len = first.len() as u64;
            if len > configured || (frozen >= configured && len != configured) {
                return Err(Error::GroupSizeMismatch {
                    stored: len,
                    configured,
                });
            }
            if len < frozen.min(configured) {
                return Err(Error::Corrupt(format!(
                    "{} holds {len} records with index marker at {frozen}",
                    group_key(0)
                )));
            }
        }

        self.guarded(
            None,
            "put",
            LAYOUT_KEY,
            marker::write_layout(self.remote.as_ref(), DatasetLayout::new(configured)),
        )
        .await?;
        tracing::info!(group_size = configured, "Recorded dataset layout");

        Ok(())
    }

    async fn fetch_group(
        &self,
        index: u64,
        token: Option<&CancellationToken>,
    ) -> Result<Option<Vec<AncientRecord>>> {
        let key = group_key(index);
        let data = self
            .guarded(token, "get", &key, self.remote.get(&key))
            .await?;

        match data {
            Some(bytes) => {
                metrics::BYTES_READ_TOTAL.inc_by(bytes.len() as u64);
                tracing::debug!(key = %key, size = bytes.len(), "Fetched group");
                decode_group(&key, &bytes).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn upload_groups(
        &self,
        uploads: Vec<(String, Bytes)>,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        stream::iter(uploads)
            .map(|(key, data)| async move {
                let size = data.len() as u64;
                self.guarded(token, "put", &key, self.remote.put(&key, data))
                    .await?;
                metrics::GROUPS_UPLOADED_TOTAL.inc();
                metrics::BYTES_WRITTEN_TOTAL.inc_by(size);
                tracing::debug!(key = %key, size, "Uploaded group");
                Ok::<(), Error>(())
            })
            .buffer_unordered(self.config.upload_concurrency)
            .try_collect::<Vec<()>>()
            .await?;

        Ok(())
    }

    /// Delete every group with index `first_index` or higher.
    ///
    /// Lists page by page until the store reports no continuation.
    async fn delete_groups_from(
        &self,
        first_index: u64,
        token: Option<&CancellationToken>,
    ) -> Result<usize> {
        let mut start_after = first_index.checked_sub(1).map(group_key);
        let mut deleted = 0;
        let mut pages = 0;

        loop {
            let page = self
                .guarded(
                    token,
                    "list",
                    GROUPS_PREFIX,
                    self.remote.list(
                        GROUPS_PREFIX,
                        start_after.as_deref(),
                        self.config.list_page_size,
                    ),
                )
                .await?;
            pages += 1;

            let doomed: Vec<String> = page
                .keys
                .iter()
                .filter(|key| parse_group_key(key).is_some_and(|index| index >= first_index))
                .cloned()
                .collect();

            if !doomed.is_empty() {
                let count = doomed.len();
                let outcomes = self
                    .guarded(token, "delete", GROUPS_PREFIX, self.remote.batch_delete(doomed))
                    .await?;
                for (key, outcome) in outcomes {
                    if let Err(e) = outcome {
                        tracing::error!(key = %key, error = %e, "Group delete failed");
                        return Err(e);
                    }
                }
                deleted += count;
                metrics::GROUPS_DELETED_TOTAL.inc_by(count as u64);
            }

            match page.continuation {
                Some(next) => start_after = Some(next),
                None => break,
            }
        }

        tracing::debug!(first_index, deleted, pages, "Deleted groups");
        Ok(deleted)
    }

    /// Highest group index below `limit` such that every group from 0 up to it
    /// is present, found with one paginated listing pass.
    async fn contiguous_groups_below(
        &self,
        limit: u64,
        token: Option<&CancellationToken>,
    ) -> Result<Option<u64>> {
        let mut start_after: Option<String> = None;
        let mut next = 0;

        'pages: loop {
            let page = self
                .guarded(
                    token,
                    "list",
                    GROUPS_PREFIX,
                    self.remote.list(
                        GROUPS_PREFIX,
                        start_after.as_deref(),
                        self.config.list_page_size,
                    ),
                )
                .await?;

            for index in page.keys.iter().filter_map(|key| parse_group_key(key)) {
                if index != next || index >= limit {
                    break 'pages;
                }
                next += 1;
            }

            match page.continuation {
                Some(key) => start_after = Some(key),
                None => break,
            }
        }

        if next < limit {
            tracing::warn!(first_gap = next, limit, "Group sequence has a gap");
        }
        Ok(next.checked_sub(1))
    }

    async fn finish_cleanup(
        &self,
        state: &mut WriterState,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        if let Some(first_index) = state.pending_cleanup {
            self.delete_groups_from(first_index, token).await?;
            state.pending_cleanup = None;
        }
        Ok(())
    }

    /// Run one remote call under the configured deadline and the caller's token.
    async fn guarded<T, F>(
        &self,
        token: Option<&CancellationToken>,
        op: &'static str,
        key: &str,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        metrics::REMOTE_REQUESTS_TOTAL.with_label_values(&[op]).inc();
        let start = Instant::now();

        let deadline = self.config.remote_timeout();
        let bounded = async {
            match deadline {
                Some(limit) => match time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout {
                        op,
                        key: key.to_string(),
                    }),
                },
                None => call.await,
            }
        };

        let result = match token {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(Error::Cancelled(op)),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        };

        metrics::REMOTE_LATENCY
            .with_label_values(&[op])
            .observe(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            metrics::REMOTE_ERRORS_TOTAL
                .with_label_values(&[op, e.kind_label()])
                .inc();
            match e {
                Error::Cancelled(_) => tracing::debug!(op, key, "Remote call cancelled"),
                _ => tracing::error!(op, key, error = %e, "Remote call failed"),
            }
        }

        result
    }
}

fn cleanup_pending(frozen: u64, source: Error) -> Error {
    Error::CleanupPending {
        frozen,
        source: Box::new(source),
    }
}
