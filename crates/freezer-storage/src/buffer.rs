//! Write Buffer
//!
//! The in-memory tail of the dataset: records `[start, start + len)` that are
//! not yet (fully) durable remotely. `start` is always a group boundary, so
//! the buffer is stored as a list of group-sized chunks that line up with
//! the remote blobs they will be flushed to.
//!
//! ## Snapshots
//!
//! Chunks are `Arc`-shared. Cloning a `WriteBuffer` copies only the chunk
//! pointers, which is how the facade publishes an immutable view for readers
//! after every mutation. Mutating the writer's copy afterwards goes through
//! `Arc::make_mut`, so a published snapshot is never modified in place; at
//! most the last (partial) chunk is copied.

use crate::error::{Error, Result};
use crate::group::GroupCodec;
use freezer_core::AncientRecord;
use std::sync::Arc;

/// Upper bound on the slots reserved for a fresh chunk.
const CHUNK_PREALLOC: usize = 1024;

#[derive(Debug, Clone)]
pub struct WriteBuffer {
    codec: GroupCodec,
    start: u64,
    len: u64,
    chunks: Vec<Arc<Vec<AncientRecord>>>,
}

impl WriteBuffer {
    /// Empty buffer whose first record will be `start`.
    pub fn new(codec: GroupCodec, start: u64) -> Result<Self> {
        if !codec.is_aligned(start) {
            return Err(Error::Corrupt(format!(
                "write buffer start {start} is not aligned to group size {}",
                codec.group_size()
            )));
        }
        Ok(Self {
            codec,
            start,
            len: 0,
            chunks: Vec::new(),
        })
    }

    /// Buffer pre-filled with `records` starting at `start`.
    pub fn with_records(
        codec: GroupCodec,
        start: u64,
        records: impl IntoIterator<Item = AncientRecord>,
    ) -> Result<Self> {
        let mut buffer = Self::new(codec, start)?;
        for record in records {
            buffer.push(record);
        }
        Ok(buffer)
    }

    /// First buffered sequence number (the durable-prefix length).
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last buffered sequence number; equals the frozen count.
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, number: u64) -> bool {
        number >= self.start && number < self.end()
    }

    pub fn push(&mut self, record: AncientRecord) {
        let group_size = self.codec.group_size();
        match self.chunks.last_mut() {
            Some(chunk) if (chunk.len() as u64) < group_size => Arc::make_mut(chunk).push(record),
            _ => {
                let capacity = group_size.min(CHUNK_PREALLOC as u64) as usize;
                let mut chunk = Vec::with_capacity(capacity);
                chunk.push(record);
                self.chunks.push(Arc::new(chunk));
            }
        }
        self.len += 1;
    }

    pub fn get(&self, number: u64) -> Option<&AncientRecord> {
        if !self.contains(number) {
            return None;
        }
        let local = number - self.start;
        let group_size = self.codec.group_size();
        self.chunks
            .get((local / group_size) as usize)?
            .get((local % group_size) as usize)
    }

    /// Drop every record numbered `target` or higher.
    pub fn truncate(&mut self, target: u64) {
        if target >= self.end() {
            return;
        }
        let keep = target.saturating_sub(self.start);
        let group_size = self.codec.group_size();
        let full = (keep / group_size) as usize;
        let partial = (keep % group_size) as usize;

        if partial == 0 {
            self.chunks.truncate(full);
        } else {
            self.chunks.truncate(full + 1);
            if let Some(last) = self.chunks.last_mut() {
                Arc::make_mut(last).truncate(partial);
            }
        }
        self.len = keep;
    }

    /// Buffered groups as `(group_index, records)`, ascending.
    pub fn groups(&self) -> impl Iterator<Item = (u64, &[AncientRecord])> + '_ {
        let first = self.codec.group_index(self.start);
        self.chunks
            .iter()
            .enumerate()
            .map(move |(i, chunk)| (first + i as u64, chunk.as_slice()))
    }

    /// After a successful flush: forget full groups, keep the partial tail.
    ///
    /// The buffer ends up holding `len % group_size` records.
    pub fn retain_remainder(&mut self) {
        let group_size = self.codec.group_size();
        let remainder = self.len % group_size;
        let full = (self.len / group_size) as usize;

        self.chunks.drain(..full);
        self.start += full as u64 * group_size;
        self.len = remainder;
    }
}
