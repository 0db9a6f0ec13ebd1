//! Freezer Storage Layer
//!
//! This crate keeps an append-only sequence of ancient records in S3-compatible
//! object storage. Records are numbered from zero with no gaps; the newest ones
//! live in an in-memory write buffer until a Sync flushes them in fixed-size
//! groups, one blob per group.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────┐
//! │   Caller    │  append(n, record) / ancient(kind, n)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌──────────────────┐      ┌───────────────┐
//! │ Freezer          │─────►│ ReadCache     │  last fetched group
//! │ - WriteBuffer    │      └───────────────┘
//! │ - ReadSnapshot   │
//! └────────┬─────────┘
//!          │ group blobs + index marker
//!          ▼
//! ┌──────────────────┐
//! │ RemoteStore      │  ObjectStoreRemote (S3, MinIO, local dir, memory)
//! └──────────────────┘
//! ```
//!
//! ## Remote Layout
//!
//! | Key | Contents |
//! |-----|----------|
//! | `blocks/{index:09}.json` | JSON array of up to `group_size` records |
//! | `index-marker` | Durable frozen count, decimal text |
//! | `freezer-layout` | `{"version":1,"group_size":N}` |
//!
//! ## Main Components
//!
//! ### Freezer
//! The facade. Serializes mutations on one async mutex and publishes an
//! immutable snapshot for lock-free reads after each one.
//!
//! ### WriteBuffer
//! Group-aligned in-memory tail. After a Sync it holds `len % group_size`
//! records; a flush never leaves a gap in the remote sequence.
//!
//! ### RemoteStore
//! Minimal get / put / paginated list / batch delete surface, implemented on
//! top of `object_store` so tests run against `InMemory`.
//!
//! ## Usage Example
//!
//! ```ignore
//! use freezer_storage::{Freezer, FreezerConfig, ObjectStoreRemote};
//! use freezer_core::{AncientRecord, FieldKind};
//! use object_store::memory::InMemory;
//! use std::sync::Arc;
//!
//! let remote = Arc::new(ObjectStoreRemote::new(Arc::new(InMemory::new())));
//! let freezer = Freezer::open(remote, FreezerConfig::default()).await?;
//!
//! freezer.append(0, record).await?;
//! freezer.sync().await?;
//!
//! let header = freezer.ancient(FieldKind::Header, 0).await?;
//! ```
//!
//! ## Durability
//!
//! Only the index marker is trusted after a restart. Records appended since
//! the last successful Sync are lost on a crash, and `open` reconciles the
//! marker with the groups actually present before serving reads.

pub mod buffer;
pub mod cache;
pub mod config;
pub mod error;
pub mod freezer;
pub mod group;
pub mod marker;
pub mod remote;

pub use buffer::WriteBuffer;
pub use cache::{CacheStats, ReadCache};
pub use config::{FreezerConfig, MAX_GROUP_SIZE};
pub use error::{Error, Result};
pub use freezer::{Freezer, FreezerStatus, RepairReport};
pub use group::{group_key, GroupCodec};
pub use remote::{ListPage, ObjectStoreRemote, RemoteStore};
pub use tokio_util::sync::CancellationToken;
