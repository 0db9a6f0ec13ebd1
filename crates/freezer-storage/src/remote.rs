//! Remote Store Adapter
//!
//! The freezer only needs five things from blob storage: get, put, a paged
//! listing, batch delete and (idempotent) container setup. `RemoteStore`
//! captures exactly that surface so the facade never depends on a concrete
//! client, and tests can substitute adapters that fail or stall on demand.
//!
//! ## Pagination
//!
//! `list` returns at most `max_keys` keys in lexicographic order plus a
//! continuation token. The token is the last key of the page; passing it back
//! as `start_after` resumes the listing. A `None` continuation means the
//! listing is complete. S3 and `InMemory` list in key order; the local
//! filesystem does not, and must be wrapped with `with_unordered_listing`.
//! Callers that act on a listing (truncation, orphan cleanup) must loop until
//! the continuation is `None`.
//!
//! ## ObjectStoreRemote
//!
//! The production adapter wraps any `object_store::ObjectStore` (S3, MinIO,
//! local filesystem, in-memory). `object_store` backends cannot provision
//! buckets, so `create_container` verifies the container is reachable and
//! treats an existing one as success.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use object_store::path::Path;
use object_store::ObjectStore;
use std::sync::Arc;

/// One page of a key listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys on this page, ascending.
    pub keys: Vec<String>,

    /// Resume token for the next page; `None` once the listing is exhausted.
    pub continuation: Option<String>,
}

/// Per-key outcome of a batch delete.
pub type DeleteOutcome = (String, Result<()>);

#[async_trait]
pub trait RemoteStore: Send + Sync + std::fmt::Debug {
    /// Fetch a blob. A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a blob, replacing any previous value.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// List keys under `prefix` strictly after `start_after`.
    async fn list(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage>;

    /// Delete keys; deleting an absent key succeeds.
    async fn batch_delete(&self, keys: Vec<String>) -> Result<Vec<DeleteOutcome>>;

    /// Make sure the container exists. Must tolerate "already exists".
    async fn create_container(&self) -> Result<()>;
}

/// `RemoteStore` over an `object_store` backend.
#[derive(Debug, Clone)]
pub struct ObjectStoreRemote {
    store: Arc<dyn ObjectStore>,
    delete_concurrency: usize,
    ordered_listing: bool,
}

impl ObjectStoreRemote {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            delete_concurrency: 10,
            ordered_listing: true,
        }
    }

    /// For backends whose listings are not lexicographically ordered
    /// (`LocalFileSystem`). Each page then drains and sorts the full listing.
    pub fn with_unordered_listing(mut self) -> Self {
        self.ordered_listing = false;
        self
    }

    /// Maximum deletes in flight per batch (default: 10).
    pub fn with_delete_concurrency(mut self, concurrency: usize) -> Self {
        self.delete_concurrency = concurrency.max(1);
        self
    }
}

#[async_trait]
impl RemoteStore for ObjectStoreRemote {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = Path::from(key);
        match self.store.get(&path).await {
            Ok(result) => {
                let data = result
                    .bytes()
                    .await
                    .map_err(|e| Error::remote("get", key, e))?;
                Ok(Some(data))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(Error::remote("get", key, e)),
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = Path::from(key);
        self.store
            .put(&path, data)
            .await
            .map_err(|e| Error::remote("put", key, e))?;
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage> {
        let prefix_path = Path::from(prefix.trim_end_matches('/'));
        let mut listing = match start_after {
            Some(offset) => self
                .store
                .list_with_offset(Some(&prefix_path), &Path::from(offset)),
            None => self.store.list(Some(&prefix_path)),
        };

        // Read one key past the page to learn whether another page exists.
        // Unordered backends have to be drained before the page can be cut.
        let max_keys = max_keys.max(1);
        let mut keys = Vec::with_capacity(max_keys.min(1024) + 1);
        while let Some(meta) = listing.next().await {
            let meta = meta.map_err(|e| Error::remote("list", prefix, e))?;
            keys.push(meta.location.to_string());
            if self.ordered_listing && keys.len() > max_keys {
                break;
            }
        }
        keys.sort();

        let continuation = if keys.len() > max_keys {
            keys.truncate(max_keys);
            keys.last().cloned()
        } else {
            None
        };

        Ok(ListPage { keys, continuation })
    }

    async fn batch_delete(&self, keys: Vec<String>) -> Result<Vec<DeleteOutcome>> {
        let outcomes = stream::iter(keys)
            .map(|key| async move {
                let path = Path::from(key.as_str());
                let result = match self.store.delete(&path).await {
                    Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                    Err(e) => Err(Error::remote("delete", &key, e)),
                };
                (key, result)
            })
            .buffer_unordered(self.delete_concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(outcomes)
    }

    async fn create_container(&self) -> Result<()> {
        self.store
            .list_with_delimiter(None)
            .await
            .map_err(|e| Error::remote("create_container", "/", e))?;
        tracing::debug!("Remote container reachable");
        Ok(())
    }
}
