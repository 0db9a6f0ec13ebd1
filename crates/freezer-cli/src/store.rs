//! Remote selection for freezerctl

use anyhow::{Context, Result};
use freezer_storage::{ObjectStoreRemote, RemoteStore};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub enum Backend {
    Local(PathBuf),
    S3 {
        bucket: String,
        endpoint: Option<String>,
        region: Option<String>,
    },
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local(dir) => write!(f, "{}", dir.display()),
            Backend::S3 { bucket, .. } => write!(f, "s3://{bucket}"),
        }
    }
}

pub fn build_remote(backend: &Backend) -> Result<Arc<dyn RemoteStore>> {
    let remote = match backend {
        Backend::Local(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let store = LocalFileSystem::new_with_prefix(dir)
                .with_context(|| format!("Failed to open {}", dir.display()))?;
            ObjectStoreRemote::new(Arc::new(store)).with_unordered_listing()
        }
        Backend::S3 {
            bucket,
            endpoint,
            region,
        } => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(endpoint) = endpoint {
                builder = builder.with_endpoint(endpoint).with_allow_http(true);
            }
            if let Some(region) = region {
                builder = builder.with_region(region);
            }
            let store = builder.build().context("Failed to configure S3 client")?;
            ObjectStoreRemote::new(Arc::new(store))
        }
    };

    Ok(Arc::new(remote))
}
