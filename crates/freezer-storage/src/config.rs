//! Freezer Configuration
//!
//! This module defines configuration for the freezer facade.
//!
//! ## FreezerConfig
//!
//! - **group_size**: Records per remote group blob (default: 32, at most
//!   `MAX_GROUP_SIZE`). Fixed when a dataset is created; the freezer refuses
//!   to open a dataset whose stored layout disagrees.
//! - **upload_concurrency**: Group uploads in flight during Sync (default: 10)
//! - **list_page_size**: Keys requested per listing page (default: 1000)
//! - **remote_timeout_ms**: Optional deadline applied to every remote call
//! - **sync_interval_ms**: Period of the background sync loop (default: 60s)
//!
//! ## Usage
//!
//! ```ignore
//! use freezer_storage::FreezerConfig;
//!
//! // Defaults overlaid with FREEZER_* environment variables
//! let config = FreezerConfig::from_env()?;
//!
//! // Small groups for tests
//! let config = FreezerConfig {
//!     group_size: 4,
//!     ..Default::default()
//! };
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest accepted group size. A group is read and written as one blob.
pub const MAX_GROUP_SIZE: u64 = 1 << 20;

/// Environment variable overriding the group size.
pub const ENV_GROUP_SIZE: &str = "FREEZER_GROUP_SIZE";
pub const ENV_UPLOAD_CONCURRENCY: &str = "FREEZER_UPLOAD_CONCURRENCY";
pub const ENV_LIST_PAGE_SIZE: &str = "FREEZER_LIST_PAGE_SIZE";
pub const ENV_REMOTE_TIMEOUT_MS: &str = "FREEZER_REMOTE_TIMEOUT_MS";
pub const ENV_SYNC_INTERVAL_MS: &str = "FREEZER_SYNC_INTERVAL_MS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FreezerConfig {
    /// Records per group blob (default: 32)
    #[serde(default = "default_group_size")]
    pub group_size: u64,

    /// Maximum concurrent group uploads during Sync (default: 10)
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    /// Keys requested per listing page when deleting groups (default: 1000)
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,

    /// Per-call remote deadline in milliseconds (None = no deadline)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_timeout_ms: Option<u64>,

    /// Background sync period in milliseconds (default: 60s)
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
}

impl Default for FreezerConfig {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            upload_concurrency: default_upload_concurrency(),
            list_page_size: default_list_page_size(),
            remote_timeout_ms: None,
            sync_interval_ms: default_sync_interval_ms(),
        }
    }
}

impl FreezerConfig {
    /// Defaults overlaid with `FREEZER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`FreezerConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, ENV_GROUP_SIZE)? {
            config.group_size = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_UPLOAD_CONCURRENCY)? {
            config.upload_concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_LIST_PAGE_SIZE)? {
            config.list_page_size = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_REMOTE_TIMEOUT_MS)? {
            config.remote_timeout_ms = Some(v);
        }
        if let Some(v) = parse_var(&lookup, ENV_SYNC_INTERVAL_MS)? {
            config.sync_interval_ms = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_size == 0 {
            return Err(Error::InvalidConfig("group_size must be > 0".to_string()));
        }
        if self.group_size > MAX_GROUP_SIZE {
            return Err(Error::InvalidConfig(format!(
                "group_size must be <= {MAX_GROUP_SIZE}, got {}",
                self.group_size
            )));
        }
        if self.upload_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "upload_concurrency must be > 0".to_string(),
            ));
        }
        if self.list_page_size == 0 {
            return Err(Error::InvalidConfig(
                "list_page_size must be > 0".to_string(),
            ));
        }
        if self.remote_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig(
                "remote_timeout_ms must be > 0 when set".to_string(),
            ));
        }
        if self.sync_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "sync_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn remote_timeout(&self) -> Option<Duration> {
        self.remote_timeout_ms.map(Duration::from_millis)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("{name}={raw:?}: {e}"))),
    }
}

fn default_group_size() -> u64 {
    32
}

fn default_upload_concurrency() -> usize {
    10
}

fn default_list_page_size() -> usize {
    1000 // S3 ListObjects page maximum
}

fn default_sync_interval_ms() -> u64 {
    60 * 1000 // 1 minute
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FreezerConfig::default();
        assert_eq!(config.group_size, 32);
        assert_eq!(config.upload_concurrency, 10);
        assert_eq!(config.list_page_size, 1000);
        assert!(config.remote_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let config = FreezerConfig::from_lookup(lookup(&[
            (ENV_GROUP_SIZE, "64"),
            (ENV_REMOTE_TIMEOUT_MS, "2500"),
        ]))
        .unwrap();
        assert_eq!(config.group_size, 64);
        assert_eq!(config.remote_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.upload_concurrency, 10);
    }

    #[test]
    fn test_malformed_env_value_rejected() {
        let err = FreezerConfig::from_lookup(lookup(&[(ENV_GROUP_SIZE, "thirty-two")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains(ENV_GROUP_SIZE)));
    }

    #[test]
    fn test_zero_group_size_rejected() {
        let err = FreezerConfig::from_lookup(lookup(&[(ENV_GROUP_SIZE, "0")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_oversized_group_size_rejected() {
        let err = FreezerConfig::from_lookup(lookup(&[(ENV_GROUP_SIZE, "1099511627776")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("group_size")));

        let at_limit = FreezerConfig {
            group_size: MAX_GROUP_SIZE,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let config: FreezerConfig = serde_json::from_str(r#"{"group_size": 8}"#).unwrap();
        assert_eq!(config.group_size, 8);
        assert_eq!(config.list_page_size, 1000);
        assert_eq!(config.sync_interval_ms, 60_000);
    }
}
