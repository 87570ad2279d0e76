//! Persistent fetch cache.
//!
//! The database only needs get/put by key and a closeable handle; what is
//! stored under a key is a [`CachedListing`] encoded as JSON.

mod file;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::package::Package;

pub use file::FileCache;

/// Default age after which a cached listing is no longer fresh.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Key/value store for fetch results.
#[cfg_attr(test, mockall::automock)]
pub trait Cache: Send + Sync {
    /// Look up the bytes stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Close the handle. Every later operation fails.
    fn close(&self) -> Result<()>;
}

/// A fetcher's package list as it was at `stored_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedListing {
    pub stored_at: DateTime<Utc>,
    pub packages: Vec<Package>,
}

impl CachedListing {
    pub fn new(packages: Vec<Package>) -> Self {
        Self {
            stored_at: Utc::now(),
            packages,
        }
    }

    /// Check whether the listing is younger than `ttl` at `now`.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.stored_at).to_std() {
            Ok(age) => age < ttl,
            // stored_at lies in the future
            Err(_) => true,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to encode cached listing")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to decode cached listing")
    }
}
