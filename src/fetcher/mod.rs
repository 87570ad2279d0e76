//! Repository fetchers.
//!
//! A [`RepositoryFetcher`] owns fetching and caching for one package source.
//! Its package list is replaced wholesale after every successful fetch; a
//! failed fetch leaves the previous list in place.

mod status;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::cache::{CachedListing, Cache, DEFAULT_CACHE_TTL};
use crate::package::{Package, PackageName};

pub use status::{FetchStatus, FetcherStatus};

/// Source callback of a repository fetcher.
///
/// Every call returns the complete package list of the source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Stable identity of the source (a URL, a path, ...).
    ///
    /// Feeds the cache key, so it must not change across process restarts.
    fn identity(&self) -> String;

    /// Fetch the full package list.
    async fn fetch(&self, key: &str, force: bool) -> Result<Vec<Package>>;
}

/// Collaborators a fetch runs against.
#[derive(Clone)]
pub struct FetchEnvironment {
    pub cache: Option<Arc<dyn Cache>>,
    pub cache_ttl: Duration,
}

impl FetchEnvironment {
    pub fn new(cache: Option<Arc<dyn Cache>>) -> Self {
        Self {
            cache,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

impl Default for FetchEnvironment {
    fn default() -> Self {
        Self::new(None)
    }
}

#[derive(Default)]
struct FetchState {
    status: FetchStatus,
    packages: Arc<Vec<Arc<Package>>>,
    last_updated: Option<DateTime<Utc>>,
    last_update_time: Duration,
    counter: u64,
    distributions: BTreeSet<String>,
    architectures: BTreeSet<String>,
}

pub struct RepositoryFetcher {
    distro: String,
    source: Arc<dyn Fetch>,
    key: String,
    state: Mutex<FetchState>,
    // Serializes fetches of this fetcher.
    fetch_lock: tokio::sync::Mutex<()>,
}

impl RepositoryFetcher {
    pub fn new(distro: impl Into<String>, source: Arc<dyn Fetch>) -> Self {
        let distro = distro.into();
        let key = fetcher_key(&distro, &source.identity());
        Self {
            distro,
            source,
            key,
            state: Mutex::new(FetchState::default()),
            fetch_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Distribution scope; empty means any.
    pub fn distro(&self) -> &str {
        &self.distro
    }

    /// Deterministic cache key derived from the distribution and source identity.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn status(&self) -> FetchStatus {
        self.state().status
    }

    /// The current package list. Cheap: shares the list, does not copy it.
    pub fn packages(&self) -> Arc<Vec<Arc<Package>>> {
        Arc::clone(&self.state().packages)
    }

    pub fn package_count(&self) -> usize {
        self.state().packages.len()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state().last_updated
    }

    pub fn last_update_time(&self) -> Duration {
        self.state().last_update_time
    }

    /// Number of successful package list replacements so far.
    pub fn counter(&self) -> u64 {
        self.state().counter
    }

    /// Distributions present in the current package list.
    pub fn distributions(&self) -> BTreeSet<String> {
        self.state().distributions.clone()
    }

    /// Architectures present in the current package list.
    pub fn architectures(&self) -> BTreeSet<String> {
        self.state().architectures.clone()
    }

    pub fn snapshot(&self) -> FetcherStatus {
        let state = self.state();
        FetcherStatus {
            key: self.key.clone(),
            name: self.to_string(),
            status: state.status,
            package_count: state.packages.len(),
            last_updated: state.last_updated,
            last_update_time: state.last_update_time,
        }
    }

    /// Cheap pre-filter: false when this fetcher cannot possibly satisfy `query`.
    pub fn matches(&self, query: &PackageName) -> bool {
        if !query.distribution.is_empty()
            && !self.distro.is_empty()
            && query.distribution != self.distro
        {
            return false;
        }

        if !query.architecture.is_empty() {
            let state = self.state();
            if !state.architectures.is_empty() && !state.architectures.contains(&query.architecture)
            {
                return false;
            }
        }

        true
    }

    /// Refresh the package list.
    ///
    /// Without `force`, a fresh cache entry under `key` is used instead of
    /// calling the source. On failure the previous package list is kept and
    /// the error is returned to the caller. A fetch dropped before it
    /// completes leaves the fetcher `Failed`.
    #[tracing::instrument(skip(self, env))]
    pub async fn fetch_with_key(&self, env: &FetchEnvironment, key: &str, force: bool) -> Result<()> {
        let _guard = self.fetch_lock.lock().await;
        let started = Instant::now();

        self.state().status = FetchStatus::Fetching;
        let _in_flight = InFlight { fetcher: self };

        if !force
            && let Some(cache) = &env.cache
        {
            match load_cached(cache.as_ref(), key, env.cache_ttl) {
                Ok(Some(listing)) => {
                    debug!("Using cached listing for {} from {}", self, listing.stored_at);
                    self.replace(
                        listing.packages,
                        FetchStatus::Cached,
                        listing.stored_at,
                        started.elapsed(),
                    );
                    return Ok(());
                }
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable cache entry for {}: {:#}", self, e),
            }
        }

        let packages = match self.source.fetch(key, force).await {
            Ok(packages) => packages,
            Err(e) => {
                self.state().status = FetchStatus::Failed;
                return Err(e);
            }
        };

        let listing = CachedListing::new(packages);
        if let Some(cache) = &env.cache
            && let Err(e) = listing.encode().and_then(|bytes| cache.put(key, &bytes))
        {
            warn!("Failed to cache listing for {}: {:#}", self, e);
        }

        let elapsed = started.elapsed();
        info!(
            "Fetched {} packages from {} in {}ms",
            listing.packages.len(),
            self,
            elapsed.as_millis()
        );
        self.replace(listing.packages, FetchStatus::Fresh, listing.stored_at, elapsed);

        Ok(())
    }

    fn replace(
        &self,
        packages: Vec<Package>,
        status: FetchStatus,
        updated: DateTime<Utc>,
        elapsed: Duration,
    ) {
        let mut distributions = BTreeSet::new();
        let mut architectures = BTreeSet::new();
        for pkg in &packages {
            if !pkg.name.distribution.is_empty() {
                distributions.insert(pkg.name.distribution.clone());
            }
            if !pkg.name.architecture.is_empty() {
                architectures.insert(pkg.name.architecture.clone());
            }
        }
        if !self.distro.is_empty() {
            distributions.insert(self.distro.clone());
        }

        let packages: Vec<Arc<Package>> = packages.into_iter().map(Arc::new).collect();

        let mut state = self.state();
        state.packages = Arc::new(packages);
        state.status = status;
        state.last_updated = Some(updated);
        state.last_update_time = elapsed;
        state.counter += 1;
        state.distributions = distributions;
        state.architectures = architectures;
    }

    fn state(&self) -> MutexGuard<'_, FetchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles the status of a fetch that is cancelled while `Fetching`.
struct InFlight<'a> {
    fetcher: &'a RepositoryFetcher,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.fetcher.state();
        if state.status == FetchStatus::Fetching {
            state.status = FetchStatus::Failed;
            drop(state);
            debug!("Fetch of {} was cancelled", self.fetcher);
        }
    }
}

impl fmt::Display for RepositoryFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.distro.is_empty() {
            write!(f, "{}", self.source.identity())
        } else {
            write!(f, "{} [{}]", self.source.identity(), self.distro)
        }
    }
}

fn load_cached(cache: &dyn Cache, key: &str, ttl: Duration) -> Result<Option<CachedListing>> {
    let Some(bytes) = cache.get(key)? else {
        return Ok(None);
    };
    let listing = CachedListing::decode(&bytes)?;
    if listing.is_fresh(ttl, Utc::now()) {
        Ok(Some(listing))
    } else {
        debug!("Cached listing under {} expired at {}", key, listing.stored_at);
        Ok(None)
    }
}

fn fetcher_key(distro: &str, identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(distro.as_bytes());
    hasher.update([0u8]);
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
}
