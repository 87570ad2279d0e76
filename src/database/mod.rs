//! The package database.
//!
//! Owns the registered fetchers, search providers and script fetchers, and
//! the merged name -> package index built from every fetcher's packages.
//!
//! # Structure
//!
//! - `fetch` - one-shot bulk fetch that rebuilds the index
//! - `refresh` - continuous background refresh that merges into the index

mod fetch;
mod refresh;

use anyhow::{Context, Result};
use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::Cache;
use crate::error::DatabaseError;
use crate::fetcher::{Fetch, FetchEnvironment, FetcherStatus, RepositoryFetcher};
use crate::package::{Package, PackageName};
use crate::script::{BuildScript, ScriptFetcher, ScriptSource};
use crate::search::{Search, SearchProvider};

pub use refresh::RefreshHandle;

/// Behavior switches of a [`PackageDatabase`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseOptions {
    /// Bypass fresh cache entries on bulk fetch.
    pub force_refresh: bool,
    /// Fetch one repository at a time, in registration order.
    pub no_parallel: bool,
    /// Accept repositories read from the local filesystem.
    pub allow_local: bool,
}

pub struct PackageDatabase {
    fetchers: Vec<Arc<RepositoryFetcher>>,
    script_fetchers: Vec<ScriptFetcher>,
    search_providers: Vec<SearchProvider>,
    index: Mutex<HashMap<String, Arc<Package>>>,
    env: FetchEnvironment,
    options: DatabaseOptions,
}

impl PackageDatabase {
    pub fn new(options: DatabaseOptions) -> Self {
        Self::with_environment(options, FetchEnvironment::default())
    }

    pub fn with_environment(options: DatabaseOptions, env: FetchEnvironment) -> Self {
        Self {
            fetchers: Vec::new(),
            script_fetchers: Vec::new(),
            search_providers: Vec::new(),
            index: Mutex::new(HashMap::new()),
            env,
            options,
        }
    }

    pub fn options(&self) -> DatabaseOptions {
        self.options
    }

    /// Attach the persistent cache used by every fetch.
    pub fn set_cache(&mut self, cache: Arc<dyn Cache>) {
        self.env.cache = Some(cache);
    }

    pub fn set_cache_ttl(&mut self, ttl: std::time::Duration) {
        self.env.cache_ttl = ttl;
    }

    /// Register a repository. Registration order is search order.
    pub fn add_repository_fetcher(
        &mut self,
        distro: impl Into<String>,
        source: Arc<dyn Fetch>,
    ) -> Arc<RepositoryFetcher> {
        let fetcher = Arc::new(RepositoryFetcher::new(distro, source));
        debug!("Registered fetcher {} ({})", fetcher, fetcher.key());
        self.fetchers.push(Arc::clone(&fetcher));
        fetcher
    }

    pub fn add_search_provider(&mut self, distro: impl Into<String>, provider: Arc<dyn Search>) {
        self.search_providers
            .push(SearchProvider::new(distro, provider));
    }

    pub fn add_script_fetcher(&mut self, name: impl Into<String>, source: Arc<dyn ScriptSource>) {
        self.script_fetchers.push(ScriptFetcher::new(name, source));
    }

    pub fn fetchers(&self) -> &[Arc<RepositoryFetcher>] {
        &self.fetchers
    }

    /// Find packages matching `query`; `max_results == 0` means unbounded.
    ///
    /// Fetchers are scanned in registration order and packages in fetcher
    /// order, stopping as soon as `max_results` is reached. Search providers
    /// are only consulted when the scan finds nothing.
    #[tracing::instrument(skip(self))]
    pub async fn search(&self, query: &PackageName, max_results: usize) -> Result<Vec<Arc<Package>>> {
        debug!("search {}", query);

        let mut ret = Vec::new();

        'fetchers: for fetcher in &self.fetchers {
            if !fetcher.matches(query) {
                continue;
            }

            for pkg in fetcher.packages().iter() {
                if pkg.matches(query) {
                    ret.push(Arc::clone(pkg));
                    if max_results != 0 && ret.len() >= max_results {
                        break 'fetchers;
                    }
                }
            }
        }

        if ret.is_empty() {
            self.search_with_providers(query, max_results).await
        } else {
            Ok(ret)
        }
    }

    async fn search_with_providers(
        &self,
        query: &PackageName,
        max_results: usize,
    ) -> Result<Vec<Arc<Package>>> {
        match self
            .search_providers
            .iter()
            .find(|provider| provider.distribution() == query.distribution)
        {
            Some(provider) => provider.search(query, max_results).await,
            None => Ok(Vec::new()),
        }
    }

    /// Look up an indexed package by its full name.
    pub fn get(&self, key: &str) -> Option<Arc<Package>> {
        self.index().get(key).cloned()
    }

    /// Number of entries in the index.
    pub fn indexed_count(&self) -> usize {
        self.index().len()
    }

    /// Total number of packages across every fetcher.
    pub fn count(&self) -> usize {
        self.fetchers.iter().map(|f| f.package_count()).sum()
    }

    pub fn fetcher_status(&self) -> Vec<FetcherStatus> {
        self.fetchers.iter().map(|f| f.snapshot()).collect()
    }

    pub fn get_fetcher(&self, key: &str) -> Result<Arc<RepositoryFetcher>> {
        self.fetchers
            .iter()
            .find(|f| f.key() == key)
            .cloned()
            .ok_or_else(|| DatabaseError::FetcherNotFound(key.to_string()).into())
    }

    /// Stream every known name and alias as one JSON record per line.
    pub fn write_names<W: Write>(&self, mut w: W) -> Result<()> {
        for fetcher in &self.fetchers {
            for pkg in fetcher.packages().iter() {
                for name in pkg.names() {
                    serde_json::to_writer(&mut w, name).context("Failed to encode name")?;
                    w.write_all(b"\n")?;
                }
            }
        }
        w.flush()?;
        Ok(())
    }

    /// Primary names of every package, in fetcher order.
    pub fn all_names(&self) -> Vec<PackageName> {
        self.fetchers
            .iter()
            .flat_map(|f| {
                f.packages()
                    .iter()
                    .map(|pkg| pkg.name.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Sorted distributions known to any fetcher, including the empty one.
    pub fn distribution_list(&self) -> Vec<String> {
        let mut set = BTreeSet::from([String::new()]);
        for fetcher in &self.fetchers {
            set.extend(fetcher.distributions());
        }
        set.into_iter().collect()
    }

    /// Sorted architectures known to any fetcher, including the empty one.
    pub fn architecture_list(&self) -> Vec<String> {
        let mut set = BTreeSet::from([String::new()]);
        for fetcher in &self.fetchers {
            set.extend(fetcher.architectures());
        }
        set.into_iter().collect()
    }

    /// Run the script fetcher registered under `script.name`.
    #[tracing::instrument(skip(self))]
    pub async fn get_build_script(&self, script: &BuildScript) -> Result<serde_json::Value> {
        let fetcher = self
            .script_fetchers
            .iter()
            .find(|f| f.name() == script.name)
            .ok_or_else(|| DatabaseError::UnknownScript(script.name.clone()))?;

        fetcher
            .build(&script.args)
            .await
            .with_context(|| format!("build script {} failed", script.name))
    }

    /// Close the persistent cache, if one is attached.
    pub fn close(&self) -> Result<()> {
        match &self.env.cache {
            Some(cache) => cache.close(),
            None => Ok(()),
        }
    }

    fn index(&self) -> MutexGuard<'_, HashMap<String, Arc<Package>>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
