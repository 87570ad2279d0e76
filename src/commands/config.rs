use anyhow::{Context, Result};
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    cache::FileCache,
    database::{DatabaseOptions, PackageDatabase},
    error::DatabaseError,
    http::HttpClient,
    runtime::Runtime,
    source::{FileIndexSource, HttpIndexSource, HttpScriptSource, HttpSearchProvider},
};

/// Repositories, search providers and build scripts to register, in order.
#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
    #[serde(default)]
    pub search_providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub scripts: Vec<ScriptEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryEntry {
    #[serde(default)]
    pub distro: String,
    pub url: Option<String>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub distro: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ScriptEntry {
    pub name: String,
    pub url: String,
}

impl Manifest {
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid manifest {}", path.display()))
    }
}

/// Settings shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub manifest: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub cache_ttl: Option<Duration>,
    pub options: DatabaseOptions,
}

pub struct Config<R: Runtime> {
    pub runtime: R,
    pub http_client: HttpClient,
}

impl<R: Runtime> Config<R> {
    pub fn new(runtime: R) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Ok(token) = runtime.env_var("PKGDB_TOKEN")
            && !token.is_empty()
        {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
            debug!("Using PKGDB_TOKEN for authentication ({} chars)", token.len());
        }

        let client = Client::builder()
            .user_agent(concat!("pkgdb/", env!("PKGDB_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            runtime,
            http_client: HttpClient::new(client),
        })
    }
}

impl<R: Runtime + Clone + 'static> Config<R> {
    /// Build a database from the manifest and settings, without fetching.
    pub fn open_database(&self, settings: &Settings) -> Result<PackageDatabase> {
        let manifest = Manifest::load(&self.runtime, &settings.manifest)?;
        let base = settings.manifest.parent().unwrap_or(Path::new(""));

        let mut db = PackageDatabase::new(settings.options);

        let cache_dir = match &settings.cache_dir {
            Some(dir) => dir.clone(),
            None => default_cache_dir(&self.runtime)?,
        };
        let cache = FileCache::open(self.runtime.clone(), cache_dir)?;
        db.set_cache(Arc::new(cache));
        if let Some(ttl) = settings.cache_ttl {
            db.set_cache_ttl(ttl);
        }

        for entry in manifest.repositories {
            match (entry.url, entry.path) {
                (Some(url), None) => {
                    let source = HttpIndexSource::new(self.http_client.clone(), url);
                    db.add_repository_fetcher(entry.distro, Arc::new(source));
                }
                (None, Some(path)) => {
                    if !settings.options.allow_local {
                        return Err(
                            DatabaseError::LocalSourceDisallowed(path.display().to_string()).into(),
                        );
                    }
                    let path = if path.is_relative() { base.join(path) } else { path };
                    let source = FileIndexSource::new(self.runtime.clone(), path);
                    db.add_repository_fetcher(entry.distro, Arc::new(source));
                }
                _ => anyhow::bail!(
                    "Repository entry for '{}' needs exactly one of 'url' or 'path'",
                    entry.distro
                ),
            }
        }

        for entry in manifest.search_providers {
            let provider = HttpSearchProvider::new(self.http_client.clone(), entry.url);
            db.add_search_provider(entry.distro, Arc::new(provider));
        }

        for entry in manifest.scripts {
            let source = HttpScriptSource::new(self.http_client.clone(), entry.url);
            db.add_script_fetcher(entry.name, Arc::new(source));
        }

        debug!(
            "Opened database with {} repositories from {}",
            db.fetchers().len(),
            settings.manifest.display()
        );
        Ok(db)
    }
}

fn default_cache_dir<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    runtime
        .cache_dir()
        .or_else(|| runtime.home_dir().map(|home| home.join(".cache")))
        .map(|dir| dir.join("pkgdb"))
        .context("Could not determine a cache directory; pass --cache-dir")
}
