use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Lifecycle of a repository fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    #[default]
    Unfetched,
    Fetching,
    /// Packages were loaded from a fresh cache entry.
    Cached,
    /// Packages came from the source callback.
    Fresh,
    /// The last fetch failed; packages from the previous success are kept.
    Failed,
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Unfetched => write!(f, "unfetched"),
            FetchStatus::Fetching => write!(f, "fetching"),
            FetchStatus::Cached => write!(f, "cached"),
            FetchStatus::Fresh => write!(f, "fresh"),
            FetchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time view of one fetcher, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct FetcherStatus {
    pub key: String,
    pub name: String,
    pub status: FetchStatus,
    pub package_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_update_time: Duration,
}

impl fmt::Display for FetcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let updated = self
            .last_updated
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        write!(
            f,
            "{} {} packages={} updated={} took={}ms",
            self.name,
            self.status,
            self.package_count,
            updated,
            self.last_update_time.as_millis()
        )
    }
}
