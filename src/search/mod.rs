//! Fallback search providers.
//!
//! A provider is consulted only when no registered fetcher lists a match.
//! Providers are keyed by distribution and hold no data of their own.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::package::{Package, PackageName};

/// Search callback of a provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Search: Send + Sync {
    /// Look up packages matching `query`; `max_results == 0` means unbounded.
    async fn search(&self, query: &PackageName, max_results: usize) -> Result<Vec<Package>>;
}

pub struct SearchProvider {
    distribution: String,
    provider: Arc<dyn Search>,
}

impl SearchProvider {
    pub fn new(distribution: impl Into<String>, provider: Arc<dyn Search>) -> Self {
        Self {
            distribution: distribution.into(),
            provider,
        }
    }

    pub fn distribution(&self) -> &str {
        &self.distribution
    }

    #[tracing::instrument(skip(self))]
    pub async fn search(&self, query: &PackageName, max_results: usize) -> Result<Vec<Arc<Package>>> {
        let results = self.provider.search(query, max_results).await?;
        Ok(results.into_iter().map(Arc::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_wraps_results() {
        let mut provider = MockSearch::new();
        provider
            .expect_search()
            .withf(|query, max| query.name == "requests" && *max == 1)
            .times(1)
            .returning(|query, _| Ok(vec![Package::new(query.clone())]));

        let provider = SearchProvider::new("pypi", Arc::new(provider));
        assert_eq!(provider.distribution(), "pypi");

        let results = provider
            .search(&PackageName::new("requests").distribution("pypi"), 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name.name, "requests");
    }
}
