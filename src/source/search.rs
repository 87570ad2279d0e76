use anyhow::Result;
use async_trait::async_trait;

use crate::http::HttpClient;
use crate::package::{Package, PackageName};
use crate::search::Search;

/// A remote search endpoint answering `GET <url>?q=<query>&limit=<n>`.
pub struct HttpSearchProvider {
    http_client: HttpClient,
    url: String,
}

impl HttpSearchProvider {
    pub fn new(http_client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Search for HttpSearchProvider {
    #[tracing::instrument(skip(self))]
    async fn search(&self, query: &PackageName, max_results: usize) -> Result<Vec<Package>> {
        let q = query.to_string();
        let limit = max_results.to_string();
        let mut packages: Vec<Package> = self
            .http_client
            .get_json_with_query(&self.url, &[("q", q.as_str()), ("limit", limit.as_str())])
            .await?;

        if max_results != 0 {
            packages.truncate(max_results);
        }
        Ok(packages)
    }
}
