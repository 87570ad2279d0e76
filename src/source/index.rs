use anyhow::Result;
use async_trait::async_trait;
use log::debug;

use super::decode_index;
use crate::fetcher::Fetch;
use crate::http::HttpClient;
use crate::package::Package;

/// A repository index served over HTTP.
pub struct HttpIndexSource {
    http_client: HttpClient,
    url: String,
}

impl HttpIndexSource {
    pub fn new(http_client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Fetch for HttpIndexSource {
    fn identity(&self) -> String {
        self.url.clone()
    }

    #[tracing::instrument(skip(self))]
    async fn fetch(&self, _key: &str, _force: bool) -> Result<Vec<Package>> {
        let body = self.http_client.get_bytes(&self.url).await?;
        let packages = decode_index(&self.url, &body)?;
        debug!("{} lists {} packages", self.url, packages.len());
        Ok(packages)
    }
}
