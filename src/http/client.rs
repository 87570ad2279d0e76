//! HTTP client with retry on transient failures.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

use super::retry::{MAX_RETRIES, RETRY_DELAY, check_retryable, is_retryable};

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// GET `url` and decode the body as JSON.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_query(url, &[]).await
    }

    /// GET `url` with query parameters and decode the body as JSON.
    #[tracing::instrument(skip(self))]
    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        debug!("GET {} {:?}", url, query);

        self.with_retry(url, || async {
            let response = self
                .client
                .get(url)
                .query(query)
                .send()
                .await
                .context("Failed to send request")?
                .error_for_status()
                .map_err(check_retryable)?;

            response
                .json::<T>()
                .await
                .with_context(|| format!("Invalid JSON from {}", url))
        })
        .await
    }

    /// GET `url` and return the raw body.
    #[tracing::instrument(skip(self))]
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {}", url);

        self.with_retry(url, || async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .context("Failed to send request")?
                .error_for_status()
                .map_err(check_retryable)?;

            let body = response
                .bytes()
                .await
                .with_context(|| format!("Failed to read body of {}", url))?;
            debug!("Received {} bytes from {}", body.len(), url);
            Ok(body.to_vec())
        })
        .await
    }

    async fn with_retry<F, Fut, T>(&self, url: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !is_retryable(&e) || attempt >= MAX_RETRIES => return Err(e),
                Err(e) => {
                    warn!(
                        "GET {}: attempt {}/{} failed ({:#}), retrying in {}ms",
                        url,
                        attempt,
                        MAX_RETRIES,
                        e,
                        self.retry_delay.as_millis()
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
