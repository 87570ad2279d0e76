//! HTTP access for remote repositories and search providers.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::{MAX_RETRIES, NonRetryableError, check_retryable, classify_status, is_retryable};
