//! Classification of HTTP failures into retryable and permanent ones.

use reqwest::StatusCode;
use std::time::Duration;

/// Maximum number of attempts for one request.
pub const MAX_RETRIES: usize = 3;

/// Default delay between attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Failures that will not go away by asking again.
#[derive(Debug, thiserror::Error)]
pub enum NonRetryableError {
    #[error("rate limit exceeded for {0}; try again later")]
    RateLimitExceeded(String),

    #[error("authentication failed for {0}; check PKGDB_TOKEN")]
    AuthenticationFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access to {0} is forbidden; the repository may require PKGDB_TOKEN")]
    Forbidden(String),

    #[error("HTTP {status} from {url}")]
    ClientError { status: u16, url: String },
}

/// Map a response status to a permanent failure, or `None` if a retry may help.
pub fn classify_status(status: StatusCode, url: &str) -> Option<NonRetryableError> {
    let url = url.to_string();
    match status {
        StatusCode::UNAUTHORIZED => Some(NonRetryableError::AuthenticationFailed(url)),
        StatusCode::FORBIDDEN => Some(NonRetryableError::Forbidden(url)),
        StatusCode::TOO_MANY_REQUESTS => Some(NonRetryableError::RateLimitExceeded(url)),
        StatusCode::NOT_FOUND => Some(NonRetryableError::NotFound(url)),
        s if s.is_client_error() => Some(NonRetryableError::ClientError {
            status: s.as_u16(),
            url,
        }),
        _ => None,
    }
}

/// Convert an error from `error_for_status()`, marking permanent failures.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    let url = error.url().map(|u| u.to_string()).unwrap_or_default();
    match error.status().and_then(|status| classify_status(status, &url)) {
        Some(permanent) => anyhow::Error::from(permanent),
        None => anyhow::Error::from(error),
    }
}

/// Whether a failed attempt is worth repeating.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    error.downcast_ref::<NonRetryableError>().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        let url = "https://repo.example.com/index.json";

        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, url),
            Some(NonRetryableError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, url),
            Some(NonRetryableError::Forbidden(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, url),
            Some(NonRetryableError::RateLimitExceeded(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, url),
            Some(NonRetryableError::NotFound(u)) if u == url
        ));
        assert!(matches!(
            classify_status(StatusCode::GONE, url),
            Some(NonRetryableError::ClientError { status: 410, .. })
        ));
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, url).is_none());
        assert!(classify_status(StatusCode::BAD_GATEWAY, url).is_none());
    }

    #[test]
    fn test_messages_mention_token() {
        let err = NonRetryableError::AuthenticationFailed("https://x".into());
        assert!(err.to_string().contains("PKGDB_TOKEN"));

        let err = NonRetryableError::ClientError {
            status: 400,
            url: "https://x".into(),
        };
        assert_eq!(err.to_string(), "HTTP 400 from https://x");
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&anyhow::anyhow!("connection reset by peer")));
        assert!(!is_retryable(&anyhow::Error::from(
            NonRetryableError::NotFound("x".into())
        )));
    }

    #[tokio::test]
    async fn test_check_retryable_from_response() {
        let mut server = mockito::Server::new_async().await;
        let _gone = server.mock("GET", "/gone").with_status(404).create_async().await;
        let _busy = server.mock("GET", "/busy").with_status(503).create_async().await;

        let client = reqwest::Client::new();

        let err = client
            .get(format!("{}/gone", server.url()))
            .send()
            .await
            .unwrap()
            .error_for_status()
            .unwrap_err();
        let err = check_retryable(err);
        assert!(!is_retryable(&err));
        assert!(err.to_string().ends_with("/gone"));

        let err = client
            .get(format!("{}/busy", server.url()))
            .send()
            .await
            .unwrap()
            .error_for_status()
            .unwrap_err();
        assert!(is_retryable(&check_retryable(err)));
    }
}
