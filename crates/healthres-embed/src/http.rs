use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use tracing::warn;

use healthres_core::{Error, Result};

pub(crate) fn bearer_client(provider: &str, api_key: &str, timeout: Duration) -> Result<Client> {
    if api_key.trim().is_empty() {
        return Err(Error::InvalidConfig(format!("missing {provider} API key")));
    }
    let mut headers = HeaderMap::new();
    let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
        .map_err(|_| Error::InvalidConfig(format!("invalid {provider} API key")))?;
    headers.insert(AUTHORIZATION, auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

pub(crate) async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(Error::EmbeddingService(format!("HTTP {}: {}", status.as_u16(), body.trim())))
}

pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("embedding request: {err}"))
    } else {
        Error::EmbeddingService(format!("transport: {err}"))
    }
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = u32::try_from(attempt.min(5)).unwrap_or(5);
    Duration::from_millis(500 * (1u64 << capped))
}

/// Runs `send`, retrying retryable failures up to `max_retries` times with exponential backoff.
pub(crate) async fn with_retries<T, F, Fut>(max_retries: usize, mut send: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        match send().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_retries => {
                let wait = retry_backoff(attempt);
                attempt += 1;
                warn!(attempt, wait_ms = wait.as_millis(), error = %err, "retrying embedding request");
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(retry_backoff(0), Duration::from_millis(500));
        assert_eq!(retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(9), retry_backoff(5));
    }
}
