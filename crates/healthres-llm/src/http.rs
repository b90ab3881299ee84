use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};

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
    Err(Error::Generation(format!("HTTP {}: {}", status.as_u16(), body.trim())))
}

pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("generation request: {err}"))
    } else {
        Error::Generation(format!("transport: {err}"))
    }
}
