//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients from the configured header profile
//! - GET requests for page payloads
//! - Error classification into network and HTTP failures
//!
//! The fetcher performs exactly one request per call. Retries are decided by
//! the coordinator.

use crate::config::HeaderProfile;
use crate::crawler::PageAddress;
use crate::{ConfigError, ErrorKind, SweepError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION, COOKIE, REFERER, USER_AGENT};
use reqwest::Client;
use std::time::Duration;

/// Result of a fetch operation
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// The server answered with a 2xx status
    Success {
        /// Response body; `HttpFetcher` always hands over UTF-8
        payload: Vec<u8>,
        /// HTTP status code
        status: u16,
    },

    /// The request failed or the server answered with a non-2xx status
    Failure {
        kind: ErrorKind,
        detail: String,
        /// Status code for HTTP failures
        status: Option<u16>,
    },
}

impl FetchResult {
    pub fn network(detail: impl Into<String>) -> Self {
        Self::Failure {
            kind: ErrorKind::Network,
            detail: detail.into(),
            status: None,
        }
    }

    pub fn http(status: u16) -> Self {
        Self::Failure {
            kind: ErrorKind::Http,
            detail: format!("HTTP {}", status),
            status: Some(status),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns true for failures worth another attempt
    ///
    /// Network failures, server errors and 429 are transient; other HTTP
    /// statuses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Success { .. } => false,
            Self::Failure {
                kind: ErrorKind::Network,
                ..
            } => true,
            Self::Failure {
                kind: ErrorKind::Http,
                status: Some(status),
                ..
            } => *status == 429 || (500..600).contains(status),
            Self::Failure { .. } => false,
        }
    }
}

/// Source of page payloads
///
/// Implementations must never panic or hang: every outcome, including
/// timeouts, is reported through [`FetchResult`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, address: &PageAddress) -> FetchResult;
}

/// Builds the default header map for a header profile
pub fn build_headers(profile: &HeaderProfile) -> Result<HeaderMap, ConfigError> {
    fn value(name: &str, raw: &str) -> Result<HeaderValue, ConfigError> {
        HeaderValue::from_str(raw).map_err(|e| ConfigError::InvalidHeader {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    if profile.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, value("User-Agent", &profile.user_agent)?);

    if !profile.referer.is_empty() {
        headers.insert(REFERER, value("Referer", &profile.referer)?);
    }

    if let Some(cookie) = profile.cookie.as_deref().filter(|c| !c.is_empty()) {
        headers.insert(COOKIE, value("Cookie", cookie)?);
    }

    if profile.keep_alive {
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    }

    Ok(headers)
}

/// Builds an HTTP client with the header profile and a finite timeout
///
/// # Arguments
///
/// * `profile` - Headers sent with every request
/// * `timeout` - Total time allowed per request
pub fn build_http_client(profile: &HeaderProfile, timeout: Duration) -> Result<Client, SweepError> {
    let headers = build_headers(profile)?;

    let mut builder = Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true);

    if !profile.keep_alive {
        builder = builder.pool_max_idle_per_host(0);
    }

    Ok(builder.build()?)
}

/// reqwest-backed fetcher used for real crawls
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(profile: &HeaderProfile, timeout: Duration) -> Result<Self, SweepError> {
        Ok(Self::from_client(build_http_client(profile, timeout)?))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, address: &PageAddress) -> FetchResult {
        fetch_url(&self.client, &address.url).await
    }
}

/// Fetches a URL and classifies the outcome
///
/// | Condition | Result |
/// |-----------|--------|
/// | HTTP 2xx | Success with the body decoded to UTF-8 |
/// | Other HTTP status | Failure(Http, status) |
/// | Timeout | Failure(Network) |
/// | Connection refused / DNS | Failure(Network) |
/// | Body read interrupted | Failure(Network) |
pub async fn fetch_url(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return FetchResult::network(describe_error(&e)),
    };

    let status = response.status();
    if !status.is_success() {
        return FetchResult::http(status.as_u16());
    }

    // Decoded by the Content-Type charset, BOM removed, re-encoded as UTF-8
    match response.text().await {
        Ok(body) => FetchResult::Success {
            payload: body.into_bytes(),
            status: status.as_u16(),
        },
        Err(e) => FetchResult::network(describe_error(&e)),
    }
}

fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("Request timeout: {}", error)
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_profile() -> HeaderProfile {
        HeaderProfile {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:68.0) Gecko/20100101 Firefox/68.0"
                .to_string(),
            referer: "https://www.zhihu.com/topic/19552832/top-answers".to_string(),
            cookie: Some("_zap=abc; tst=h".to_string()),
            keep_alive: true,
        }
    }

    #[test]
    fn test_build_headers() {
        let headers = build_headers(&create_test_profile()).unwrap();
        assert_eq!(headers.get(COOKIE).unwrap(), "_zap=abc; tst=h");
        assert_eq!(headers.get(CONNECTION).unwrap(), "keep-alive");
        assert_eq!(
            headers.get(REFERER).unwrap(),
            "https://www.zhihu.com/topic/19552832/top-answers"
        );
    }

    #[test]
    fn test_optional_headers_omitted() {
        let mut profile = create_test_profile();
        profile.cookie = None;
        profile.keep_alive = false;
        profile.referer.clear();

        let headers = build_headers(&profile).unwrap();
        assert!(headers.get(COOKIE).is_none());
        assert!(headers.get(CONNECTION).is_none());
        assert!(headers.get(REFERER).is_none());
        assert!(headers.get(USER_AGENT).is_some());
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let mut profile = create_test_profile();
        profile.user_agent = String::new();
        assert!(build_headers(&profile).is_err());
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&create_test_profile(), Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchResult::network("refused").is_retryable());
        assert!(FetchResult::http(503).is_retryable());
        assert!(FetchResult::http(429).is_retryable());
        assert!(!FetchResult::http(404).is_retryable());
        assert!(!FetchResult::Success {
            payload: Vec::new(),
            status: 200
        }
        .is_retryable());
    }

    // Request-level behavior is covered with wiremock in tests/fetcher_tests.rs
}
