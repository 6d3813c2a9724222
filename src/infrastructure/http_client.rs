//! HTTP client for page and image requests
//!
//! Requests go out with a browser-like header set. Non-2xx responses are
//! returned to the caller rather than turned into errors, so the image
//! fetcher can log the status it got.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(String),

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} cancelled")]
    Cancelled { url: String },
}

/// Status and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchedBody {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedBody, FetchError>;
}

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub timeout: Duration,
    pub extra_headers: Vec<(String, String)>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        use crate::infrastructure::config::defaults;
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            timeout: Duration::from_secs(defaults::IMAGE_REQUEST_TIMEOUT_SECS),
            extra_headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    cancellation_token: CancellationToken,
}

impl HttpClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self, FetchError> {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Build a client whose in-flight requests abort when `cancellation_token` fires.
    pub fn with_cancellation(
        config: &HttpClientConfig,
        cancellation_token: CancellationToken,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value("User-Agent", &config.user_agent)?);
        headers.insert(
            ACCEPT_LANGUAGE,
            header_value("Accept-Language", &config.accept_language)?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,image/avif,image/webp,image/*,*/*;q=0.8"),
        );
        for (name, value) in &config.extra_headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| FetchError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value(name, value)?);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Build(e.to_string()))?;

        Ok(Self {
            client,
            cancellation_token,
        })
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(value).map_err(|e| FetchError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl HttpFetch for HttpClient {
    async fn get(&self, url: &str) -> Result<FetchedBody, FetchError> {
        if self.cancellation_token.is_cancelled() {
            return Err(FetchError::Cancelled {
                url: url.to_string(),
            });
        }

        tracing::debug!("Fetching URL: {}", url);

        let request = async {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(FetchedBody {
                status,
                body: body.to_vec(),
            })
        };

        let fetched = tokio::select! {
            result = request => result.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout { url: url.to_string() }
                } else {
                    FetchError::Request { url: url.to_string(), reason: e.to_string() }
                }
            })?,
            () = self.cancellation_token.cancelled() => {
                tracing::warn!("🛑 HTTP request cancelled for URL: {}", url);
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
        };

        tracing::debug!(
            "Fetched {} ({}, {} bytes)",
            url,
            fetched.status,
            fetched.body.len()
        );
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_defaults() {
        assert!(HttpClient::new(&HttpClientConfig::default()).is_ok());
    }

    #[test]
    fn invalid_extra_header_is_rejected() {
        let config = HttpClientConfig {
            extra_headers: vec![("Bad Header".into(), "x".into())],
            ..Default::default()
        };
        assert!(matches!(
            HttpClient::new(&config),
            Err(FetchError::InvalidHeader { .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_client_refuses_requests() {
        let token = CancellationToken::new();
        token.cancel();
        let client = HttpClient::with_cancellation(&HttpClientConfig::default(), token).unwrap();
        let err = client.get("http://127.0.0.1:9/never").await.unwrap_err();
        assert!(matches!(err, FetchError::Cancelled { .. }));
    }

    #[test]
    fn success_range() {
        let ok = FetchedBody { status: 204, body: vec![] };
        let missing = FetchedBody { status: 404, body: vec![] };
        assert!(ok.is_success());
        assert!(!missing.is_success());
    }
}
