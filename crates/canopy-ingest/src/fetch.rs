//! Spec source retrieval.
//!
//! A registration payload names its spec exactly one way: a remote URL or
//! an inline body. The HTTP client is an explicitly injected dependency
//! so tests can swap in a canned fetcher instead of a live server.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use canopy_core::error::{Error, Result};

use crate::config::IngestConfig;

/// Inbound registration/update payload.
///
/// Exactly one of `source_url` / `source_body` is required; both present
/// or both absent is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    /// Remote location of the spec document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Inline spec document text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_body: Option<String>,

    /// Display name for the API registration.
    pub name: String,

    /// Optional description for the API registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Where spec bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    /// Fetch from a remote URL.
    Url(String),
    /// Use the submitted body verbatim.
    Inline(String),
}

impl SpecSource {
    /// Extracts the source from a registration payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSource` unless exactly one of
    /// `source_url` / `source_body` is present and non-empty.
    pub fn from_payload(payload: &RegistrationPayload) -> Result<Self> {
        let url = payload.source_url.as_deref().filter(|s| !s.trim().is_empty());
        let body = payload.source_body.as_deref().filter(|s| !s.trim().is_empty());
        match (url, body) {
            (Some(url), None) => Ok(Self::Url(url.to_string())),
            (None, Some(body)) => Ok(Self::Inline(body.to_string())),
            (Some(_), Some(_)) => Err(Error::invalid_source(
                "sourceUrl and sourceBody are mutually exclusive",
            )),
            (None, None) => Err(Error::invalid_source(
                "one of sourceUrl or sourceBody is required",
            )),
        }
    }
}

/// Retrieves raw spec bytes for a [`SpecSource`].
///
/// Also used to resolve absolute-URL `$ref`s during document building,
/// so implementations must accept URLs that never appeared in a payload.
#[async_trait]
pub trait SourceFetcher: Send + Sync + 'static {
    /// Retrieves the raw bytes for the source.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSource` for non-2xx responses and transport
    /// failures; the detail names the URL that failed.
    async fn fetch(&self, source: &SpecSource) -> Result<Bytes>;
}

/// Production fetcher backed by an injected [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Option<String>,
}

impl HttpFetcher {
    /// Creates a fetcher around an existing client.
    #[must_use]
    pub const fn new(client: reqwest::Client, origin: Option<String>) -> Self {
        Self { client, origin }
    }

    /// Creates a fetcher from the pipeline configuration, honoring its
    /// HTTP timeout and optional Origin header.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the client cannot be built.
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Self::with_timeout(config.http_timeout_secs, config.origin.clone())
    }

    /// Creates a fetcher with its own client and the given timeout.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the client cannot be built.
    pub fn with_timeout(timeout_secs: u64, origin: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::new(client, origin))
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &SpecSource) -> Result<Bytes> {
        match source {
            SpecSource::Inline(body) => Ok(Bytes::from(body.clone())),
            SpecSource::Url(url) => {
                let mut request = self.client.get(url);
                if let Some(origin) = &self.origin {
                    request = request.header(header::ORIGIN, origin);
                }

                let response = request
                    .send()
                    .await
                    .map_err(|e| Error::invalid_source(format!("fetch {url}: {e}")))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(Error::invalid_source(format!(
                        "fetch {url}: unexpected status {status}"
                    )));
                }

                response
                    .bytes()
                    .await
                    .map_err(|e| Error::invalid_source(format!("read body of {url}: {e}")))
            }
        }
    }
}

/// Canned fetcher for tests.
///
/// ## Limitations
///
/// - **NOT suitable for production**: serves only pre-registered URLs
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: HashMap<String, Bytes>,
}

impl StaticFetcher {
    /// Creates an empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the bytes served for a URL.
    #[must_use]
    pub fn with(mut self, url: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        self.responses.insert(url.into(), bytes.into());
        self
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch(&self, source: &SpecSource) -> Result<Bytes> {
        match source {
            SpecSource::Inline(body) => Ok(Bytes::from(body.clone())),
            SpecSource::Url(url) => self
                .responses
                .get(url)
                .cloned()
                .ok_or_else(|| Error::invalid_source(format!("fetch {url}: no such host"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(url: Option<&str>, body: Option<&str>) -> RegistrationPayload {
        RegistrationPayload {
            source_url: url.map(str::to_string),
            source_body: body.map(str::to_string),
            name: "payments".to_string(),
            description: None,
        }
    }

    #[test]
    fn url_only_is_accepted() {
        let source = SpecSource::from_payload(&payload(Some("https://example.com/spec"), None))
            .expect("url source");
        assert_eq!(source, SpecSource::Url("https://example.com/spec".to_string()));
    }

    #[test]
    fn body_only_is_accepted() {
        let source =
            SpecSource::from_payload(&payload(None, Some("openapi: 3.0.0"))).expect("inline source");
        assert_eq!(source, SpecSource::Inline("openapi: 3.0.0".to_string()));
    }

    #[test]
    fn both_sources_are_rejected() {
        let result = SpecSource::from_payload(&payload(Some("https://x"), Some("body")));
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }

    #[test]
    fn neither_source_is_rejected() {
        let result = SpecSource::from_payload(&payload(None, None));
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }

    #[test]
    fn blank_url_counts_as_absent() {
        let result = SpecSource::from_payload(&payload(Some("   "), None));
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }

    #[test]
    fn from_config_builds_a_fetcher() {
        let config = IngestConfig {
            origin: Some("https://catalog.example.com".to_string()),
            ..IngestConfig::default()
        };
        let fetcher = HttpFetcher::from_config(&config).expect("client builds");
        assert_eq!(fetcher.origin.as_deref(), Some("https://catalog.example.com"));
    }

    #[tokio::test]
    async fn inline_fetch_returns_body_bytes() {
        let fetcher = StaticFetcher::new();
        let bytes = fetcher
            .fetch(&SpecSource::Inline("{\"openapi\":\"3.0.3\"}".to_string()))
            .await
            .expect("inline fetch");
        assert_eq!(&bytes[..], b"{\"openapi\":\"3.0.3\"}");
    }

    #[tokio::test]
    async fn static_fetcher_serves_registered_urls() {
        let fetcher = StaticFetcher::new().with("https://example.com/spec", &b"{}"[..]);
        let bytes = fetcher
            .fetch(&SpecSource::Url("https://example.com/spec".to_string()))
            .await
            .expect("registered url");
        assert_eq!(&bytes[..], b"{}");

        let missing = fetcher
            .fetch(&SpecSource::Url("https://example.com/other".to_string()))
            .await;
        assert!(matches!(missing, Err(Error::InvalidSource { .. })));
    }
}
