//! The HTTP seam under the conditional fetcher.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::debug;

use super::FetchError;

/// Header some blob stores use instead of `ETag` when fronted by a CDN.
pub const FALLBACK_VALIDATOR_HEADER: &str = "x-etag";

/// Storage API version header sent with every request when configured.
const STORAGE_VERSION_HEADER: &str = "x-ms-version";

/// What came back from one GET, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub validator: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>, validator: Option<&str>) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            validator: validator.map(str::to_string),
            body: body.into(),
        }
    }

    pub fn not_modified() -> Self {
        Self {
            status: StatusCode::NOT_MODIFIED.as_u16(),
            validator: None,
            body: String::new(),
        }
    }
}

/// Issues a single GET. Implementations report connection-level failures
/// as [`FetchError::Transient`] and leave status handling to the caller.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, validator: Option<&str>) -> Result<HttpResponse, FetchError>;
}

/// Production transport backed by a pooled reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, storage_api_version: Option<&str>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(version) = storage_api_version {
            headers.insert(
                STORAGE_VERSION_HEADER,
                header::HeaderValue::from_str(version)?,
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    fn extract_validator(headers: &header::HeaderMap) -> Option<String> {
        headers
            .get(header::ETAG)
            .or_else(|| headers.get(FALLBACK_VALIDATOR_HEADER))
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, validator: Option<&str>) -> Result<HttpResponse, FetchError> {
        let mut request = self.client.get(url);
        if let Some(validator) = validator {
            request = request.header(header::IF_NONE_MATCH, validator);
        }

        let response = request.send().await?;
        let status = response.status();
        let validator = Self::extract_validator(response.headers());
        debug!(url = url, status = status.as_u16(), validator = ?validator, "Response received");

        let body = if status == StatusCode::NOT_MODIFIED {
            String::new()
        } else {
            response.text().await?
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            validator,
            body,
        })
    }
}
