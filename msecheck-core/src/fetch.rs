//! Byte-range fetch capability consumed by segment sources.

use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::config::FetchConfig;

/// Bytes returned for a range request together with the resource size.
#[derive(Debug, Clone)]
pub struct FetchedRange {
    pub data: Bytes,
    /// Total size of the resource the range was taken from.
    pub total_size: u64,
}

/// Errors that can occur when fetching a byte range.
///
/// Fetch errors are never retried by the drivers; they fail the test that
/// issued the request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("resource not found: {url}")]
    NotFound { url: String },

    #[error("invalid range {start}..{end} for {url} of size {size}")]
    InvalidRange {
        url: String,
        start: u64,
        end: u64,
        size: u64,
    },

    #[error("request failed for {url}: {reason}")]
    Request { url: String, reason: String },

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Issues byte-range requests against a media resource.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `range` (end exclusive) of the resource at `url`.
    ///
    /// # Errors
    ///
    /// - `FetchError::NotFound` - The resource does not exist
    /// - `FetchError::InvalidRange` - The range lies outside the resource
    /// - `FetchError::Request` - Transport level failure
    async fn fetch_range(&self, url: &str, range: Range<u64>) -> Result<FetchedRange, FetchError>;
}

/// Production fetcher issuing HTTP `Range` requests with reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Option<url::Url>,
}

impl HttpFetcher {
    /// Creates a fetcher from configuration.
    ///
    /// # Errors
    ///
    /// - `FetchError::Request` - If the client or base URL cannot be built
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let base_url = config
            .media_base_url
            .as_deref()
            .map(url::Url::parse)
            .transpose()
            .map_err(|e| FetchError::Request {
                url: config.media_base_url.clone().unwrap_or_default(),
                reason: format!("invalid base URL: {e}"),
            })?;

        Ok(Self { client, base_url })
    }

    /// Creates a fetcher with default configuration and the given timeout.
    ///
    /// # Errors
    ///
    /// - `FetchError::Request` - If the client cannot be built
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        Self::new(&FetchConfig {
            request_timeout: timeout,
            ..FetchConfig::default()
        })
    }

    fn resolve(&self, url: &str) -> Result<url::Url, FetchError> {
        let resolved = match &self.base_url {
            Some(base) => base.join(url),
            None => url::Url::parse(url),
        };
        resolved.map_err(|e| FetchError::Request {
            url: url.to_string(),
            reason: format!("invalid URL: {e}"),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_range(&self, url: &str, range: Range<u64>) -> Result<FetchedRange, FetchError> {
        if range.end <= range.start {
            return Err(FetchError::InvalidRange {
                url: url.to_string(),
                start: range.start,
                end: range.end,
                size: 0,
            });
        }

        let target = self.resolve(url)?;
        let header = format!("bytes={}-{}", range.start, range.end - 1);

        let response = self
            .client
            .get(target)
            .header(reqwest::header::RANGE, header)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    "failed to connect".to_string()
                } else {
                    e.to_string()
                };
                FetchError::Request {
                    url: url.to_string(),
                    reason,
                }
            })?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }
        if status == 416 {
            return Err(FetchError::InvalidRange {
                url: url.to_string(),
                start: range.start,
                end: range.end,
                size: 0,
            });
        }
        if !(200..300).contains(&status) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let content_range = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        let data = response.bytes().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            reason: format!("failed to read response body: {e}"),
        })?;

        // 200 means the server ignored the range and sent the whole resource
        let (data, total_size) = if status == 200 {
            let total = data.len() as u64;
            let end = range.end.min(total) as usize;
            let start = (range.start as usize).min(end);
            (data.slice(start..end), total)
        } else {
            let total = content_range.unwrap_or(range.start + data.len() as u64);
            (data, total)
        };

        tracing::trace!(url, start = range.start, len = data.len(), "Fetched range");
        Ok(FetchedRange { data, total_size })
    }
}

/// Extracts the total size from a `Content-Range: bytes a-b/total` value.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-99/1234"), Some(1234));
        assert_eq!(parse_content_range_total("bytes 0-99/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_relative_urls_resolve_against_base() {
        let fetcher = HttpFetcher::new(&FetchConfig {
            media_base_url: Some("http://media.example/tests/".to_string()),
            ..FetchConfig::default()
        })
        .unwrap();

        let url = fetcher.resolve("video/car.mp4").unwrap();
        assert_eq!(url.as_str(), "http://media.example/tests/video/car.mp4");
    }

    #[tokio::test]
    async fn test_empty_range_is_rejected_before_request() {
        let fetcher = HttpFetcher::with_timeout(Duration::from_secs(1)).unwrap();
        let err = fetcher
            .fetch_range("http://127.0.0.1:9/x", 10..10)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRange { .. }));
    }
}
