// SPDX-License-Identifier: GPL-3.0-or-later

//! Transport capability used to retrieve remote media bytes.
//!
//! The production implementation streams over HTTP with reqwest. The trait
//! boundary keeps the fetcher testable with a stub transport and keeps all
//! network failure classification in one place.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use skald_domain::SourceReference;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::error::{FetchError, Result};

/// Raw bytes pulled from a source, before any audio decoding.
#[derive(Debug, Clone)]
pub struct RawMedia {
    pub bytes: Bytes,
    /// Content-Type header, if the source sent one.
    pub content_type: Option<String>,
    /// File extension taken from the URL path, if any.
    pub extension_hint: Option<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Retrieve the raw media behind a source reference.
    ///
    /// Implementations must bound both wall-clock time and buffered bytes;
    /// exceeding either aborts the transfer instead of buffering on.
    async fn retrieve(&self, source: &SourceReference) -> Result<RawMedia>;
}

/// HTTP GET transport with a streaming body, byte ceiling, and deadline.
pub struct HttpTransport {
    client: Client,
    max_bytes: u64,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(max_bytes: u64, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .pool_max_idle_per_host(8)
                .build()
                .expect("http client"),
            max_bytes,
            timeout,
        }
    }

    fn parse_source(&self, source: &SourceReference) -> Result<Url> {
        let url = Url::parse(source.as_str())
            .map_err(|e| FetchError::Unsupported(format!("not a valid URL: {}", e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(FetchError::Unsupported(format!(
                "unsupported scheme: {}",
                other
            ))),
        }
    }

    fn classify_status(status: StatusCode, body_hint: &str) -> FetchError {
        match status {
            StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                FetchError::Unsupported(format!("HTTP {}: {}", status, body_hint))
            }
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                FetchError::transient(format!("HTTP {}: {}", s, body_hint))
            }
            s => FetchError::permanent(format!("HTTP {}: {}", s, body_hint)),
        }
    }

    fn classify_request_error(err: reqwest::Error, timeout: Duration) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            // Connect failures, resets, and mid-body drops are all worth
            // another attempt.
            FetchError::transient(err.to_string())
        }
    }

    async fn retrieve_inner(&self, url: Url) -> Result<RawMedia> {
        let extension_hint = extension_from_path(url.path());

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| Self::classify_request_error(e, self.timeout))?;

        let status = response.status();
        debug!(target: "fetcher", %status, url = %url, "source responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body.trim()));
        }

        // Reject early when the source declares a length over the ceiling.
        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(FetchError::TooLarge(format!(
                    "declared length {} exceeds limit {}",
                    len, self.max_bytes
                )));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let mut buf = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::classify_request_error(e, self.timeout))?;
            if (buf.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge(format!(
                    "body exceeds limit of {} bytes",
                    self.max_bytes
                )));
            }
            buf.extend_from_slice(&chunk);
        }

        trace!(target: "fetcher", bytes = buf.len(), "transfer complete");

        Ok(RawMedia {
            bytes: buf.freeze(),
            content_type,
            extension_hint,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn retrieve(&self, source: &SourceReference) -> Result<RawMedia> {
        let url = self.parse_source(source)?;
        match tokio::time::timeout(self.timeout, self.retrieve_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}

fn extension_from_path(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_hint_from_url_path() {
        assert_eq!(extension_from_path("/a/b/track.mp3"), Some("mp3".into()));
        assert_eq!(extension_from_path("/a/b/track.FLAC"), Some("flac".into()));
        assert_eq!(extension_from_path("/a/b/track"), None);
        assert_eq!(extension_from_path("/watch"), None);
    }

    #[test]
    fn rejects_non_http_schemes() {
        let transport = HttpTransport::new(1024, Duration::from_secs(5));
        let err = transport
            .parse_source(&SourceReference::new("ftp://example.com/a.mp3"))
            .unwrap_err();
        assert!(matches!(err, FetchError::Unsupported(_)));
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        assert!(
            HttpTransport::classify_status(StatusCode::BAD_GATEWAY, "").is_transient()
        );
        assert!(
            HttpTransport::classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient()
        );
        assert!(
            !HttpTransport::classify_status(StatusCode::NOT_FOUND, "").is_transient()
        );
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::UNSUPPORTED_MEDIA_TYPE, ""),
            FetchError::Unsupported(_)
        ));
    }
}
