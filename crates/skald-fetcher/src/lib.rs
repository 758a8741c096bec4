// SPDX-License-Identifier: GPL-3.0-or-later

//! Content fetcher: retrieves remote media and normalizes it to canonical
//! mono PCM so identical audio hashes identically regardless of container.
//!
//! The fetcher is pure with respect to the rest of the pipeline: it never
//! writes to the store, and it is fully exercisable with a stub transport.

pub mod error;
pub mod normalize;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;
use std::time::Duration;

use skald_config::FetcherConfig;
use skald_domain::SourceReference;
use tracing::{info, warn};

pub use error::{FetchError, Result};
pub use normalize::{NormalizedAudio, Normalizer};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, RawMedia, Transport};

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    normalizer: Normalizer,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, config: &FetcherConfig) -> Self {
        Self {
            transport,
            normalizer: Normalizer::new(config.max_duration_seconds),
            retry: RetryPolicy::new(
                config.retry_max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
        }
    }

    /// Fetcher over plain HTTP with the config's byte ceiling and deadline.
    pub fn over_http(config: &FetcherConfig) -> Self {
        let transport = HttpTransport::new(
            config.max_bytes,
            Duration::from_secs(config.fetch_timeout_seconds),
        );
        Self::new(Arc::new(transport), config)
    }

    /// Retrieve and normalize the audio behind a source reference.
    ///
    /// Transient network failures are retried on the configured backoff
    /// schedule; permanent failures and normalization errors propagate
    /// immediately.
    pub async fn fetch(&self, source: &SourceReference) -> Result<NormalizedAudio> {
        let mut attempt = 0u32;
        let raw = loop {
            attempt += 1;
            match self.transport.retrieve(source).await {
                Ok(raw) => break raw,
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        target: "fetcher",
                        source = %source,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        ?delay,
                        error = %err,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        };

        let audio = self.normalizer.normalize(&raw)?;
        info!(
            target: "fetcher",
            source = %source,
            attempts = attempt,
            duration_secs = audio.format.duration_secs,
            "fetched and normalized source"
        );
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::wav_bytes;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_config() -> FetcherConfig {
        FetcherConfig {
            max_bytes: 10 * 1024 * 1024,
            max_duration_seconds: 60,
            fetch_timeout_seconds: 5,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1,
        }
    }

    /// Fails with the given error a fixed number of times, then serves a
    /// small WAV payload.
    struct FlakyTransport {
        failures: u32,
        error: fn() -> FetchError,
        calls: AtomicU32,
    }

    impl FlakyTransport {
        fn new(failures: u32, error: fn() -> FetchError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn retrieve(&self, _source: &SourceReference) -> Result<RawMedia> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.error)());
            }
            let samples: Vec<i16> = (0..44_100).map(|i| (i % 128) as i16).collect();
            Ok(RawMedia {
                bytes: wav_bytes(&samples, 44_100, 1),
                content_type: Some("audio/wav".to_string()),
                extension_hint: Some("wav".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let transport = Arc::new(FlakyTransport::new(2, || {
            FetchError::transient("connection reset")
        }));
        let fetcher = Fetcher::new(transport.clone(), &test_config());

        let audio = fetcher
            .fetch(&SourceReference::new("https://example.com/a.wav"))
            .await
            .unwrap();
        assert_eq!(audio.format.duration_secs, 1);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn retries_stop_at_the_configured_bound() {
        let transport = Arc::new(FlakyTransport::new(u32::MAX, || {
            FetchError::transient("connection reset")
        }));
        let fetcher = Fetcher::new(transport.clone(), &test_config());

        let err = fetcher
            .fetch(&SourceReference::new("https://example.com/a.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unreachable { .. }));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let transport = Arc::new(FlakyTransport::new(u32::MAX, || {
            FetchError::permanent("HTTP 404")
        }));
        let fetcher = Fetcher::new(transport.clone(), &test_config());

        let err = fetcher
            .fetch(&SourceReference::new("https://example.com/a.wav"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn unsupported_payload_is_not_retried() {
        struct HtmlTransport {
            calls: AtomicU32,
        }

        #[async_trait]
        impl Transport for HtmlTransport {
            async fn retrieve(&self, _source: &SourceReference) -> Result<RawMedia> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(RawMedia {
                    bytes: bytes::Bytes::from_static(b"<html></html>"),
                    content_type: Some("text/html".to_string()),
                    extension_hint: None,
                })
            }
        }

        let transport = Arc::new(HtmlTransport {
            calls: AtomicU32::new(0),
        });
        let fetcher = Fetcher::new(transport.clone(), &test_config());

        let err = fetcher
            .fetch(&SourceReference::new("https://example.com/page"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unsupported(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
