// SPDX-License-Identifier: GPL-3.0-or-later

use reqwest::Client;
use serde::{Deserialize, Serialize};
use skald_config::RecognitionConfig;
use skald_domain::Fingerprint;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::error::{RecognitionError, Result};

const USER_AGENT: &str = concat!("Skald/", env!("CARGO_PKG_VERSION"));

/// A confident match returned by the recognition capability.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMatch {
    pub title: String,
    pub artist: String,
    pub confidence: f32,
}

/// Client for the external fingerprint-lookup capability.
///
/// The capability is pluggable: anything answering the lookup endpoint
/// with `{matched, title?, artist?, confidence?}` works, which is also how
/// the tests drive it with a mock server.
#[derive(Debug, Clone)]
pub struct RecognitionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    min_confidence: f32,
}

impl RecognitionClient {
    pub fn new(config: &RecognitionConfig) -> Result<Self> {
        Self::builder(config.base_url.clone())
            .api_key(config.api_key.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .min_confidence(config.min_confidence)
            .build()
    }

    /// Create a client builder for custom configuration.
    pub fn builder(base_url: impl Into<String>) -> RecognitionClientBuilder {
        RecognitionClientBuilder::new(base_url)
    }

    /// Look up a fingerprint and return a match only when the service is
    /// confident enough.
    ///
    /// `Ok(None)` means the service answered but had no match at or above
    /// the confidence threshold; errors mean the capability itself failed.
    pub async fn identify(&self, fingerprint: &Fingerprint) -> Result<Option<TrackMatch>> {
        fingerprint.validate()?;

        let url = Url::parse(&format!("{}/lookup", self.base_url))
            .map_err(|e| RecognitionError::InvalidResponse(e.to_string()))?;

        let request = LookupRequest {
            fingerprint: &fingerprint.vector,
            duration: fingerprint.duration_secs,
            client: self.api_key.as_deref(),
        };

        trace!(target: "recognition", %url, vector_len = fingerprint.vector.len(), "recognition lookup");

        let response = self
            .client
            .post(url.as_str())
            .header("User-Agent", USER_AGENT)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        debug!(target: "recognition", %status, "recognition service responded");

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RecognitionError::ServiceError(format!(
                "HTTP {}: {}",
                status, message
            )));
        }

        let body = response.text().await?;
        let parsed: LookupResponse = serde_json::from_str(&body)
            .map_err(|e| RecognitionError::InvalidResponse(e.to_string()))?;

        if !parsed.matched {
            return Ok(None);
        }

        let confidence = parsed.confidence.unwrap_or(0.0);
        if confidence < self.min_confidence {
            debug!(
                target: "recognition",
                confidence,
                min_confidence = self.min_confidence,
                "match below confidence threshold"
            );
            return Ok(None);
        }

        match (parsed.title, parsed.artist) {
            (Some(title), Some(artist)) => Ok(Some(TrackMatch {
                title,
                artist,
                confidence,
            })),
            _ => Err(RecognitionError::InvalidResponse(
                "matched response missing title or artist".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    fingerprint: &'a [u32],
    duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    client: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    matched: bool,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Builder for the recognition client.
#[derive(Debug)]
pub struct RecognitionClientBuilder {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    min_confidence: f32,
}

impl RecognitionClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            min_confidence: 0.7,
        }
    }

    pub fn api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    pub fn build(self) -> Result<RecognitionClient> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(RecognitionError::RequestFailed)?;

        Ok(RecognitionClient {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key,
            min_confidence: self.min_confidence,
        })
    }
}
