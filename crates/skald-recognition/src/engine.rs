// SPDX-License-Identifier: GPL-3.0-or-later

//! Recognition engine: fingerprint-first, cache-first identification.
//!
//! Fingerprinting is the expensive deterministic half; the external lookup
//! is the fallible rate-limited half. They are separated so a later retry
//! can reuse the stored fingerprint without touching the audio again.

use std::sync::Arc;

use chrono::Utc;
use skald_domain::{ContentHash, FingerprintRecord, RecognitionOutcome};
use skald_store::{Flight, Singleflight, Store, StoreError};
use tracing::{info, warn};

use crate::client::RecognitionClient;
use crate::error::{RecognitionError, Result};
use crate::generator;

pub struct RecognitionEngine {
    store: Arc<Store>,
    client: RecognitionClient,
    flights: Singleflight<ContentHash>,
}

impl RecognitionEngine {
    pub fn new(store: Arc<Store>, client: RecognitionClient) -> Self {
        Self {
            store,
            client,
            flights: Singleflight::new(),
        }
    }

    /// Resolve a fingerprint record for the hash.
    ///
    /// Cache hits return without recomputing or re-querying. Concurrent
    /// calls for the same hash collapse: one computes, the rest piggyback
    /// on its result. An unreachable recognition capability yields a
    /// `RecognitionUnavailable` record, not an error.
    pub async fn recognize(&self, hash: &ContentHash) -> Result<FingerprintRecord> {
        loop {
            match self.store.lookup_fingerprint(hash).await {
                Ok(record) => return Ok(record),
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }

            match self.flights.begin(hash) {
                Flight::Leader(_guard) => {
                    // The previous leader may have recorded between our
                    // lookup and the claim.
                    match self.store.lookup_fingerprint(hash).await {
                        Ok(record) => return Ok(record),
                        Err(StoreError::NotFound) => {}
                        Err(e) => return Err(e.into()),
                    }
                    return self.recognize_uncached(hash).await;
                }
                follower => follower.wait().await,
            }
        }
    }

    async fn recognize_uncached(&self, hash: &ContentHash) -> Result<FingerprintRecord> {
        let artifact = self.store.get(hash).await?;

        let fingerprint = tokio::task::spawn_blocking(move || {
            generator::compute_fingerprint(&artifact)
        })
        .await
        .map_err(|e| RecognitionError::TaskFailed(e.to_string()))??;

        let outcome = match self.client.identify(&fingerprint).await {
            Ok(Some(track)) => {
                info!(
                    target: "recognition",
                    %hash,
                    title = %track.title,
                    artist = %track.artist,
                    confidence = track.confidence,
                    "content recognized"
                );
                RecognitionOutcome::Recognized {
                    title: track.title,
                    artist: track.artist,
                    confidence: track.confidence,
                }
            }
            Ok(None) => {
                info!(target: "recognition", %hash, "no confident match");
                RecognitionOutcome::Unrecognized
            }
            Err(e) if e.is_capability_failure() => {
                // Audio acquisition already succeeded; keep the fingerprint
                // and let a later refresh retry the lookup.
                warn!(target: "recognition", %hash, error = %e, "recognition capability unavailable");
                RecognitionOutcome::RecognitionUnavailable
            }
            Err(e) => return Err(e),
        };

        let record = FingerprintRecord {
            hash: hash.clone(),
            fingerprint,
            outcome,
            recognized_at: Utc::now(),
        };
        self.store.record_fingerprint(record.clone()).await?;
        Ok(record)
    }

    /// Retry the external lookup for a hash using its stored fingerprint,
    /// without re-fetching or re-fingerprinting the audio.
    ///
    /// Recognized records are returned as-is. When the capability is still
    /// unavailable the existing record is returned unchanged.
    pub async fn refresh(&self, hash: &ContentHash) -> Result<FingerprintRecord> {
        let existing = self.store.lookup_fingerprint(hash).await?;
        if existing.outcome.is_recognized() {
            return Ok(existing);
        }

        let outcome = match self.client.identify(&existing.fingerprint).await {
            Ok(Some(track)) => RecognitionOutcome::Recognized {
                title: track.title,
                artist: track.artist,
                confidence: track.confidence,
            },
            Ok(None) => RecognitionOutcome::Unrecognized,
            Err(e) if e.is_capability_failure() => {
                warn!(target: "recognition", %hash, error = %e, "refresh failed, capability still unavailable");
                return Ok(existing);
            }
            Err(e) => return Err(e),
        };

        let record = FingerprintRecord {
            hash: hash.clone(),
            fingerprint: existing.fingerprint,
            outcome,
            recognized_at: Utc::now(),
        };
        self.store.record_fingerprint(record.clone()).await?;
        Ok(record)
    }
}
