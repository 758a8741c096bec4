// SPDX-License-Identifier: GPL-3.0-or-later

//! Content-addressable artifact store.
//!
//! Artifact blobs live on the filesystem under `<data_dir>/blobs/<hash>`;
//! the index (sizes, formats, pins, LRU order) lives in memory behind one
//! lock and is rebuilt from sqlite on startup. Fingerprint records are
//! sqlite-backed with a moka hot cache in front.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use skald_config::StoreConfig;
use skald_domain::{AudioArtifact, AudioFormat, ContentHash, FingerprintRecord};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, StoreError};
use crate::index::{ArtifactIndex, StoreStats};
use crate::singleflight::{Flight, Singleflight};

pub struct Store {
    pool: SqlitePool,
    blob_dir: PathBuf,
    capacity_bytes: u64,
    index: Mutex<ArtifactIndex>,
    puts: Singleflight<ContentHash>,
    fingerprint_cache: Cache<ContentHash, FingerprintRecord>,
}

impl Store {
    /// Open the store over an existing pool, creating the blob directory
    /// and rebuilding the in-memory index from the artifacts table.
    pub async fn open(config: &StoreConfig, pool: SqlitePool) -> Result<Self> {
        let blob_dir = Path::new(&config.data_dir).join("blobs");
        std::fs::create_dir_all(&blob_dir)?;

        let store = Self {
            pool,
            blob_dir,
            capacity_bytes: config.store_capacity_bytes,
            index: Mutex::new(ArtifactIndex::new()),
            puts: Singleflight::new(),
            fingerprint_cache: Cache::new(config.fingerprint_cache_entries),
        };
        store.load_index().await?;
        Ok(store)
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.blob_dir.join(hash.as_str())
    }

    async fn load_index(&self) -> Result<()> {
        let rows = sqlx::query(
            "SELECT hash, size_bytes, codec, sample_rate, channels, duration_secs FROM artifacts",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut missing = Vec::new();
        {
            let mut index = self.index.lock().await;
            for row in &rows {
                let hash_str: String = row.get("hash");
                let hash = ContentHash::parse(&hash_str)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                if !self.blob_path(&hash).exists() {
                    missing.push(hash);
                    continue;
                }
                let size: i64 = row.get("size_bytes");
                let format = AudioFormat {
                    codec: row.get("codec"),
                    sample_rate: row.get::<i64, _>("sample_rate") as u32,
                    channels: row.get::<i64, _>("channels") as u16,
                    duration_secs: row.get::<i64, _>("duration_secs") as u32,
                };
                index.insert(hash, size as u64, format);
            }
            info!(
                target: "store",
                artifacts = index.stats().artifact_count,
                total_bytes = index.total_bytes(),
                "artifact index loaded"
            );
        }

        // Rows whose blob vanished are dropped rather than served as ghosts.
        for hash in missing {
            warn!(target: "store", %hash, "blob missing on disk, dropping index row");
            sqlx::query("DELETE FROM artifacts WHERE hash = ?")
                .bind(hash.as_str())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Store normalized audio, deduplicating by content hash.
    ///
    /// Idempotent: identical bytes always yield the same hash and a single
    /// stored copy. Concurrent puts of the same content collapse into one
    /// write; the losers return the winner's hash.
    pub async fn put(&self, bytes: Bytes, format: AudioFormat) -> Result<ContentHash> {
        let hash = ContentHash::from_digest(hex::encode(Sha256::digest(&bytes)));

        loop {
            {
                let mut index = self.index.lock().await;
                if index.touch(&hash).is_some() {
                    trace!(target: "store", %hash, "put deduplicated");
                    return Ok(hash);
                }
            }

            match self.puts.begin(&hash) {
                Flight::Leader(_guard) => {
                    // Re-check under the claim: an earlier leader may have
                    // finished between our index probe and the claim.
                    if self.index.lock().await.touch(&hash).is_some() {
                        return Ok(hash);
                    }
                    self.put_new(&hash, &bytes, &format).await?;
                    return Ok(hash);
                }
                follower => follower.wait().await,
            }
        }
    }

    async fn put_new(&self, hash: &ContentHash, bytes: &Bytes, format: &AudioFormat) -> Result<()> {
        let size = bytes.len() as u64;
        self.make_room(size).await?;

        // Write-then-ack: the blob is complete and renamed into place
        // before the database row or index entry become visible.
        let final_path = self.blob_path(hash);
        let tmp_path = final_path.with_extension("part");
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO artifacts
                (hash, size_bytes, codec, sample_rate, channels, duration_secs, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(hash.as_str())
        .bind(size as i64)
        .bind(&format.codec)
        .bind(format.sample_rate as i64)
        .bind(format.channels as i64)
        .bind(format.duration_secs as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.index.lock().await.insert(hash.clone(), size, format.clone());
        debug!(target: "store", %hash, size, "stored new artifact");
        Ok(())
    }

    async fn make_room(&self, incoming_bytes: u64) -> Result<()> {
        if incoming_bytes > self.capacity_bytes {
            return Err(StoreError::CapacityExceeded(format!(
                "artifact of {} bytes exceeds store capacity {}",
                incoming_bytes, self.capacity_bytes
            )));
        }

        let mut evicted = Vec::new();
        {
            let mut index = self.index.lock().await;
            while index.total_bytes() + incoming_bytes > self.capacity_bytes {
                match index.eviction_victim() {
                    Some(victim) => {
                        index.remove(&victim);
                        evicted.push(victim);
                    }
                    None => {
                        return Err(StoreError::CapacityExceeded(
                            "every resident artifact is pinned by an in-flight job".to_string(),
                        ))
                    }
                }
            }
        }

        for victim in evicted {
            debug!(target: "store", hash = %victim, "evicting least-recently-used artifact");
            sqlx::query("DELETE FROM artifacts WHERE hash = ?")
                .bind(victim.as_str())
                .execute(&self.pool)
                .await?;
            if let Err(e) = tokio::fs::remove_file(self.blob_path(&victim)).await {
                if e.kind() != ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    pub async fn get(&self, hash: &ContentHash) -> Result<AudioArtifact> {
        let format = {
            let mut index = self.index.lock().await;
            match index.touch(hash) {
                Some((_, format)) => format,
                None => return Err(StoreError::NotFound),
            }
        };

        match tokio::fs::read(self.blob_path(hash)).await {
            Ok(data) => Ok(AudioArtifact {
                hash: hash.clone(),
                format,
                bytes: Bytes::from(data),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // The blob vanished between the index probe and the read
                // (eviction race); treat it as absent.
                self.index.lock().await.remove(hash);
                Err(StoreError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Pin an artifact so eviction cannot touch it while a job holds it.
    pub async fn pin(&self, hash: &ContentHash) -> Result<()> {
        if self.index.lock().await.pin(hash) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// Release a pin taken with [`Store::pin`]. Safe to call on a hash that
    /// is already gone.
    pub async fn unpin(&self, hash: &ContentHash) {
        if !self.index.lock().await.unpin(hash) {
            warn!(target: "store", %hash, "unpin of unknown artifact");
        }
    }

    /// Record the recognition result for a hash. Idempotent; re-recording
    /// replaces the previous record in both sqlite and the hot cache.
    pub async fn record_fingerprint(&self, record: FingerprintRecord) -> Result<()> {
        let vector = serde_json::to_string(&record.fingerprint.vector)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let outcome = serde_json::to_string(&record.outcome)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO fingerprints (hash, vector, duration_secs, outcome, recognized_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(hash) DO UPDATE SET
                vector = excluded.vector,
                duration_secs = excluded.duration_secs,
                outcome = excluded.outcome,
                recognized_at = excluded.recognized_at
            "#,
        )
        .bind(record.hash.as_str())
        .bind(vector)
        .bind(record.fingerprint.duration_secs as i64)
        .bind(outcome)
        .bind(record.recognized_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(target: "store", hash = %record.hash, "fingerprint record stored");
        self.fingerprint_cache.insert(record.hash.clone(), record);
        Ok(())
    }

    pub async fn lookup_fingerprint(&self, hash: &ContentHash) -> Result<FingerprintRecord> {
        if let Some(record) = self.fingerprint_cache.get(hash) {
            return Ok(record);
        }

        let row = sqlx::query(
            "SELECT vector, duration_secs, outcome, recognized_at FROM fingerprints WHERE hash = ? LIMIT 1",
        )
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };

        let vector: Vec<u32> = serde_json::from_str(row.get("vector"))
            .map_err(|e| StoreError::Corrupt(format!("fingerprint vector: {}", e)))?;
        let outcome = serde_json::from_str(row.get("outcome"))
            .map_err(|e| StoreError::Corrupt(format!("recognition outcome: {}", e)))?;
        let recognized_at = DateTime::parse_from_rfc3339(row.get("recognized_at"))
            .map_err(|e| StoreError::Corrupt(format!("recognized_at: {}", e)))?
            .with_timezone(&Utc);

        let record = FingerprintRecord {
            hash: hash.clone(),
            fingerprint: skald_domain::Fingerprint::new(
                vector,
                row.get::<i64, _>("duration_secs") as u32,
            ),
            outcome,
            recognized_at,
        };
        self.fingerprint_cache.insert(hash.clone(), record.clone());
        Ok(record)
    }

    pub async fn stats(&self) -> StoreStats {
        self.index.lock().await.stats()
    }
}
