// SPDX-License-Identifier: GPL-3.0-or-later

//! Owner-scoped ordered playlists of recognized content.
//!
//! Entries are content hashes, deduplicated per owner. Positions exposed to
//! callers are always dense (0..n-1); removal reindexes. Every mutation is
//! durable in sqlite before it is acknowledged, and mutations for one owner
//! are serialized so reindexing never interleaves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use skald_domain::{ContentHash, OwnerId};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

pub type PlaylistPosition = u32;

pub type Result<T> = std::result::Result<T, PlaylistError>;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("content already present in playlist")]
    DuplicateEntry,

    #[error("playlist entry not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt playlist row: {0}")]
    Corrupt(String),
}

pub struct PlaylistManager {
    pool: SqlitePool,
    owner_locks: StdMutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
}

impl PlaylistManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            owner_locks: StdMutex::new(HashMap::new()),
        }
    }

    fn owner_lock(&self, owner: &OwnerId) -> Arc<Mutex<()>> {
        let mut locks = self.owner_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(owner.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append a hash to the owner's playlist and return its position.
    ///
    /// Content-addressed dedup at the playlist level: a hash already in
    /// this owner's playlist is rejected with `DuplicateEntry` and the
    /// playlist is left untouched.
    pub async fn append(&self, owner: &OwnerId, hash: &ContentHash) -> Result<PlaylistPosition> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;

        let exists =
            sqlx::query("SELECT 1 FROM playlist_entries WHERE owner = ? AND hash = ? LIMIT 1")
                .bind(owner.as_str())
                .bind(hash.as_str())
                .fetch_optional(&self.pool)
                .await?;
        if exists.is_some() {
            return Err(PlaylistError::DuplicateEntry);
        }

        let next: i64 = sqlx::query(
            "SELECT COALESCE(MAX(position) + 1, 0) AS next FROM playlist_entries WHERE owner = ?",
        )
        .bind(owner.as_str())
        .fetch_one(&self.pool)
        .await?
        .get("next");

        sqlx::query(
            "INSERT INTO playlist_entries (owner, position, hash, added_at) VALUES (?, ?, ?, ?)",
        )
        .bind(owner.as_str())
        .bind(next)
        .bind(hash.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(target: "playlist", %owner, %hash, position = next, "appended playlist entry");
        Ok(next as PlaylistPosition)
    }

    /// Remove the entry at a position and close the gap.
    ///
    /// Later entries shift down by one, so callers keep seeing a dense
    /// 0..n-1 sequence.
    pub async fn remove(&self, owner: &OwnerId, position: PlaylistPosition) -> Result<()> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM playlist_entries WHERE owner = ? AND position = ?")
            .bind(owner.as_str())
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(PlaylistError::NotFound);
        }

        sqlx::query(
            "UPDATE playlist_entries SET position = position - 1 WHERE owner = ? AND position > ?",
        )
        .bind(owner.as_str())
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(target: "playlist", %owner, position, "removed playlist entry");
        Ok(())
    }

    /// The owner's playlist in order.
    pub async fn list(&self, owner: &OwnerId) -> Result<Vec<ContentHash>> {
        let rows = sqlx::query(
            "SELECT hash FROM playlist_entries WHERE owner = ? ORDER BY position ASC",
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                ContentHash::parse(row.get("hash"))
                    .map_err(|e| PlaylistError::Corrupt(e.to_string()))
            })
            .collect()
    }
}
