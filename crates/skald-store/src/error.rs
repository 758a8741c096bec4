// SPDX-License-Identifier: GPL-3.0-or-later

use skald_domain::StoreErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found")]
    NotFound,

    /// The incoming artifact cannot fit: it is larger than the whole store,
    /// or everything evictable is pinned by in-flight jobs.
    #[error("store capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt stored record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            Self::NotFound => StoreErrorKind::NotFound,
            Self::CapacityExceeded(_) => StoreErrorKind::CapacityExceeded,
            Self::Io(_) | Self::Database(_) | Self::Corrupt(_) => StoreErrorKind::Internal,
        }
    }
}
