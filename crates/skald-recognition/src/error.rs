// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecognitionError>;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("audio processing error: {0}")]
    AudioProcessing(String),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(#[from] skald_domain::InvalidFingerprint),

    #[error("recognition service error: {0}")]
    ServiceError(String),

    #[error("invalid response from recognition service: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Store(#[from] skald_store::StoreError),

    #[error("fingerprint task failed: {0}")]
    TaskFailed(String),
}

impl RecognitionError {
    /// Failures of the external capability itself: the ones that yield a
    /// `RecognitionUnavailable` outcome instead of failing the job.
    pub fn is_capability_failure(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_) | Self::ServiceError(_) | Self::InvalidResponse(_)
        )
    }
}
