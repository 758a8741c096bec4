// SPDX-License-Identifier: GPL-3.0-or-later

use skald_domain::FetchErrorKind;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The source could not be reached or answered with a failure status.
    /// `transient` controls whether the fetcher retries.
    #[error("source unreachable: {reason}")]
    Unreachable { reason: String, transient: bool },

    /// The source resolved but its content cannot be turned into audio
    /// (bad scheme, unknown container, no audio track). Never retried.
    #[error("unsupported content: {0}")]
    Unsupported(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Byte-size or duration ceiling exceeded. The download is aborted the
    /// moment the ceiling is crossed, never buffered to completion first.
    #[error("content too large: {0}")]
    TooLarge(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Unreachable { .. } => FetchErrorKind::Unreachable,
            Self::Unsupported(_) => FetchErrorKind::Unsupported,
            Self::Timeout(_) => FetchErrorKind::Timeout,
            Self::TooLarge(_) => FetchErrorKind::TooLarge,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { transient, .. } => *transient,
            Self::Timeout(_) => true,
            Self::Unsupported(_) | Self::TooLarge(_) => false,
        }
    }

    pub(crate) fn transient(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            reason: reason.into(),
            transient: true,
        }
    }

    pub(crate) fn permanent(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            reason: reason.into(),
            transient: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            FetchError::transient("reset").kind(),
            FetchErrorKind::Unreachable
        );
        assert_eq!(
            FetchError::Timeout(Duration::from_secs(1)).kind(),
            FetchErrorKind::Timeout
        );
        assert_eq!(
            FetchError::TooLarge("50MB".into()).kind(),
            FetchErrorKind::TooLarge
        );
        assert_eq!(
            FetchError::Unsupported("ftp".into()).kind(),
            FetchErrorKind::Unsupported
        );
    }

    #[test]
    fn only_network_failures_are_transient() {
        assert!(FetchError::transient("connection reset").is_transient());
        assert!(FetchError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!FetchError::permanent("404").is_transient());
        assert!(!FetchError::Unsupported("text/html".into()).is_transient());
        assert!(!FetchError::TooLarge("too big".into()).is_transient());
    }
}
