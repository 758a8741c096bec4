// SPDX-License-Identifier: GPL-3.0-or-later
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Value Objects & IDs
// ============================================================================

/// Opaque identifier of the requester a job or playlist is scoped to.
///
/// The pipeline never interprets it; the front-end decides what it means
/// (a chat user id, a channel id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to remote content (typically a URL).
///
/// Not content-addressed: two different references may resolve to the same
/// audio, and the same reference may stop resolving at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceReference(pub String);

impl SourceReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Content Hash
// ============================================================================

/// SHA-256 digest over normalized audio bytes, lowercase hex.
///
/// The primary key for dedup, caching, fingerprint records, and playlist
/// entries. Identical normalized audio always yields the same hash no matter
/// which source reference it arrived through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap a digest already known to be 64 lowercase hex characters.
    pub fn from_digest(hex: String) -> Self {
        debug_assert_eq!(hex.len(), 64);
        Self(hex)
    }

    /// Parse an untrusted string (API input, database row).
    pub fn parse(s: &str) -> Result<Self, InvalidContentHash> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidContentHash(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("not a valid content hash: {0:?}")]
pub struct InvalidContentHash(pub String);

// ============================================================================
// Audio Artifacts
// ============================================================================

/// Canonical sample rate all artifacts are normalized to.
pub const CANONICAL_SAMPLE_RATE: u32 = 44_100;

/// Canonical channel count (mono) all artifacts are normalized to.
pub const CANONICAL_CHANNELS: u16 = 1;

/// Format descriptor of a normalized audio artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Codec tag of the normalized payload, e.g. `pcm_s16le`.
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: u32,
}

impl AudioFormat {
    /// Descriptor for the canonical normalized form: mono 16-bit LE PCM
    /// at 44.1 kHz.
    pub fn canonical(duration_secs: u32) -> Self {
        Self {
            codec: "pcm_s16le".to_string(),
            sample_rate: CANONICAL_SAMPLE_RATE,
            channels: CANONICAL_CHANNELS,
            duration_secs,
        }
    }
}

/// Normalized audio bytes plus their descriptor and content hash.
///
/// Immutable once created; owned by the store. Everything else passes
/// around the [`ContentHash`] instead of the bytes.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub hash: ContentHash,
    pub format: AudioFormat,
    pub bytes: Bytes,
}

impl AudioArtifact {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// ============================================================================
// Fingerprints & Recognition
// ============================================================================

/// Compact spectral feature vector derived from normalized audio.
///
/// Deterministic: identical artifact bytes always produce an identical
/// vector, which is what makes fingerprinting cacheable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub vector: Vec<u32>,
    /// Duration of the audio the vector was computed over, in seconds.
    pub duration_secs: u32,
}

impl Fingerprint {
    pub fn new(vector: Vec<u32>, duration_secs: u32) -> Self {
        Self {
            vector,
            duration_secs,
        }
    }

    /// Validate the fingerprint before handing it to the recognition
    /// capability.
    pub fn validate(&self) -> Result<(), InvalidFingerprint> {
        if self.vector.is_empty() {
            return Err(InvalidFingerprint("fingerprint vector is empty".into()));
        }
        if self.duration_secs == 0 {
            return Err(InvalidFingerprint("duration must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid fingerprint: {0}")]
pub struct InvalidFingerprint(pub String);

/// What the recognition step concluded about a piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecognitionOutcome {
    /// The external capability matched the fingerprint with confidence at
    /// or above the configured threshold.
    Recognized {
        title: String,
        artist: String,
        confidence: f32,
    },
    /// The capability answered but had no confident match. Stored so the
    /// external query is not repeated on every lookup.
    Unrecognized,
    /// The capability could not be reached (timeout, quota, outage). The
    /// fingerprint is still stored so recognition can be retried later
    /// without re-fetching the audio.
    RecognitionUnavailable,
}

impl RecognitionOutcome {
    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Recognized { .. })
    }
}

/// Recognition result for one content hash.
///
/// At most one record exists per hash; recomputation is idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub hash: ContentHash,
    pub fingerprint: Fingerprint,
    pub outcome: RecognitionOutcome,
    pub recognized_at: DateTime<Utc>,
}

// ============================================================================
// Jobs
// ============================================================================

/// Stable error kind a failed job carries to the caller.
///
/// Never an opaque "something went wrong": the front-end renders these into
/// actionable messages (retry vs. unsupported content).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "kind", rename_all = "snake_case")]
pub enum JobError {
    Fetch(FetchErrorKind),
    Store(StoreErrorKind),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Unreachable,
    Unsupported,
    Timeout,
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    NotFound,
    CapacityExceeded,
    Internal,
}

/// Lifecycle of an acquisition job.
///
/// `Done` and `Failed` are terminal; no transition leaves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Fetching,
    Recognizing,
    Done {
        content_hash: ContentHash,
        outcome: RecognitionOutcome,
    },
    Failed {
        error: JobError,
    },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

/// Snapshot of a job as seen by callers polling its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub owner: OwnerId,
    pub source: SourceReference,
    pub submitted_at: DateTime<Utc>,
    pub state: JobState,
}
