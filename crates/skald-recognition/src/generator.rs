// SPDX-License-Identifier: GPL-3.0-or-later

//! Fingerprint computation from normalized audio.
//!
//! Pure and deterministic: the vector depends only on the artifact bytes,
//! which is what makes fingerprints cacheable per content hash.

use rusty_chromaprint::{Configuration, Fingerprinter};
use skald_domain::{AudioArtifact, Fingerprint};
use tracing::debug;

use crate::error::{RecognitionError, Result};

/// Maximum duration to use for fingerprinting (in seconds).
/// Chromaprint standard is 120 seconds for optimal recognition.
const MAX_FINGERPRINT_DURATION_SECS: u32 = 120;

/// Compute a Chromaprint feature vector over an artifact's canonical PCM.
///
/// Only the first 120 seconds contribute; the rest adds cost without
/// improving match quality.
pub fn compute_fingerprint(artifact: &AudioArtifact) -> Result<Fingerprint> {
    let bytes = &artifact.bytes;
    if bytes.len() < 2 {
        return Err(RecognitionError::AudioProcessing(
            "artifact contains no samples".to_string(),
        ));
    }

    let mut samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let sample_rate = artifact.format.sample_rate;
    let max_samples =
        (sample_rate as usize * artifact.format.channels as usize) * MAX_FINGERPRINT_DURATION_SECS as usize;
    if samples.len() > max_samples {
        debug!(
            target: "recognition",
            original_len = samples.len(),
            max_samples,
            "truncating samples to fingerprint duration limit"
        );
        samples.truncate(max_samples);
    }

    let mut printer = Fingerprinter::new(&Configuration::preset_test2());
    printer
        .start(sample_rate, artifact.format.channels as u32)
        .map_err(|e| RecognitionError::AudioProcessing(format!("fingerprinter start: {:?}", e)))?;
    printer.consume(&samples);
    printer.finish();

    let vector = printer.fingerprint().to_vec();
    if vector.is_empty() {
        return Err(RecognitionError::AudioProcessing(
            "audio too short to fingerprint".to_string(),
        ));
    }

    let duration_secs = artifact
        .format
        .duration_secs
        .min(MAX_FINGERPRINT_DURATION_SECS);
    Ok(Fingerprint::new(vector, duration_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use skald_domain::{AudioFormat, ContentHash};

    fn artifact_with_tone(duration_secs: u32, frequency: f32) -> AudioArtifact {
        let sample_rate = 44_100u32;
        let total = (sample_rate * duration_secs) as usize;
        let mut bytes = Vec::with_capacity(total * 2);
        for i in 0..total {
            let t = i as f32 / sample_rate as f32;
            let sample = ((t * frequency * std::f32::consts::TAU).sin() * 16_000.0) as i16;
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        AudioArtifact {
            hash: ContentHash::parse(&"11".repeat(32)).unwrap(),
            format: AudioFormat::canonical(duration_secs),
            bytes: Bytes::from(bytes),
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let artifact = artifact_with_tone(5, 440.0);
        let first = compute_fingerprint(&artifact).unwrap();
        let second = compute_fingerprint(&artifact).unwrap();
        assert_eq!(first, second);
        assert!(first.validate().is_ok());
    }

    #[test]
    fn different_audio_yields_different_vectors() {
        let a = compute_fingerprint(&artifact_with_tone(5, 440.0)).unwrap();
        let b = compute_fingerprint(&artifact_with_tone(5, 1760.0)).unwrap();
        assert_ne!(a.vector, b.vector);
    }

    #[test]
    fn empty_artifact_is_rejected() {
        let artifact = AudioArtifact {
            hash: ContentHash::parse(&"22".repeat(32)).unwrap(),
            format: AudioFormat::canonical(0),
            bytes: Bytes::new(),
        };
        assert!(matches!(
            compute_fingerprint(&artifact),
            Err(RecognitionError::AudioProcessing(_))
        ));
    }

    #[test]
    fn duration_is_capped_at_fingerprint_window() {
        let artifact = artifact_with_tone(10, 330.0);
        let fp = compute_fingerprint(&artifact).unwrap();
        assert_eq!(fp.duration_secs, 10);
    }
}
