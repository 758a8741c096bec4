// SPDX-License-Identifier: GPL-3.0-or-later

//! Decodes fetched media into the canonical audio form.
//!
//! Canonical form is mono 16-bit LE PCM at 44.1 kHz. Normalizing here is
//! what makes the content hash container-independent: the same audio
//! delivered as FLAC, MP3, or WAV ends up as identical bytes.

use std::io::{Cursor, ErrorKind};

use bytes::Bytes;
use skald_domain::{AudioFormat, CANONICAL_SAMPLE_RATE};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::error::{FetchError, Result};
use crate::transport::RawMedia;

/// Normalized audio ready to be handed to the store.
#[derive(Debug, Clone)]
pub struct NormalizedAudio {
    pub bytes: Bytes,
    pub format: AudioFormat,
}

pub struct Normalizer {
    max_duration_secs: u32,
}

impl Normalizer {
    pub fn new(max_duration_secs: u32) -> Self {
        Self { max_duration_secs }
    }

    /// Decode raw media and produce canonical PCM.
    ///
    /// Fails with `Unsupported` when no decodable audio track is found and
    /// with `TooLarge` when the decoded duration passes the ceiling; the
    /// decode loop stops at the ceiling instead of decoding to completion.
    pub fn normalize(&self, media: &RawMedia) -> Result<NormalizedAudio> {
        let (samples, sample_rate) = self.decode_to_mono(media)?;

        if samples.is_empty() {
            return Err(FetchError::Unsupported(
                "source contained no audio samples".to_string(),
            ));
        }

        let samples = resample_linear(&samples, sample_rate, CANONICAL_SAMPLE_RATE);
        let duration_secs = (samples.len() as u32 / CANONICAL_SAMPLE_RATE).max(1);
        if duration_secs > self.max_duration_secs {
            return Err(FetchError::TooLarge(format!(
                "duration {}s exceeds limit {}s",
                duration_secs, self.max_duration_secs
            )));
        }

        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in &samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        debug!(
            target: "fetcher",
            duration_secs,
            pcm_bytes = bytes.len(),
            "normalized audio to canonical form"
        );

        Ok(NormalizedAudio {
            bytes: Bytes::from(bytes),
            format: AudioFormat::canonical(duration_secs),
        })
    }

    /// Decode any supported container to mono i16 at the source rate.
    fn decode_to_mono(&self, media: &RawMedia) -> Result<(Vec<i16>, u32)> {
        let cursor = Cursor::new(media.bytes.to_vec());
        let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = &media.extension_hint {
            hint.with_extension(ext);
        }
        if let Some(ct) = &media.content_type {
            hint.mime_type(ct);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| FetchError::Unsupported(format!("failed to probe container: {}", e)))?;

        let mut format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| FetchError::Unsupported("no audio tracks found".to_string()))?;
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| FetchError::Unsupported(format!("failed to create decoder: {}", e)))?;

        let mut sample_rate = track
            .codec_params
            .sample_rate
            .unwrap_or(CANONICAL_SAMPLE_RATE);
        let mut samples: Vec<i16> = Vec::new();

        loop {
            // Bail as soon as the duration ceiling is crossed rather than
            // decoding the rest of the stream.
            if samples.len() as u64 > self.max_duration_secs as u64 * sample_rate as u64 {
                return Err(FetchError::TooLarge(format!(
                    "duration exceeds limit of {}s",
                    self.max_duration_secs
                )));
            }

            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(FetchError::Unsupported(format!(
                        "error reading packet: {}",
                        e
                    )))
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = decoder
                .decode(&packet)
                .map_err(|e| FetchError::Unsupported(format!("failed to decode frame: {}", e)))?;

            match decoded {
                AudioBufferRef::F32(buf) => {
                    let spec = buf.spec();
                    if spec.rate > 0 {
                        sample_rate = spec.rate;
                    }
                    let channels = spec.channels.count().max(1);
                    for frame_idx in 0..buf.frames() {
                        let mut mixed = 0.0f32;
                        for ch in 0..channels {
                            mixed += buf.chan(ch)[frame_idx];
                        }
                        mixed /= channels as f32;
                        let clipped = mixed.clamp(-1.0, 1.0);
                        samples.push((clipped * i16::MAX as f32) as i16);
                    }
                }
                AudioBufferRef::S16(buf) => {
                    let spec = buf.spec();
                    if spec.rate > 0 {
                        sample_rate = spec.rate;
                    }
                    let channels = spec.channels.count().max(1);
                    for frame_idx in 0..buf.frames() {
                        let mut mixed: i32 = 0;
                        for ch in 0..channels {
                            mixed += buf.chan(ch)[frame_idx] as i32;
                        }
                        mixed /= channels as i32;
                        samples.push(mixed.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
                    }
                }
                AudioBufferRef::S32(buf) => {
                    let spec = buf.spec();
                    if spec.rate > 0 {
                        sample_rate = spec.rate;
                    }
                    let channels = spec.channels.count().max(1);
                    for frame_idx in 0..buf.frames() {
                        let mut mixed: f64 = 0.0;
                        for ch in 0..channels {
                            mixed += buf.chan(ch)[frame_idx] as f64;
                        }
                        mixed /= channels as f64;
                        let clipped = (mixed / i32::MAX as f64).clamp(-1.0, 1.0);
                        samples.push((clipped * i16::MAX as f64) as i16);
                    }
                }
                _other => {
                    return Err(FetchError::Unsupported(
                        "unsupported sample format".to_string(),
                    ));
                }
            }
        }

        Ok((samples, sample_rate))
    }
}

/// Linear-interpolation resampler.
///
/// Deterministic and cheap; fidelity is sufficient for hashing and
/// fingerprinting, which is all the canonical form exists for.
fn resample_linear(samples: &[i16], src_rate: u32, dst_rate: u32) -> Vec<i16> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * dst_rate as u64 / src_rate as u64) as usize;
    let mut out = Vec::with_capacity(out_len);
    let step = src_rate as f64 / dst_rate as f64;
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = pos - idx as f64;
        let a = samples[idx.min(samples.len() - 1)] as f64;
        let b = samples[(idx + 1).min(samples.len() - 1)] as f64;
        out.push((a + (b - a) * frac).round() as i16);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::wav_bytes;

    #[test]
    fn resample_identity_when_rates_match() {
        let samples = vec![1i16, 2, 3, 4];
        assert_eq!(resample_linear(&samples, 44_100, 44_100), samples);
    }

    #[test]
    fn resample_halves_sample_count_when_downsampling() {
        let samples: Vec<i16> = (0..1000).map(|i| (i % 100) as i16).collect();
        let out = resample_linear(&samples, 88_200, 44_100);
        assert_eq!(out.len(), 500);
    }

    #[test]
    fn normalizes_wav_to_canonical_format() {
        let samples: Vec<i16> = (0..44_100).map(|i| ((i % 200) * 100) as i16).collect();
        let media = RawMedia {
            bytes: wav_bytes(&samples, 44_100, 1),
            content_type: Some("audio/wav".to_string()),
            extension_hint: Some("wav".to_string()),
        };

        let normalizer = Normalizer::new(60);
        let audio = normalizer.normalize(&media).unwrap();
        assert_eq!(audio.format.codec, "pcm_s16le");
        assert_eq!(audio.format.sample_rate, CANONICAL_SAMPLE_RATE);
        assert_eq!(audio.format.channels, 1);
        assert_eq!(audio.format.duration_secs, 1);
        assert_eq!(audio.bytes.len(), samples.len() * 2);
    }

    #[test]
    fn stereo_and_mono_of_identical_audio_normalize_to_identical_bytes() {
        let mono: Vec<i16> = (0..22_050).map(|i| ((i % 100) * 50) as i16).collect();
        // The same signal duplicated into both channels.
        let mut stereo = Vec::with_capacity(mono.len() * 2);
        for s in &mono {
            stereo.push(*s);
            stereo.push(*s);
        }

        let normalizer = Normalizer::new(60);
        let from_mono = normalizer
            .normalize(&RawMedia {
                bytes: wav_bytes(&mono, 44_100, 1),
                content_type: None,
                extension_hint: Some("wav".to_string()),
            })
            .unwrap();
        let from_stereo = normalizer
            .normalize(&RawMedia {
                bytes: wav_bytes(&stereo, 44_100, 2),
                content_type: None,
                extension_hint: Some("wav".to_string()),
            })
            .unwrap();

        assert_eq!(from_mono.bytes, from_stereo.bytes);
    }

    #[test]
    fn duration_ceiling_fails_with_too_large() {
        let samples: Vec<i16> = vec![100; 44_100 * 3];
        let media = RawMedia {
            bytes: wav_bytes(&samples, 44_100, 1),
            content_type: None,
            extension_hint: Some("wav".to_string()),
        };

        let normalizer = Normalizer::new(2);
        let err = normalizer.normalize(&media).unwrap_err();
        assert!(matches!(err, FetchError::TooLarge(_)));
    }

    #[test]
    fn garbage_bytes_fail_with_unsupported() {
        let media = RawMedia {
            bytes: Bytes::from_static(b"<html>not audio</html>"),
            content_type: Some("text/html".to_string()),
            extension_hint: Some("html".to_string()),
        };

        let normalizer = Normalizer::new(60);
        let err = normalizer.normalize(&media).unwrap_err();
        assert!(matches!(err, FetchError::Unsupported(_)));
    }
}
