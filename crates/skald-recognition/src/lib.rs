// SPDX-License-Identifier: GPL-3.0-or-later

//! Audio fingerprinting and recognition for acquired content.
//!
//! This crate provides functionality for:
//! - Computing Chromaprint feature vectors from normalized audio
//! - Querying the external recognition capability with confidence thresholds
//! - Memoizing results per content hash through the store

pub mod client;
pub mod engine;
pub mod error;
pub mod generator;

pub use client::{RecognitionClient, RecognitionClientBuilder, TrackMatch};
pub use engine::RecognitionEngine;
pub use error::{RecognitionError, Result};
pub use generator::compute_fingerprint;
