// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://skald.db".to_string(),
            pool_max_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5160,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Hard ceiling on raw bytes fetched per source before the download is
    /// aborted with TooLarge.
    pub max_bytes: u64,
    /// Hard ceiling on normalized audio duration.
    pub max_duration_seconds: u32,
    /// Whole-request deadline for one fetch attempt.
    pub fetch_timeout_seconds: u64,
    /// Total attempts for transient failures, including the first.
    pub retry_max_attempts: u32,
    /// Backoff base; attempt N waits base * 2^(N-1).
    pub retry_base_delay_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_bytes: 45 * 1024 * 1024,
            max_duration_seconds: 900,
            fetch_timeout_seconds: 120,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory artifact blobs are written under.
    pub data_dir: String,
    /// Total bytes of artifact payload kept before LRU eviction kicks in.
    pub store_capacity_bytes: u64,
    /// Entries in the in-process fingerprint record cache.
    pub fingerprint_cache_entries: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            store_capacity_bytes: 2 * 1024 * 1024 * 1024,
            fingerprint_cache_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Minimum confidence (0-1) for a match to count as recognized.
    pub min_confidence: f32,
    pub timeout_seconds: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.audioscout.example/v1".to_string(),
            api_key: None,
            min_confidence: 0.7,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker tasks draining the job queues.
    pub workers: usize,
    pub max_inflight_global: usize,
    pub max_inflight_per_owner: usize,
    pub max_queue_depth_per_owner: usize,
    /// Seconds a terminal job stays pollable before housekeeping drops it.
    pub retention_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_inflight_global: 32,
            max_inflight_per_owner: 2,
            max_queue_depth_per_owner: 8,
            retention_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub telemetry: TelemetryConfig,
    pub fetcher: FetcherConfig,
    pub store: StoreConfig,
    pub recognition: RecognitionConfig,
    pub scheduler: SchedulerConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: SKALD_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("SKALD_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}
