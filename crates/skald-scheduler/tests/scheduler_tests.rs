// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use skald_config::{FetcherConfig, SchedulerConfig, StoreConfig};
use skald_domain::{
    FetchErrorKind, JobError, JobState, OwnerId, RecognitionOutcome, SourceReference,
};
use skald_fetcher::{FetchError, Fetcher, RawMedia, Transport};
use skald_playlist::PlaylistManager;
use skald_recognition::{RecognitionClient, RecognitionEngine};
use skald_scheduler::{Scheduler, SchedulerError};
use skald_store::Store;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

/// Serves a deterministic 5-second WAV per `seed=` query parameter and
/// records every source it is asked for.
struct RecordingTransport {
    delay: Duration,
    fetched: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

fn wav_bytes(samples: &[i16], sample_rate: u32) -> Bytes {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    Bytes::from(out)
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn retrieve(&self, source: &SourceReference) -> skald_fetcher::Result<RawMedia> {
        self.fetched
            .lock()
            .unwrap()
            .push(source.as_str().to_string());
        tokio::time::sleep(self.delay).await;

        if source.as_str().contains("toolarge") {
            return Err(FetchError::TooLarge("50MB exceeds 10MB".to_string()));
        }

        let seed: u32 = source
            .as_str()
            .split("seed=")
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        let sample_rate = 44_100u32;
        let samples: Vec<i16> = (0..sample_rate as usize * 5)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                ((t * (220.0 * seed as f32) * std::f32::consts::TAU).sin() * 12_000.0) as i16
            })
            .collect();

        Ok(RawMedia {
            bytes: wav_bytes(&samples, sample_rate),
            content_type: Some("audio/wav".to_string()),
            extension_hint: Some("wav".to_string()),
        })
    }
}

struct Harness {
    scheduler: Scheduler,
    store: Arc<Store>,
    playlists: Arc<PlaylistManager>,
    transport: Arc<RecordingTransport>,
    _dir: TempDir,
}

async fn harness(limits: SchedulerConfig, transport: Arc<RecordingTransport>) -> Harness {
    let dir = TempDir::new().unwrap();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("pool");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("migrations");

    let store = Arc::new(
        Store::open(
            &StoreConfig {
                data_dir: dir.path().to_string_lossy().to_string(),
                store_capacity_bytes: 256 * 1024 * 1024,
                fingerprint_cache_entries: 100,
            },
            pool.clone(),
        )
        .await
        .expect("store"),
    );

    // Nothing listens here: recognition is always unavailable, which must
    // not fail jobs.
    let client = RecognitionClient::builder("http://127.0.0.1:9")
        .timeout(Duration::from_millis(500))
        .build()
        .expect("client");
    let engine = Arc::new(RecognitionEngine::new(Arc::clone(&store), client));

    let fetcher = Arc::new(Fetcher::new(
        transport.clone(),
        &FetcherConfig {
            max_bytes: 10 * 1024 * 1024,
            max_duration_seconds: 60,
            fetch_timeout_seconds: 5,
            retry_max_attempts: 1,
            retry_base_delay_ms: 1,
        },
    ));
    let playlists = Arc::new(PlaylistManager::new(pool));

    let scheduler = Scheduler::new(
        limits,
        fetcher,
        Arc::clone(&store),
        engine,
        Arc::clone(&playlists),
    );

    Harness {
        scheduler,
        store,
        playlists,
        transport,
        _dir: dir,
    }
}

fn limits() -> SchedulerConfig {
    SchedulerConfig {
        workers: 2,
        max_inflight_global: 16,
        max_inflight_per_owner: 4,
        max_queue_depth_per_owner: 8,
        retention_seconds: 300,
    }
}

#[tokio::test]
async fn job_reaches_done_with_hash_and_outcome() {
    let transport = Arc::new(RecordingTransport::new(Duration::ZERO));
    let h = harness(limits(), transport).await;
    h.scheduler.start();

    let mut handle = h
        .scheduler
        .submit(
            OwnerId::from("alice"),
            SourceReference::new("https://media.test/a?seed=1"),
            false,
        )
        .unwrap();

    let state = handle.wait_terminal().await;
    let JobState::Done {
        content_hash,
        outcome,
    } = state
    else {
        panic!("expected done, got {:?}", state);
    };

    // Recognition capability is down, but acquisition succeeded.
    assert_eq!(outcome, RecognitionOutcome::RecognitionUnavailable);
    assert!(h.store.get(&content_hash).await.is_ok());
    assert!(h.store.lookup_fingerprint(&content_hash).await.is_ok());

    let status = h.scheduler.poll(&handle.id).unwrap();
    assert!(status.state.is_terminal());
}

#[tokio::test]
async fn identical_audio_from_two_sources_stores_once() {
    let transport = Arc::new(RecordingTransport::new(Duration::ZERO));
    let h = harness(limits(), transport).await;
    h.scheduler.start();

    let mut h1 = h
        .scheduler
        .submit(
            OwnerId::from("alice"),
            SourceReference::new("https://mirror-one.test/x?seed=7"),
            false,
        )
        .unwrap();
    let mut h2 = h
        .scheduler
        .submit(
            OwnerId::from("bob"),
            SourceReference::new("https://mirror-two.test/y?seed=7"),
            false,
        )
        .unwrap();

    let (s1, s2) = (h1.wait_terminal().await, h2.wait_terminal().await);
    let (JobState::Done { content_hash: a, .. }, JobState::Done { content_hash: b, .. }) = (s1, s2)
    else {
        panic!("both jobs should be done");
    };

    assert_eq!(a, b);
    assert_eq!(h.store.stats().await.artifact_count, 1);
}

#[tokio::test]
async fn oversized_source_fails_without_store_write() {
    let transport = Arc::new(RecordingTransport::new(Duration::ZERO));
    let h = harness(limits(), transport).await;
    h.scheduler.start();

    let mut handle = h
        .scheduler
        .submit(
            OwnerId::from("alice"),
            SourceReference::new("https://media.test/toolarge"),
            false,
        )
        .unwrap();

    let state = handle.wait_terminal().await;
    assert_eq!(
        state,
        JobState::Failed {
            error: JobError::Fetch(FetchErrorKind::TooLarge)
        }
    );
    assert_eq!(h.store.stats().await.artifact_count, 0);
}

#[tokio::test]
async fn per_owner_limit_rejects_exactly_the_excess() {
    let mut config = limits();
    config.max_inflight_per_owner = 2;
    let transport = Arc::new(RecordingTransport::new(Duration::from_millis(300)));
    let h = harness(config, transport).await;
    // Workers intentionally not started: all four submissions race only
    // against admission control.

    let owner = OwnerId::from("alice");
    let results: Vec<_> = (0..4)
        .map(|i| {
            h.scheduler.submit(
                owner.clone(),
                SourceReference::new(format!("https://media.test/{i}?seed={i}")),
                false,
            )
        })
        .collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(SchedulerError::Overloaded(_))))
        .count();
    assert_eq!(admitted, 2);
    assert_eq!(rejected, 2);
}

#[tokio::test]
async fn global_limit_rejects_across_owners() {
    let mut config = limits();
    config.max_inflight_global = 2;
    let transport = Arc::new(RecordingTransport::new(Duration::from_millis(300)));
    let h = harness(config, transport).await;

    assert!(h
        .scheduler
        .submit(OwnerId::from("a"), SourceReference::new("https://m/1"), false)
        .is_ok());
    assert!(h
        .scheduler
        .submit(OwnerId::from("b"), SourceReference::new("https://m/2"), false)
        .is_ok());
    assert!(matches!(
        h.scheduler
            .submit(OwnerId::from("c"), SourceReference::new("https://m/3"), false),
        Err(SchedulerError::Overloaded(_))
    ));
}

#[tokio::test]
async fn cancelled_queued_job_never_reaches_the_fetcher() {
    let mut config = limits();
    config.workers = 1;
    let transport = Arc::new(RecordingTransport::new(Duration::from_millis(200)));
    let h = harness(config, Arc::clone(&transport)).await;
    h.scheduler.start();

    let mut first = h
        .scheduler
        .submit(
            OwnerId::from("alice"),
            SourceReference::new("https://media.test/first?seed=1"),
            false,
        )
        .unwrap();
    // Let the single worker pick up the first job.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = h
        .scheduler
        .submit(
            OwnerId::from("alice"),
            SourceReference::new("https://media.test/second?seed=2"),
            false,
        )
        .unwrap();
    h.scheduler.cancel(&second.id).unwrap();

    assert_eq!(
        second.wait_terminal().await,
        JobState::Failed {
            error: JobError::Cancelled
        }
    );
    first.wait_terminal().await;

    let fetched = h.transport.fetched();
    assert_eq!(fetched.len(), 1);
    assert!(fetched[0].contains("first"));
}

#[tokio::test]
async fn cancel_during_fetch_stops_before_any_store_write() {
    let mut config = limits();
    config.workers = 1;
    let transport = Arc::new(RecordingTransport::new(Duration::from_millis(300)));
    let h = harness(config, Arc::clone(&transport)).await;
    h.scheduler.start();

    let mut handle = h
        .scheduler
        .submit(
            OwnerId::from("alice"),
            SourceReference::new("https://media.test/a?seed=1"),
            false,
        )
        .unwrap();

    // The fetch is in flight; cancellation is honored at the next boundary.
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.scheduler.cancel(&handle.id).unwrap();

    assert_eq!(
        handle.wait_terminal().await,
        JobState::Failed {
            error: JobError::Cancelled
        }
    );
    // The network operation ran, but nothing became visible in the store.
    assert_eq!(h.transport.fetched().len(), 1);
    assert_eq!(h.store.stats().await.artifact_count, 0);
}

#[tokio::test]
async fn dispatch_interleaves_fairly_across_owners_with_one_worker() {
    let mut config = limits();
    config.workers = 1;
    let transport = Arc::new(RecordingTransport::new(Duration::from_millis(50)));
    let h = harness(config, Arc::clone(&transport)).await;

    let mut a1 = h
        .scheduler
        .submit(
            OwnerId::from("alice"),
            SourceReference::new("https://m/a1?seed=1"),
            false,
        )
        .unwrap();
    let mut a2 = h
        .scheduler
        .submit(
            OwnerId::from("alice"),
            SourceReference::new("https://m/a2?seed=2"),
            false,
        )
        .unwrap();
    let mut b1 = h
        .scheduler
        .submit(
            OwnerId::from("bob"),
            SourceReference::new("https://m/b1?seed=3"),
            false,
        )
        .unwrap();

    // Start only after every queue is populated so dispatch order is
    // deterministic.
    h.scheduler.start();

    for handle in [&mut a1, &mut b1, &mut a2] {
        assert!(handle.wait_terminal().await.is_terminal());
    }

    let fetched = h.transport.fetched();
    assert_eq!(fetched.len(), 3);
    assert!(fetched[0].contains("a1"));
    assert!(fetched[1].contains("b1"), "expected bob's job second, got {:?}", fetched);
    assert!(fetched[2].contains("a2"));
}

#[tokio::test]
async fn done_job_appends_to_playlist_when_requested() {
    let transport = Arc::new(RecordingTransport::new(Duration::ZERO));
    let h = harness(limits(), transport).await;
    h.scheduler.start();

    let owner = OwnerId::from("alice");
    let mut handle = h
        .scheduler
        .submit(
            owner.clone(),
            SourceReference::new("https://media.test/a?seed=4"),
            true,
        )
        .unwrap();

    let JobState::Done { content_hash, .. } = handle.wait_terminal().await else {
        panic!("expected done");
    };

    assert_eq!(h.playlists.list(&owner).await.unwrap(), vec![content_hash]);
}

#[tokio::test]
async fn expired_terminal_jobs_are_swept() {
    let mut config = limits();
    config.retention_seconds = 0;
    let transport = Arc::new(RecordingTransport::new(Duration::ZERO));
    let h = harness(config, transport).await;
    h.scheduler.start();

    let mut handle = h
        .scheduler
        .submit(
            OwnerId::from("alice"),
            SourceReference::new("https://media.test/a?seed=1"),
            false,
        )
        .unwrap();
    handle.wait_terminal().await;

    // Either our explicit sweep or the housekeeping timer drops it.
    h.scheduler.sweep_expired();
    assert!(h.scheduler.poll(&handle.id).is_none());
}
