// SPDX-License-Identifier: GPL-3.0-or-later

//! Job scheduler: admission control and worker-pool dispatch for the
//! acquisition pipeline.
//!
//! Each job runs fetch → store → recognize sequentially inside one worker
//! slot. Queues are FIFO per owner with round-robin dispatch across owners,
//! so one noisy owner cannot starve the rest.

pub mod error;
pub mod handle;
mod state;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use skald_config::SchedulerConfig;
use skald_domain::{JobError, JobId, JobState, JobStatus, OwnerId, SourceReference, StoreErrorKind};
use skald_fetcher::Fetcher;
use skald_playlist::{PlaylistError, PlaylistManager};
use skald_recognition::{RecognitionEngine, RecognitionError};
use skald_store::Store;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

pub use error::{Result, SchedulerError};
pub use handle::JobHandle;

use state::{DispatchedJob, SchedState};

pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    limits: SchedulerConfig,
    fetcher: Arc<Fetcher>,
    store: Arc<Store>,
    engine: Arc<RecognitionEngine>,
    playlists: Arc<PlaylistManager>,
    state: Mutex<SchedState>,
    work_available: Notify,
}

impl SchedulerInner {
    fn state(&self) -> MutexGuard<'_, SchedState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(target: "scheduler", "state mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn finish(&self, id: &JobId, state: JobState) {
        self.state().finish(id, state);
    }

    fn cancelled(&self, id: &JobId) -> bool {
        self.state().is_cancelled(id)
    }
}

impl Scheduler {
    pub fn new(
        limits: SchedulerConfig,
        fetcher: Arc<Fetcher>,
        store: Arc<Store>,
        engine: Arc<RecognitionEngine>,
        playlists: Arc<PlaylistManager>,
    ) -> Self {
        let state = SchedState::new(limits.clone());
        Self {
            inner: Arc::new(SchedulerInner {
                limits,
                fetcher,
                store,
                engine,
                playlists,
                state: Mutex::new(state),
                work_available: Notify::new(),
            }),
        }
    }

    /// Start the worker pool and the retention housekeeping task.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.inner.limits.workers + 1);
        for worker_id in 0..self.inner.limits.workers {
            let inner = Arc::clone(&self.inner);
            handles.push(tokio::spawn(async move {
                worker_loop(inner, worker_id).await;
            }));
        }

        let inner = Arc::clone(&self.inner);
        handles.push(tokio::spawn(async move {
            housekeeping_loop(inner).await;
        }));

        info!(
            target: "scheduler",
            workers = self.inner.limits.workers,
            "scheduler started"
        );
        handles
    }

    /// Submit an acquisition request.
    ///
    /// Fails with `Overloaded` when the global ceiling, the owner's
    /// in-flight ceiling, or the owner's queue depth is exhausted.
    pub fn submit(
        &self,
        owner: OwnerId,
        source: SourceReference,
        append_to_playlist: bool,
    ) -> Result<JobHandle> {
        let handle = self
            .inner
            .state()
            .admit(owner.clone(), source.clone(), append_to_playlist)?;
        info!(
            target: "scheduler",
            job_id = %handle.id,
            %owner,
            %source,
            "job admitted"
        );
        self.inner.work_available.notify_one();
        Ok(handle)
    }

    /// Current status of a job, or `None` once retention dropped it.
    pub fn poll(&self, id: &JobId) -> Option<JobStatus> {
        self.inner.state().status(id)
    }

    /// Cancel a job cooperatively.
    ///
    /// A queued job is removed without ever reaching the fetcher; an
    /// executing job stops at its next step boundary.
    pub fn cancel(&self, id: &JobId) -> Result<()> {
        self.inner.state().cancel(id)
    }

    /// Drop terminal jobs older than the retention window immediately,
    /// returning how many were removed. The housekeeping task calls this
    /// on a timer; it is exposed for operational tooling.
    pub fn sweep_expired(&self) -> usize {
        let retention = Duration::from_secs(self.inner.limits.retention_seconds);
        self.inner.state().sweep(retention)
    }
}

async fn worker_loop(inner: Arc<SchedulerInner>, worker_id: usize) {
    debug!(target: "scheduler", worker_id, "worker started");
    loop {
        let job = inner.state().next_job();
        match job {
            Some(job) => run_job(&inner, job).await,
            None => inner.work_available.notified().await,
        }
    }
}

async fn housekeeping_loop(inner: Arc<SchedulerInner>) {
    let retention = Duration::from_secs(inner.limits.retention_seconds);
    let period = (retention / 2).clamp(Duration::from_secs(1), Duration::from_secs(60));
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        let swept = inner.state().sweep(retention);
        if swept > 0 {
            debug!(target: "scheduler", swept, "dropped expired terminal jobs");
        }
    }
}

/// Drive one job through the pipeline inside this worker slot.
async fn run_job(inner: &Arc<SchedulerInner>, job: DispatchedJob) {
    info!(target: "scheduler", job_id = %job.id, owner = %job.owner, "job dispatched");

    let audio = match inner.fetcher.fetch(&job.source).await {
        Ok(audio) => audio,
        Err(err) => {
            warn!(target: "scheduler", job_id = %job.id, error = %err, "fetch failed");
            inner.finish(
                &job.id,
                JobState::Failed {
                    error: JobError::Fetch(err.kind()),
                },
            );
            return;
        }
    };

    // Cancellation boundary: the network operation has finished; stop
    // before anything becomes visible in the store.
    if inner.cancelled(&job.id) {
        inner.finish(
            &job.id,
            JobState::Failed {
                error: JobError::Cancelled,
            },
        );
        return;
    }

    let hash = match inner.store.put(audio.bytes, audio.format).await {
        Ok(hash) => hash,
        Err(err) => {
            warn!(target: "scheduler", job_id = %job.id, error = %err, "store write failed");
            inner.finish(
                &job.id,
                JobState::Failed {
                    error: JobError::Store(err.kind()),
                },
            );
            return;
        }
    };

    // Pinned while this job holds the artifact; released on terminal state.
    if let Err(err) = inner.store.pin(&hash).await {
        warn!(target: "scheduler", job_id = %job.id, %hash, error = %err, "pin failed");
    }

    if inner.cancelled(&job.id) {
        inner.store.unpin(&hash).await;
        inner.finish(
            &job.id,
            JobState::Failed {
                error: JobError::Cancelled,
            },
        );
        return;
    }

    inner.state().transition(&job.id, JobState::Recognizing);
    let recognition = inner.engine.recognize(&hash).await;
    inner.store.unpin(&hash).await;

    match recognition {
        Ok(record) => {
            if job.append_to_playlist {
                match inner.playlists.append(&job.owner, &hash).await {
                    Ok(position) => {
                        debug!(target: "scheduler", job_id = %job.id, position, "appended to playlist");
                    }
                    // The content was already in the playlist; the job
                    // still succeeded.
                    Err(PlaylistError::DuplicateEntry) => {}
                    Err(err) => {
                        warn!(target: "scheduler", job_id = %job.id, error = %err, "playlist append failed");
                    }
                }
            }
            info!(target: "scheduler", job_id = %job.id, %hash, "job done");
            inner.finish(
                &job.id,
                JobState::Done {
                    content_hash: hash,
                    outcome: record.outcome,
                },
            );
        }
        Err(err) => {
            warn!(target: "scheduler", job_id = %job.id, error = %err, "recognition failed");
            let kind = match &err {
                RecognitionError::Store(store_err) => store_err.kind(),
                _ => StoreErrorKind::Internal,
            };
            inner.finish(
                &job.id,
                JobState::Failed {
                    error: JobError::Store(kind),
                },
            );
        }
    }
}
