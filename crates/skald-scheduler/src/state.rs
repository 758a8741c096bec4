// SPDX-License-Identifier: GPL-3.0-or-later

//! Scheduler bookkeeping: job table, per-owner FIFO queues, round-robin
//! rotation, and admission counters.
//!
//! Everything here is synchronous and mutated behind the scheduler's lock;
//! the async worker loops live in the crate root.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::Utc;
use skald_config::SchedulerConfig;
use skald_domain::{JobId, JobState, JobStatus, OwnerId, SourceReference};
use tokio::sync::watch;

use crate::error::SchedulerError;
use crate::handle::JobHandle;

pub(crate) struct JobEntry {
    pub status: JobStatus,
    pub cancelled: bool,
    pub append_to_playlist: bool,
    pub state_tx: watch::Sender<JobState>,
    pub finished_at: Option<Instant>,
}

/// A job handed to a worker for execution.
#[derive(Debug, Clone)]
pub(crate) struct DispatchedJob {
    pub id: JobId,
    pub owner: OwnerId,
    pub source: SourceReference,
    pub append_to_playlist: bool,
}

pub(crate) struct SchedState {
    limits: SchedulerConfig,
    jobs: HashMap<JobId, JobEntry>,
    queues: HashMap<OwnerId, VecDeque<JobId>>,
    /// Owners with queued work, in dispatch rotation order.
    rotation: VecDeque<OwnerId>,
    /// Non-terminal jobs, globally and per owner.
    active_global: usize,
    active_per_owner: HashMap<OwnerId, usize>,
}

impl SchedState {
    pub fn new(limits: SchedulerConfig) -> Self {
        Self {
            limits,
            jobs: HashMap::new(),
            queues: HashMap::new(),
            rotation: VecDeque::new(),
            active_global: 0,
            active_per_owner: HashMap::new(),
        }
    }

    /// Admission control plus enqueue.
    ///
    /// In-flight means "not yet terminal": queued jobs count against the
    /// ceilings, which is what bounds concurrent submissions rather than
    /// just concurrent execution.
    pub fn admit(
        &mut self,
        owner: OwnerId,
        source: SourceReference,
        append_to_playlist: bool,
    ) -> Result<JobHandle, SchedulerError> {
        if self.active_global >= self.limits.max_inflight_global {
            return Err(SchedulerError::Overloaded(format!(
                "global in-flight limit of {} reached",
                self.limits.max_inflight_global
            )));
        }

        let owner_active = self.active_per_owner.get(&owner).copied().unwrap_or(0);
        if owner_active >= self.limits.max_inflight_per_owner {
            return Err(SchedulerError::Overloaded(format!(
                "owner {} already has {} jobs in flight",
                owner, owner_active
            )));
        }

        let queue = self.queues.entry(owner.clone()).or_default();
        if queue.len() >= self.limits.max_queue_depth_per_owner {
            return Err(SchedulerError::Overloaded(format!(
                "queue for owner {} is full",
                owner
            )));
        }

        let id = JobId::new();
        let (state_tx, state_rx) = watch::channel(JobState::Queued);
        queue.push_back(id);
        if !self.rotation.contains(&owner) {
            self.rotation.push_back(owner.clone());
        }

        self.jobs.insert(
            id,
            JobEntry {
                status: JobStatus {
                    id,
                    owner: owner.clone(),
                    source,
                    submitted_at: Utc::now(),
                    state: JobState::Queued,
                },
                cancelled: false,
                append_to_playlist,
                state_tx,
                finished_at: None,
            },
        );
        self.active_global += 1;
        *self.active_per_owner.entry(owner).or_insert(0) += 1;

        Ok(JobHandle { id, state_rx })
    }

    /// Pop the next job: FIFO within an owner, round-robin across owners.
    ///
    /// The dispatched job is moved to `Fetching` before the lock is
    /// released, so a cancel arriving afterwards takes the cooperative
    /// path instead of the queue-removal path.
    pub fn next_job(&mut self) -> Option<DispatchedJob> {
        while let Some(owner) = self.rotation.pop_front() {
            let Some(queue) = self.queues.get_mut(&owner) else {
                continue;
            };
            let Some(id) = queue.pop_front() else {
                self.queues.remove(&owner);
                continue;
            };
            if queue.is_empty() {
                self.queues.remove(&owner);
            } else {
                self.rotation.push_back(owner.clone());
            }

            let entry = self
                .jobs
                .get_mut(&id)
                .expect("queued job missing from job table");
            entry.status.state = JobState::Fetching;
            let _ = entry.state_tx.send(JobState::Fetching);

            return Some(DispatchedJob {
                id,
                owner,
                source: entry.status.source.clone(),
                append_to_playlist: entry.append_to_playlist,
            });
        }
        None
    }

    pub fn is_cancelled(&self, id: &JobId) -> bool {
        self.jobs.get(id).map(|e| e.cancelled).unwrap_or(true)
    }

    /// Record a non-terminal state change.
    pub fn transition(&mut self, id: &JobId, state: JobState) {
        debug_assert!(!state.is_terminal());
        if let Some(entry) = self.jobs.get_mut(id) {
            if entry.status.state.is_terminal() {
                return;
            }
            entry.status.state = state.clone();
            let _ = entry.state_tx.send(state);
        }
    }

    /// Move a job to a terminal state and release its admission slots.
    pub fn finish(&mut self, id: &JobId, state: JobState) {
        debug_assert!(state.is_terminal());
        let Some(entry) = self.jobs.get_mut(id) else {
            return;
        };
        if entry.status.state.is_terminal() {
            return;
        }
        entry.status.state = state.clone();
        entry.finished_at = Some(Instant::now());
        let _ = entry.state_tx.send(state);

        self.active_global = self.active_global.saturating_sub(1);
        let owner = entry.status.owner.clone();
        if let Some(count) = self.active_per_owner.get_mut(&owner) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.active_per_owner.remove(&owner);
            }
        }
    }

    /// Cancel a job.
    ///
    /// Queued jobs are removed immediately and never reach the fetcher.
    /// Executing jobs get their flag set; workers honor it at the next
    /// step boundary. Terminal jobs are left alone.
    pub fn cancel(&mut self, id: &JobId) -> Result<(), SchedulerError> {
        let entry = self.jobs.get_mut(id).ok_or(SchedulerError::NotFound)?;
        match entry.status.state {
            JobState::Queued => {
                let owner = entry.status.owner.clone();
                if let Some(queue) = self.queues.get_mut(&owner) {
                    queue.retain(|queued| queued != id);
                    if queue.is_empty() {
                        self.queues.remove(&owner);
                    }
                }
                self.finish(
                    id,
                    JobState::Failed {
                        error: skald_domain::JobError::Cancelled,
                    },
                );
                Ok(())
            }
            JobState::Fetching | JobState::Recognizing => {
                entry.cancelled = true;
                Ok(())
            }
            JobState::Done { .. } | JobState::Failed { .. } => Ok(()),
        }
    }

    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.jobs.get(id).map(|entry| entry.status.clone())
    }

    /// Drop terminal jobs older than the retention window.
    pub fn sweep(&mut self, retention: Duration) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, entry| match entry.finished_at {
            Some(finished) => finished.elapsed() < retention,
            None => true,
        });
        before - self.jobs.len()
    }
}
