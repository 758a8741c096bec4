// SPDX-License-Identifier: GPL-3.0-or-later

use skald_domain::{JobId, JobState};
use tokio::sync::watch;

/// Caller-side view of a submitted job.
///
/// Carries the job id for polling plus a completion channel, so callers can
/// either poll [`crate::Scheduler::poll`] or await the terminal state
/// directly. No global event bus exists; each handle observes its own job.
#[derive(Debug)]
pub struct JobHandle {
    pub id: JobId,
    pub(crate) state_rx: watch::Receiver<JobState>,
}

impl JobHandle {
    /// Current state without waiting.
    pub fn state(&self) -> JobState {
        self.state_rx.borrow().clone()
    }

    /// Wait until the job reaches `Done` or `Failed` and return that state.
    pub async fn wait_terminal(&mut self) -> JobState {
        loop {
            let current = self.state_rx.borrow().clone();
            if current.is_terminal() {
                return current;
            }
            if self.state_rx.changed().await.is_err() {
                // Sender gone (job swept after retention); the last
                // observed state is all there is.
                return self.state_rx.borrow().clone();
            }
        }
    }
}
