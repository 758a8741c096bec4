// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Admission control refused the submission: global ceiling, per-owner
    /// ceiling, or queue depth was hit.
    #[error("scheduler overloaded: {0}")]
    Overloaded(String),

    #[error("job was cancelled")]
    Cancelled,

    #[error("unknown job")]
    NotFound,
}
