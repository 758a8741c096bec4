// SPDX-License-Identifier: GPL-3.0-or-later

use axum::extract::{Path, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use skald_domain::{
    FetchErrorKind, JobError, JobId, JobState, JobStatus, OwnerId, RecognitionOutcome,
    SourceReference, StoreErrorKind,
};
use skald_scheduler::SchedulerError;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitJobRequest {
    pub owner_id: String,
    pub source: String,
    #[serde(default)]
    pub append_to_playlist: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable kind the front-end can branch on.
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub owner: String,
    pub source: String,
    pub submitted_at: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OutcomeResponse {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl From<RecognitionOutcome> for OutcomeResponse {
    fn from(outcome: RecognitionOutcome) -> Self {
        match outcome {
            RecognitionOutcome::Recognized {
                title,
                artist,
                confidence,
            } => Self {
                kind: "recognized".to_string(),
                title: Some(title),
                artist: Some(artist),
                confidence: Some(confidence),
            },
            RecognitionOutcome::Unrecognized => Self {
                kind: "unrecognized".to_string(),
                title: None,
                artist: None,
                confidence: None,
            },
            RecognitionOutcome::RecognitionUnavailable => Self {
                kind: "recognition_unavailable".to_string(),
                title: None,
                artist: None,
                confidence: None,
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobErrorResponse {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

fn fetch_kind_label(kind: FetchErrorKind) -> &'static str {
    match kind {
        FetchErrorKind::Unreachable => "unreachable",
        FetchErrorKind::Unsupported => "unsupported",
        FetchErrorKind::Timeout => "timeout",
        FetchErrorKind::TooLarge => "too_large",
    }
}

fn store_kind_label(kind: StoreErrorKind) -> &'static str {
    match kind {
        StoreErrorKind::NotFound => "not_found",
        StoreErrorKind::CapacityExceeded => "capacity_exceeded",
        StoreErrorKind::Internal => "internal",
    }
}

impl From<JobError> for JobErrorResponse {
    fn from(error: JobError) -> Self {
        match error {
            JobError::Fetch(kind) => Self {
                source: "fetch".to_string(),
                kind: Some(fetch_kind_label(kind).to_string()),
            },
            JobError::Store(kind) => Self {
                source: "store".to_string(),
                kind: Some(store_kind_label(kind).to_string()),
            },
            JobError::Cancelled => Self {
                source: "cancelled".to_string(),
                kind: None,
            },
        }
    }
}

impl From<JobStatus> for JobStatusResponse {
    fn from(status: JobStatus) -> Self {
        let (state, content_hash, outcome, error) = match status.state {
            JobState::Queued => ("queued", None, None, None),
            JobState::Fetching => ("fetching", None, None, None),
            JobState::Recognizing => ("recognizing", None, None, None),
            JobState::Done {
                content_hash,
                outcome,
            } => (
                "done",
                Some(content_hash.to_string()),
                Some(OutcomeResponse::from(outcome)),
                None,
            ),
            JobState::Failed { error } => {
                ("failed", None, None, Some(JobErrorResponse::from(error)))
            }
        };

        Self {
            id: status.id.0,
            owner: status.owner.to_string(),
            source: status.source.to_string(),
            submitted_at: status.submitted_at.to_rfc3339(),
            state: state.to_string(),
            content_hash,
            outcome,
            error,
        }
    }
}

/// Submit a source reference for acquisition and recognition.
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 202, description = "Job admitted", body = SubmitJobResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 429, description = "Scheduler overloaded", body = ErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> impl IntoResponse {
    if request.owner_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("owner_id must not be empty", "invalid_request")),
        )
            .into_response();
    }
    if request.source.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("source must not be empty", "invalid_request")),
        )
            .into_response();
    }

    match state.scheduler.submit(
        OwnerId::new(request.owner_id),
        SourceReference::new(request.source),
        request.append_to_playlist,
    ) {
        Ok(handle) => (
            StatusCode::ACCEPTED,
            Json(SubmitJobResponse { job_id: handle.id.0 }),
        )
            .into_response(),
        Err(err @ SchedulerError::Overloaded(_)) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::new(err.to_string(), "overloaded")),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(err.to_string(), "internal")),
        )
            .into_response(),
    }
}

/// Poll a job's status.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job status", body = JobStatusResponse),
        (status = 404, description = "Unknown or expired job", body = ErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.scheduler.poll(&JobId::from_uuid(id)) {
        Some(status) => (StatusCode::OK, Json(JobStatusResponse::from(status))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("unknown job", "not_found")),
        )
            .into_response(),
    }
}

/// Cancel a job cooperatively.
#[utoipa::path(
    delete,
    path = "/api/v1/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 204, description = "Cancellation accepted"),
        (status = 404, description = "Unknown or expired job", body = ErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.scheduler.cancel(&JobId::from_uuid(id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(SchedulerError::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("unknown job", "not_found")),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(err.to_string(), "internal")),
        )
            .into_response(),
    }
}
