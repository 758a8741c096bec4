// SPDX-License-Identifier: GPL-3.0-or-later

use axum::extract::{Path, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use skald_domain::ContentHash;
use skald_recognition::RecognitionError;
use skald_store::StoreError;
use utoipa::ToSchema;

use crate::handlers::jobs::{ErrorResponse, OutcomeResponse};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct StoreStatsResponse {
    pub artifact_count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecognitionResponse {
    pub content_hash: String,
    pub outcome: OutcomeResponse,
    pub recognized_at: String,
}

/// Store occupancy: how many artifacts are cached and their total size.
#[utoipa::path(
    get,
    path = "/api/v1/store/stats",
    responses(
        (status = 200, description = "Store occupancy", body = StoreStatsResponse)
    ),
    tag = "store"
)]
pub async fn store_stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.store.stats().await;
    Json(StoreStatsResponse {
        artifact_count: stats.artifact_count,
        total_bytes: stats.total_bytes,
    })
}

/// Retry recognition for stored content using its cached fingerprint.
///
/// Never re-fetches or re-fingerprints the audio; useful after the
/// recognition capability was unavailable at acquisition time.
#[utoipa::path(
    post,
    path = "/api/v1/recognition/{hash}/refresh",
    params(("hash" = String, Path, description = "Content hash")),
    responses(
        (status = 200, description = "Current recognition record", body = RecognitionResponse),
        (status = 400, description = "Invalid content hash", body = ErrorResponse),
        (status = 404, description = "No fingerprint recorded for hash", body = ErrorResponse)
    ),
    tag = "store"
)]
pub async fn refresh_recognition(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    let hash = match ContentHash::parse(&hash) {
        Ok(hash) => hash,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(err.to_string(), "invalid_request")),
            )
                .into_response()
        }
    };

    match state.engine.refresh(&hash).await {
        Ok(record) => (
            StatusCode::OK,
            Json(RecognitionResponse {
                content_hash: record.hash.to_string(),
                outcome: OutcomeResponse::from(record.outcome),
                recognized_at: record.recognized_at.to_rfc3339(),
            }),
        )
            .into_response(),
        Err(RecognitionError::Store(StoreError::NotFound)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "no fingerprint recorded for hash",
                "not_found",
            )),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(err.to_string(), "internal")),
        )
            .into_response(),
    }
}
