// SPDX-License-Identifier: GPL-3.0-or-later

use axum::extract::{Path, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use skald_domain::{ContentHash, OwnerId};
use skald_playlist::PlaylistError;
use utoipa::ToSchema;

use crate::handlers::jobs::ErrorResponse;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct PlaylistResponse {
    pub owner: String,
    /// Content hashes in playlist order; positions are the indices.
    pub entries: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AppendEntryRequest {
    pub content_hash: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppendEntryResponse {
    pub position: u32,
}

/// List an owner's playlist in order.
#[utoipa::path(
    get,
    path = "/api/v1/playlists/{owner}",
    params(("owner" = String, Path, description = "Owner id")),
    responses(
        (status = 200, description = "Playlist contents", body = PlaylistResponse)
    ),
    tag = "playlists"
)]
pub async fn list_playlist(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> impl IntoResponse {
    let owner = OwnerId::new(owner);
    match state.playlists.list(&owner).await {
        Ok(entries) => (
            StatusCode::OK,
            Json(PlaylistResponse {
                owner: owner.to_string(),
                entries: entries.iter().map(|h| h.to_string()).collect(),
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(err.to_string(), "internal")),
        )
            .into_response(),
    }
}

/// Append a content hash to an owner's playlist.
#[utoipa::path(
    post,
    path = "/api/v1/playlists/{owner}/entries",
    params(("owner" = String, Path, description = "Owner id")),
    request_body = AppendEntryRequest,
    responses(
        (status = 201, description = "Entry appended", body = AppendEntryResponse),
        (status = 400, description = "Invalid content hash", body = ErrorResponse),
        (status = 409, description = "Hash already present", body = ErrorResponse)
    ),
    tag = "playlists"
)]
pub async fn append_entry(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(request): Json<AppendEntryRequest>,
) -> impl IntoResponse {
    let hash = match ContentHash::parse(&request.content_hash) {
        Ok(hash) => hash,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(err.to_string(), "invalid_request")),
            )
                .into_response()
        }
    };

    match state.playlists.append(&OwnerId::new(owner), &hash).await {
        Ok(position) => (StatusCode::CREATED, Json(AppendEntryResponse { position })).into_response(),
        Err(err @ PlaylistError::DuplicateEntry) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(err.to_string(), "duplicate_entry")),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(err.to_string(), "internal")),
        )
            .into_response(),
    }
}

/// Remove the entry at a position; later entries shift down.
#[utoipa::path(
    delete,
    path = "/api/v1/playlists/{owner}/entries/{position}",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("position" = u32, Path, description = "Zero-based playlist position")
    ),
    responses(
        (status = 204, description = "Entry removed"),
        (status = 404, description = "No entry at that position", body = ErrorResponse)
    ),
    tag = "playlists"
)]
pub async fn remove_entry(
    State(state): State<AppState>,
    Path((owner, position)): Path<(String, u32)>,
) -> impl IntoResponse {
    match state
        .playlists
        .remove(&OwnerId::new(owner), position)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err @ PlaylistError::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(err.to_string(), "not_found")),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(err.to_string(), "internal")),
        )
            .into_response(),
    }
}
