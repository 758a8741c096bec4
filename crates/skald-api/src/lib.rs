// SPDX-License-Identifier: GPL-3.0-or-later

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use handlers::jobs::{
    cancel_job, get_job, submit_job, ErrorResponse, JobErrorResponse, JobStatusResponse,
    OutcomeResponse, SubmitJobRequest, SubmitJobResponse, __path_cancel_job, __path_get_job,
    __path_submit_job,
};
use handlers::playlists::{
    append_entry, list_playlist, remove_entry, AppendEntryRequest, AppendEntryResponse,
    PlaylistResponse, __path_append_entry, __path_list_playlist, __path_remove_entry,
};
use handlers::store::{
    refresh_recognition, store_stats, RecognitionResponse, StoreStatsResponse,
    __path_refresh_recognition, __path_store_stats,
};
use serde::Serialize;
use skald_playlist::PlaylistManager;
use skald_recognition::RecognitionEngine;
use skald_scheduler::Scheduler;
use skald_store::Store;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Shared handles the handlers work through.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<Store>,
    pub playlists: Arc<PlaylistManager>,
    pub engine: Arc<RecognitionEngine>,
}

#[derive(Serialize, utoipa::ToSchema)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
#[allow(dead_code)]
async fn health() -> Json<HealthResponse> {
    health_handler().await
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        submit_job,
        get_job,
        cancel_job,
        list_playlist,
        append_entry,
        remove_entry,
        store_stats,
        refresh_recognition,
    ),
    components(
        schemas(
            HealthResponse,
            SubmitJobRequest,
            SubmitJobResponse,
            JobStatusResponse,
            JobErrorResponse,
            OutcomeResponse,
            PlaylistResponse,
            AppendEntryRequest,
            AppendEntryResponse,
            StoreStatsResponse,
            RecognitionResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "jobs", description = "Acquisition job submission and polling"),
        (name = "playlists", description = "Owner-scoped playlist management"),
        (name = "store", description = "Artifact store and recognition records")
    ),
    info(
        title = "Skald API",
        version = "0.1.0",
        description = "Audio acquisition and recognition pipeline",
    )
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    info!(target: "api", "building router");

    let api_v1 = Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/:id", get(get_job).delete(cancel_job))
        .route("/playlists/:owner", get(list_playlist))
        .route("/playlists/:owner/entries", post(append_entry))
        .route(
            "/playlists/:owner/entries/:position",
            axum::routing::delete(remove_entry),
        )
        .route("/store/stats", get(store_stats))
        .route("/recognition/:hash/refresh", post(refresh_recognition));

    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", api_v1)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", openapi))
        .with_state(state)
}
