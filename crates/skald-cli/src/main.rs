// SPDX-License-Identifier: GPL-3.0-or-later

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use skald_api::{router, AppState};
use skald_fetcher::Fetcher;
use skald_playlist::PlaylistManager;
use skald_recognition::{RecognitionClient, RecognitionEngine};
use skald_scheduler::Scheduler;
use skald_store::Store;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = skald_config::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level)),
        )
        .init();

    info!(target: "skald", "starting skald");

    let pool = skald_store::db::connect(&config.database).await?;
    let store = Arc::new(Store::open(&config.store, pool.clone()).await?);
    let client = RecognitionClient::new(&config.recognition)?;
    let engine = Arc::new(RecognitionEngine::new(Arc::clone(&store), client));
    let fetcher = Arc::new(Fetcher::over_http(&config.fetcher));
    let playlists = Arc::new(PlaylistManager::new(pool));

    let scheduler = Arc::new(Scheduler::new(
        config.scheduler.clone(),
        fetcher,
        Arc::clone(&store),
        Arc::clone(&engine),
        Arc::clone(&playlists),
    ));
    scheduler.start();

    let state = AppState {
        scheduler,
        store,
        playlists,
        engine,
    };
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(target: "skald", %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(target: "skald", "shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(target: "skald", "shutdown signal received");
}
