// SPDX-License-Identifier: GPL-3.0-or-later

//! Sqlite pool bootstrap shared by the store and playlist crates.

use anyhow::Result;
use skald_config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Connect the pool and run migrations.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    // Normalize the database URL for SQLite on Windows
    let db_url = if config.url.starts_with("sqlite://") && !config.url.starts_with("sqlite://:memory:")
    {
        let db_path = config.url.trim_start_matches("sqlite://");
        let path = Path::new(db_path);

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
                info!(target: "store", path = %parent.display(), "created database directory");
            }
        }

        // Convert to absolute path for better Windows compatibility
        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        // Use the absolute path with forward slashes (SQLite handles this on all platforms)
        let path_str = absolute_path.to_string_lossy().replace('\\', "/");

        // Add create mode to ensure SQLite can create the file
        format!("sqlite://{}?mode=rwc", path_str)
    } else {
        config.url.clone()
    };

    info!(target: "store", db_url = %db_url, "connecting to database");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.pool_max_size)
        .connect(&db_url)
        .await?;

    info!(target: "store", "running migrations");
    sqlx::migrate!("../../migrations").run(&pool).await?;

    info!(target: "store", "database initialized");
    Ok(pool)
}
