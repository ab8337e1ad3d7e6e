pub mod app;
pub mod handlers;

use anyhow::Result;
use clap::Subcommand;
use sea_orm_migration::prelude::*;
use tracing::info;

use crate::database::{connection::*, migrations::Migrator};
use crate::store::ingest::{ingestion_channel, spawn_ingestion_worker};

#[derive(Subcommand, Debug)]
pub enum MigrateDirection {
    Up,
    Down,
    Fresh,
}

pub async fn start_server(
    port: u16,
    database_path: &str,
    queue_capacity: usize,
    cors_origin: Option<&str>,
) -> Result<()> {
    let database_url = get_database_url(Some(database_path));
    let db = establish_connection(&database_url).await?;

    Migrator::up(&db, None).await?;
    info!("Database migrations completed");

    // Bounded admission queue plus its single consumer; the worker owns
    // all writes to the revision log for the lifetime of the process.
    let (queue, rx) = ingestion_channel(queue_capacity);
    spawn_ingestion_worker(db.clone(), rx);

    let app = app::create_app(db, queue, cors_origin).await?;

    log_routes();

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Server running on http://0.0.0.0:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn log_routes() {
    info!("API Endpoints:");
    info!("  /health                                  - Health check");
    info!("  /api/v1/datasets                         - List datasets");
    info!("  /api/v1/datasets/upload                  - Upload CSV or arrow file as dataset");
    info!("  /api/v1/datasets/:id                     - Dataset metadata and example count");
    info!("  /api/v1/datasets/:id/csv                 - Download latest snapshot as CSV");
    info!("  /api/v1/datasets/:id/csv/:version_id     - Download point-in-time snapshot as CSV");
    info!("  /api/v1/experiment-evaluations           - Upsert evaluation result");
}

pub async fn migrate_database(database_path: &str, direction: MigrateDirection) -> Result<()> {
    let database_url = get_database_url(Some(database_path));
    let db = establish_connection(&database_url).await?;

    match direction {
        MigrateDirection::Up => {
            info!("Running migrations up");
            Migrator::up(&db, None).await?;
        }
        MigrateDirection::Down => {
            info!("Running migrations down");
            Migrator::down(&db, None).await?;
        }
        MigrateDirection::Fresh => {
            info!("Running fresh migrations (down then up)");
            Migrator::down(&db, None).await?;
            Migrator::up(&db, None).await?;
        }
    }

    info!("Database migration completed");
    Ok(())
}
