use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use anyhow::Result;

use crate::store::ingest::IngestionQueue;

use super::handlers::{datasets, evaluations, health};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub ingest: IngestionQueue,
}

pub async fn create_app(
    db: DatabaseConnection,
    ingest: IngestionQueue,
    cors_origin: Option<&str>,
) -> Result<Router> {
    let state = AppState { db, ingest };

    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<axum::http::HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state);

    Ok(app)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Dataset routes
        .route("/datasets", get(datasets::list_datasets))
        .route("/datasets/upload", post(datasets::upload_dataset))
        .route("/datasets/:id", get(datasets::get_dataset))
        .route("/datasets/:id/csv", get(datasets::download_dataset_csv))
        .route(
            "/datasets/:id/csv/:version_id",
            get(datasets::download_dataset_csv_at_version),
        )
        // Evaluation routes
        .route(
            "/experiment-evaluations",
            post(evaluations::upsert_evaluation),
        )
}
