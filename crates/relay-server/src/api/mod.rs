//! API composition
//!
//! Router assembly plus the root and health endpoints. Feature routes are
//! nested under `/api/v1`.

pub mod response;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::compression::CompressionLayer;

use crate::config::Config;
use crate::features::{self, FeatureState};
use crate::middleware;

/// Build the application router with all routes and middleware
pub fn create_router(state: FeatureState, config: &Config) -> Router {
    let api_v1 = features::router(state.clone());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state)
        .nest("/api/v1", api_v1)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Import Relay",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Health check: verifies a store round trip
async fn health(State(state): State<FeatureState>) -> Result<impl IntoResponse, StatusCode> {
    let probe = async {
        state.store.put("health:ping", "ok".to_string()).await?;
        state.store.get("health:ping").await
    };

    match probe.await {
        Ok(Some(_)) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "store": "connected"
            })),
        )),
        Ok(None) => Err(StatusCode::SERVICE_UNAVAILABLE),
        Err(e) => {
            tracing::error!("Store health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
