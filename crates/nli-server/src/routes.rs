//! HTTP surface: `POST /nli`, `GET /health`, `GET /`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use nli_core::{HealthResponse, NliRequest, NliResponse, ServiceDescriptor};

use crate::error::ServiceError;
use crate::orchestrator;
use crate::state::ServiceState;

pub const SERVICE_NAME: &str = "NLI Service";

pub fn router(state: Arc<ServiceState>) -> Router {
    Router::new()
        .route("/", get(describe))
        .route("/health", get(health))
        .route("/nli", post(classify))
        .with_state(state)
}

async fn classify(
    State(state): State<Arc<ServiceState>>,
    body: Result<Json<NliRequest>, JsonRejection>,
) -> Result<Json<NliResponse>, ServiceError> {
    let Json(request) = body.map_err(|rejection| ServiceError::InvalidBody {
        status: rejection.status(),
        detail: rejection.body_text(),
    })?;
    orchestrator::handle(&state, request).await.map(Json)
}

async fn health(State(state): State<Arc<ServiceState>>) -> Result<Json<HealthResponse>, ServiceError> {
    let engine = state.engine()?;
    Ok(Json(HealthResponse {
        status: "healthy".into(),
        model: engine.model_id().to_string(),
        device: engine.device().to_string(),
    }))
}

async fn describe(State(state): State<Arc<ServiceState>>) -> Json<ServiceDescriptor> {
    let endpoints = BTreeMap::from([
        ("nli".to_string(), "POST /nli - Classify text pairs".to_string()),
        ("health".to_string(), "GET /health - Health check".to_string()),
    ]);
    Json(ServiceDescriptor {
        service: SERVICE_NAME.into(),
        model: state.model_id().to_string(),
        device: state.device().to_string(),
        endpoints,
    })
}
