//! Health, metrics and store settings.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use domain::StoreSettings;
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Rows per read model.
    pub read_models: BTreeMap<&'static str, usize>,
}

/// GET /health
pub async fn health<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let read_models = state
        .read_models()
        .iter()
        .map(|model| (model.name(), model.count()))
        .collect();
    Json(HealthResponse {
        status: "ok",
        read_models,
    })
}

/// GET /metrics in the Prometheus text format.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}

/// GET /settings
pub async fn settings<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<StoreSettings>, ApiError> {
    let current = state.settings.current().await?;
    Ok(Json(current.as_ref().clone()))
}

/// POST /settings/refresh reloads the settings from their source.
#[tracing::instrument(skip(state))]
pub async fn refresh_settings<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<StoreSettings>, ApiError> {
    let reloaded = state.settings.refresh().await?;
    Ok(Json(reloaded.as_ref().clone()))
}
