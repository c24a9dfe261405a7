//! Stock registration, restocking and levels.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use domain::{StockItem, StockKey};
use event_store::EventStore;
use projections::StockLevel;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StockRequest {
    pub product_id: String,
    #[serde(default)]
    pub variant: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub note: Option<String>,
}

impl StockRequest {
    fn key(&self) -> StockKey {
        StockKey::new(self.product_id.as_str(), self.variant.clone())
    }
}

#[derive(Deserialize, Default)]
pub struct StockQuery {
    /// Only levels at or below the configured low-stock threshold.
    #[serde(default)]
    pub low_stock: bool,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: String,
    pub variant: Option<String>,
    pub available: u32,
}

impl StockResponse {
    fn from_item(key: StockKey, item: &StockItem) -> Self {
        Self {
            product_id: key.product_id.to_string(),
            variant: key.variant,
            available: item.available(),
        }
    }
}

/// GET /stock
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<StockQuery>,
) -> Result<Json<Vec<StockLevel>>, ApiError> {
    state.catch_up().await?;
    let levels = if query.low_stock {
        let threshold = state.settings.current().await?.low_stock_threshold;
        state.stock_levels.low_stock(threshold).await
    } else {
        state.stock_levels.all().await
    };
    Ok(Json(levels))
}

/// POST /stock registers a product variant with its opening quantity.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id))]
pub async fn register<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<StockRequest>,
) -> Result<(StatusCode, Json<StockResponse>), ApiError> {
    let key = req.key();
    let item = state.stock.register_product(key.clone(), req.quantity).await?;
    Ok((StatusCode::CREATED, Json(StockResponse::from_item(key, &item))))
}

/// POST /stock/restock
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id))]
pub async fn restock<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<StockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let key = req.key();
    let item = state.stock.restock(key.clone(), req.quantity, req.note).await?;
    Ok(Json(StockResponse::from_item(key, &item)))
}

/// POST /stock/level sets an absolute level after a count.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id))]
pub async fn set_level<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<StockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let key = req.key();
    let item = state.stock.set_level(key.clone(), req.quantity).await?;
    Ok(Json(StockResponse::from_item(key, &item)))
}
