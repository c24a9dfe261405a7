//! HTTP back office for the storefront.
//!
//! REST endpoints for orders, payments, stock and settings, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod legacy;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, create_default_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{orders, payments, stock, system};

    let metrics_router = Router::new()
        .route("/metrics", get(system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(system::health::<S>))
        .route("/settings", get(system::settings::<S>))
        .route("/settings/refresh", post(system::refresh_settings::<S>))
        .route("/stock", get(stock::list::<S>).post(stock::register::<S>))
        .route("/stock/restock", post(stock::restock::<S>))
        .route("/stock/level", post(stock::set_level::<S>))
        .route("/orders", post(orders::place::<S>).get(orders::list::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/status", post(orders::advance_status::<S>))
        .route("/orders/{id}/shipping-status", post(orders::update_shipping_status::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route("/orders/{id}/events", get(orders::events::<S>))
        .route(
            "/orders/{id}/payments",
            get(orders::payments::<S>).post(orders::add_payment::<S>),
        )
        .route("/payments/callback", post(payments::callback::<S>))
        .route("/payments/{id}", get(payments::get::<S>).delete(payments::delete::<S>))
        .route("/payments/{id}/validate", post(payments::validate::<S>))
        .route("/payments/{id}/reject", post(payments::reject::<S>))
        .route("/payments/{id}/cancel", post(payments::cancel::<S>))
        .route("/payments/{id}/refund", post(payments::refund::<S>))
        .route("/payments/{id}/amount", put(payments::update_amount::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
