//! Order placement, fulfilment and the payments recorded against an order.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AggregateId, CustomerId, Money};
use domain::{
    Aggregate, CreatePayment, Discount, LineRequest, OrderStatus, OrderTotals, PaymentMethod,
    PaymentState, PaymentStatus, PlaceOrder, Sell, SellDetail, ShippingStatus, StockKey,
};
use event_store::EventStore;
use projections::{SaleSummary, SalesFilter};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::payments::{PaymentResponse, ReconciliationResponse};
use super::{optional_json, parse_aggregate_id, parse_json};
use crate::error::ApiError;
use crate::legacy::normalize_payment_fields;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub lines: Vec<LineBody>,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub shipping_zone: Option<String>,
}

#[derive(Deserialize)]
pub struct LineBody {
    pub product_id: String,
    #[serde(default)]
    pub variant: Option<String>,
    pub name: String,
    pub quantity: u32,
    /// Unit price in minor units.
    pub unit_price: Money,
    /// Percentage; the store default applies when absent.
    #[serde(default)]
    pub vat_rate: Option<Decimal>,
    #[serde(default)]
    pub discount: Discount,
}

impl From<LineBody> for LineRequest {
    fn from(body: LineBody) -> Self {
        let mut line = LineRequest::new(
            StockKey::new(body.product_id, body.variant),
            body.name,
            body.quantity,
            body.unit_price,
        )
        .with_discount(body.discount);
        if let Some(rate) = body.vat_rate {
            line = line.with_vat_rate(rate);
        }
        line
    }
}

#[derive(Deserialize, Default)]
pub struct ListQuery {
    /// Order status code.
    pub order_status: Option<u8>,
    /// Payment status code.
    pub payment_status: Option<u8>,
    pub customer_id: Option<CustomerId>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    /// Order status code.
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct ShippingStatusRequest {
    pub status: ShippingStatus,
}

#[derive(Deserialize, Default)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cancelled_by: Option<String>,
}

/// Body of `POST /orders/{id}/payments`, after legacy names are mapped.
#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Money,
    pub method: String,
    /// `pending` (default) or `success`.
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub order_id: Option<AggregateId>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: AggregateId,
    pub invoice_no: String,
    pub customer_id: Option<CustomerId>,
    pub order_status: OrderStatus,
    pub order_status_label: &'static str,
    pub shipping_status: ShippingStatus,
    pub payment_status: PaymentStatus,
    pub payment_status_label: &'static str,
    pub lines: Vec<SellDetail>,
    pub totals: OrderTotals,
    pub total_payable_amount: Money,
    pub total_paid: Money,
    pub total_due: Money,
    pub overpayment: Money,
    pub currency: String,
    pub payments: Vec<LedgerEntry>,
    pub cancel_reason: Option<String>,
    pub placed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct LedgerEntry {
    pub payment_id: AggregateId,
    pub amount: Money,
    pub state: PaymentState,
}

impl OrderResponse {
    pub(crate) fn from_sell(sell: &Sell) -> Result<Self, ApiError> {
        let id = sell
            .id()
            .ok_or_else(|| ApiError::Internal("order has no id".to_string()))?;
        Ok(Self {
            id,
            invoice_no: sell.invoice_no().to_string(),
            customer_id: sell.customer_id(),
            order_status: sell.order_status(),
            order_status_label: sell.order_status().as_str(),
            shipping_status: sell.shipping_status(),
            payment_status: sell.payment_status(),
            payment_status_label: sell.payment_status().as_str(),
            lines: sell.lines().to_vec(),
            totals: *sell.totals(),
            total_payable_amount: sell.total_payable_amount(),
            total_paid: sell.total_paid(),
            total_due: sell.total_due(),
            overpayment: sell.overpayment(),
            currency: sell.currency().to_string(),
            payments: sell
                .payments()
                .iter()
                .map(|(payment_id, entry)| LedgerEntry {
                    payment_id: *payment_id,
                    amount: entry.amount,
                    state: entry.state,
                })
                .collect(),
            cancel_reason: sell.cancel_reason().map(String::from),
            placed_at: sell.placed_at(),
        })
    }
}

/// Response type for event envelope data.
#[derive(Serialize)]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub version: i64,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

// -- Handlers --

/// POST /orders prices the lines, takes the stock and records the order.
#[tracing::instrument(skip(state, req), fields(lines = req.lines.len()))]
pub async fn place<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let mut cmd = PlaceOrder::new(req.lines.into_iter().map(LineRequest::from).collect())
        .with_discount(req.discount);
    if let Some(customer_id) = req.customer_id {
        cmd = cmd.for_customer(customer_id);
    }
    if let Some(zone) = req.shipping_zone {
        cmd = cmd.shipped_to(zone);
    }

    let sell = state.orders.place_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from_sell(&sell)?)))
}

/// GET /orders lists orders from the sales view, newest first.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SaleSummary>>, ApiError> {
    let filter = SalesFilter {
        order_status: query
            .order_status
            .map(|code| {
                OrderStatus::from_code(code)
                    .ok_or_else(|| ApiError::BadRequest(format!("Unknown order status code {code}")))
            })
            .transpose()?,
        payment_status: query
            .payment_status
            .map(|code| {
                PaymentStatus::from_code(code)
                    .ok_or_else(|| ApiError::BadRequest(format!("Unknown payment status code {code}")))
            })
            .transpose()?,
        customer_id: query.customer_id,
    };

    state.catch_up().await?;
    Ok(Json(state.sales.filter(filter).await))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let sell = load_order(&state, &id).await?;
    Ok(Json(OrderResponse::from_sell(&sell)?))
}

/// POST /orders/{id}/status moves the order forward.
#[tracing::instrument(skip(state, req), fields(to = %req.status))]
pub async fn advance_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    if req.status == OrderStatus::Cancelled {
        return Err(ApiError::BadRequest(
            "Use POST /orders/{id}/cancel to cancel an order".to_string(),
        ));
    }
    let sell_id = parse_aggregate_id(&id)?;
    let sell = state.orders.advance_status(sell_id, req.status).await?;
    Ok(Json(OrderResponse::from_sell(&sell)?))
}

/// POST /orders/{id}/shipping-status
#[tracing::instrument(skip(state, req), fields(to = %req.status))]
pub async fn update_shipping_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ShippingStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let sell_id = parse_aggregate_id(&id)?;
    let sell = state.orders.update_shipping_status(sell_id, req.status).await?;
    Ok(Json(OrderResponse::from_sell(&sell)?))
}

/// POST /orders/{id}/cancel releases the order's stock.
#[tracing::instrument(skip(state, body))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<OrderResponse>, ApiError> {
    let sell_id = parse_aggregate_id(&id)?;
    let req: CancelRequest = optional_json(&body)?;
    let sell = state
        .orders
        .cancel_order(
            sell_id,
            req.reason.unwrap_or_else(|| "cancelled".to_string()),
            req.cancelled_by.unwrap_or_else(|| "admin".to_string()),
        )
        .await?;
    Ok(Json(OrderResponse::from_sell(&sell)?))
}

/// GET /orders/{id}/events lists the order's stored events.
#[tracing::instrument(skip(state))]
pub async fn events<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    let sell_id = parse_aggregate_id(&id)?;
    let envelopes = state.orders.history(sell_id).await?;
    if envelopes.is_empty() {
        return Err(ApiError::NotFound(format!("Order {id} not found")));
    }

    let responses = envelopes
        .into_iter()
        .map(|e| EventEnvelopeResponse {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            aggregate_id: e.aggregate_id.to_string(),
            version: e.version.as_i64(),
            timestamp: e.timestamp.to_rfc3339(),
            payload: e.payload,
        })
        .collect();

    Ok(Json(responses))
}

/// GET /orders/{id}/payments, oldest first.
#[tracing::instrument(skip(state))]
pub async fn payments<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    let sell = load_order(&state, &id).await?;
    let sell_id = sell
        .id()
        .ok_or_else(|| ApiError::Internal("order has no id".to_string()))?;
    let payments = state.payments.list_for_order(sell_id).await?;
    let responses = payments
        .iter()
        .map(PaymentResponse::from_payment)
        .collect::<Result<_, _>>()?;
    Ok(Json(responses))
}

/// POST /orders/{id}/payments records a payment and updates the order's
/// paid total.
#[tracing::instrument(skip(state, body))]
pub async fn add_payment<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<ReconciliationResponse>), ApiError> {
    let sell_id = parse_aggregate_id(&id)?;
    let req: CreatePaymentRequest = parse_json(normalize_payment_fields(body))?;
    if req.order_id.is_some_and(|order_id| order_id != sell_id) {
        return Err(ApiError::BadRequest(
            "Body order_id does not match the order in the path".to_string(),
        ));
    }

    let method: PaymentMethod = req.method.parse().map_err(ApiError::BadRequest)?;
    let mut cmd = match req.state.as_deref().map(str::parse::<PaymentState>).transpose() {
        Ok(None | Some(PaymentState::Pending)) => CreatePayment::pending(sell_id, req.amount, method),
        Ok(Some(PaymentState::Success)) => CreatePayment::received(sell_id, req.amount, method),
        Ok(Some(other)) => {
            return Err(ApiError::BadRequest(format!(
                "A payment cannot be created in the {other} state"
            )));
        }
        Err(e) => return Err(ApiError::BadRequest(e)),
    };
    if let Some(reference) = req.reference {
        cmd = cmd.with_reference(reference);
    }
    if let Some(note) = req.note {
        cmd = cmd.with_note(note);
    }

    let outcome = state.payments.create_payment(cmd).await?;
    Ok((
        StatusCode::CREATED,
        Json(ReconciliationResponse::from_outcome(&outcome)?),
    ))
}

async fn load_order<S: EventStore + Clone + 'static>(
    state: &AppState<S>,
    id: &str,
) -> Result<Sell, ApiError> {
    let sell_id = parse_aggregate_id(id)?;
    state
        .orders
        .get_order(sell_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))
}
