//! Payment lifecycle and gateway callbacks.
//!
//! Every change answers with the payment and the order totals it produced,
//! since a payment and its order are written together.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AggregateId, Money};
use domain::{Aggregate, Payment, PaymentMethod, PaymentState, PaymentStatus, Reconciliation};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::{optional_json, parse_aggregate_id, parse_json};
use crate::error::ApiError;
use crate::legacy::normalize_payment_fields;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize, Default)]
pub struct ValidateRequest {
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Deserialize, Default)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct AmountRequest {
    pub amount: Money,
}

/// Gateway notification, after legacy names are mapped.
#[derive(Deserialize)]
pub struct CallbackRequest {
    pub transaction_id: String,
    /// Gateway outcome: `success`, `failed` or `cancelled` (or a synonym).
    pub status: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: AggregateId,
    pub order_id: AggregateId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub state: PaymentState,
    pub transaction_id: String,
    pub reference: Option<String>,
    pub failure_reason: Option<String>,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl PaymentResponse {
    pub(crate) fn from_payment(payment: &Payment) -> Result<Self, ApiError> {
        let missing = || ApiError::Internal("payment stream is incomplete".to_string());
        Ok(Self {
            id: payment.id().ok_or_else(missing)?,
            order_id: payment.sell_id().ok_or_else(missing)?,
            amount: payment.amount(),
            method: payment.method().ok_or_else(missing)?,
            state: payment.state(),
            transaction_id: payment.transaction_id().to_string(),
            reference: payment.reference().map(String::from),
            failure_reason: payment.failure_reason().map(String::from),
            note: payment.note().map(String::from),
            created_at: payment.created_at(),
        })
    }
}

/// The order side of a payment change.
#[derive(Serialize)]
pub struct OrderTotalsResponse {
    pub id: AggregateId,
    pub total_payable_amount: Money,
    pub total_paid: Money,
    pub total_due: Money,
    pub overpayment: Money,
    pub payment_status: PaymentStatus,
}

#[derive(Serialize)]
pub struct ReconciliationResponse {
    pub success: bool,
    pub payment: PaymentResponse,
    pub order: OrderTotalsResponse,
}

impl ReconciliationResponse {
    pub(crate) fn from_outcome(outcome: &Reconciliation) -> Result<Self, ApiError> {
        let sell = &outcome.sell;
        Ok(Self {
            success: true,
            payment: PaymentResponse::from_payment(&outcome.payment)?,
            order: OrderTotalsResponse {
                id: sell
                    .id()
                    .ok_or_else(|| ApiError::Internal("order has no id".to_string()))?,
                total_payable_amount: sell.total_payable_amount(),
                total_paid: sell.total_paid(),
                total_due: sell.total_due(),
                overpayment: sell.overpayment(),
                payment_status: sell.payment_status(),
            },
        })
    }
}

/// What a gateway callback asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatewayOutcome {
    Confirmed,
    Failed,
    Cancelled,
}

impl std::str::FromStr for GatewayOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" | "succeeded" | "paid" | "completed" | "validated" => Ok(Self::Confirmed),
            "failed" | "failure" | "rejected" | "declined" | "error" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown gateway status `{other}`")),
        }
    }
}

// -- Handlers --

/// GET /payments/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment_id = parse_aggregate_id(&id)?;
    let payment = state
        .payments
        .get_payment(payment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Payment {id} not found")))?;
    Ok(Json(PaymentResponse::from_payment(&payment)?))
}

/// POST /payments/{id}/validate
#[tracing::instrument(skip(state, body))]
pub async fn validate<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ReconciliationResponse>, ApiError> {
    let payment_id = parse_aggregate_id(&id)?;
    let req: ValidateRequest = optional_json(&body)?;
    let outcome = state.payments.validate_payment(payment_id, req.reference).await?;
    Ok(Json(ReconciliationResponse::from_outcome(&outcome)?))
}

/// POST /payments/{id}/reject
#[tracing::instrument(skip(state, req))]
pub async fn reject<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<ReconciliationResponse>, ApiError> {
    let payment_id = parse_aggregate_id(&id)?;
    let outcome = state.payments.reject_payment(payment_id, req.reason).await?;
    Ok(Json(ReconciliationResponse::from_outcome(&outcome)?))
}

/// POST /payments/{id}/cancel
#[tracing::instrument(skip(state, body))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ReconciliationResponse>, ApiError> {
    let payment_id = parse_aggregate_id(&id)?;
    let req: ReasonRequest = optional_json(&body)?;
    let outcome = state.payments.cancel_payment(payment_id, req.reason).await?;
    Ok(Json(ReconciliationResponse::from_outcome(&outcome)?))
}

/// POST /payments/{id}/refund
#[tracing::instrument(skip(state, body))]
pub async fn refund<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ReconciliationResponse>, ApiError> {
    let payment_id = parse_aggregate_id(&id)?;
    let req: ReasonRequest = optional_json(&body)?;
    let outcome = state.payments.refund_payment(payment_id, req.reason).await?;
    Ok(Json(ReconciliationResponse::from_outcome(&outcome)?))
}

/// PUT /payments/{id}/amount
#[tracing::instrument(skip(state, body))]
pub async fn update_amount<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ReconciliationResponse>, ApiError> {
    let payment_id = parse_aggregate_id(&id)?;
    let req: AmountRequest = parse_json(normalize_payment_fields(body))?;
    let outcome = state.payments.update_amount(payment_id, req.amount).await?;
    Ok(Json(ReconciliationResponse::from_outcome(&outcome)?))
}

/// DELETE /payments/{id} detaches the payment from its order.
#[tracing::instrument(skip(state))]
pub async fn delete<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ReconciliationResponse>, ApiError> {
    let payment_id = parse_aggregate_id(&id)?;
    let outcome = state.payments.delete_payment(payment_id).await?;
    Ok(Json(ReconciliationResponse::from_outcome(&outcome)?))
}

/// POST /payments/callback applies a gateway notification to the payment
/// issued under its transaction id.
///
/// Replayed notifications are accepted and change nothing. A transaction id
/// shared by several payments is refused with 409 rather than guessed.
#[tracing::instrument(skip(state, body))]
pub async fn callback<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<ReconciliationResponse>), ApiError> {
    let req: CallbackRequest = parse_json(normalize_payment_fields(body))?;
    let outcome: GatewayOutcome = req.status.parse().map_err(ApiError::BadRequest)?;

    state.catch_up().await?;
    let mut matches = state.payment_rows.with_transaction(&req.transaction_id).await;
    let row = match matches.len() {
        0 => {
            tracing::warn!(transaction_id = %req.transaction_id, "callback for unknown transaction");
            return Err(ApiError::NotFound(format!(
                "No payment with transaction id {}",
                req.transaction_id
            )));
        }
        1 => matches.remove(0),
        n => {
            tracing::error!(transaction_id = %req.transaction_id, payments = n, "ambiguous callback");
            return Err(ApiError::Conflict(format!(
                "Transaction id {} matches {n} payments",
                req.transaction_id
            )));
        }
    };

    tracing::info!(
        transaction_id = %req.transaction_id,
        payment_id = %row.payment_id,
        outcome = ?outcome,
        "gateway callback"
    );
    let result = match outcome {
        GatewayOutcome::Confirmed => state.payments.validate_payment(row.payment_id, req.reference).await?,
        GatewayOutcome::Failed => {
            let reason = req.reason.unwrap_or_else(|| "rejected by gateway".to_string());
            state.payments.reject_payment(row.payment_id, reason).await?
        }
        GatewayOutcome::Cancelled => state.payments.cancel_payment(row.payment_id, req.reason).await?,
    };
    Ok((StatusCode::OK, Json(ReconciliationResponse::from_outcome(&result)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_statuses_and_synonyms() {
        assert_eq!("SUCCESS".parse::<GatewayOutcome>(), Ok(GatewayOutcome::Confirmed));
        assert_eq!("paid".parse::<GatewayOutcome>(), Ok(GatewayOutcome::Confirmed));
        assert_eq!("declined".parse::<GatewayOutcome>(), Ok(GatewayOutcome::Failed));
        assert_eq!(" canceled ".parse::<GatewayOutcome>(), Ok(GatewayOutcome::Cancelled));
        assert!("pending".parse::<GatewayOutcome>().is_err());
    }
}
