//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, PaymentError, SellError, SettingsError, StockError};
use projections::ProjectionError;

/// API-level error type that maps to HTTP responses.
///
/// Every error renders as `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Domain(DomainError),
    Projection(ProjectionError),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Domain(err) => (domain_status(&err), err.to_string()),
            ApiError::Projection(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "success": false, "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    if err.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    if err.is_conflict() {
        return StatusCode::CONFLICT;
    }
    match err {
        DomainError::Sell(sell_err) => match sell_err {
            SellError::NoLines
            | SellError::InvalidQuantity { .. }
            | SellError::InvalidPrice { .. }
            | SellError::InvalidDiscount
            | SellError::InvalidVatRate { .. }
            | SellError::AmountOverflow
            | SellError::QuantityOverflow { .. } => StatusCode::BAD_REQUEST,
            SellError::AlreadyPlaced
            | SellError::InvalidTransition { .. }
            | SellError::InvalidShippingTransition { .. }
            | SellError::CannotCancel { .. }
            | SellError::Cancelled => StatusCode::CONFLICT,
        },
        DomainError::Payment(payment_err) => match payment_err {
            PaymentError::InvalidAmount { .. } | PaymentError::InvalidInitialState { .. } => {
                StatusCode::BAD_REQUEST
            }
            PaymentError::InvalidTransition { .. }
            | PaymentError::AlreadyCreated
            | PaymentError::Deleted => StatusCode::CONFLICT,
        },
        DomainError::Stock(stock_err) => match stock_err {
            StockError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
            StockError::NotRegistered { .. } => StatusCode::NOT_FOUND,
            StockError::AlreadyRegistered { .. }
            | StockError::InsufficientStock { .. }
            | StockError::NothingToRelease { .. } => StatusCode::CONFLICT,
        },
        DomainError::Settings(SettingsError::Invalid(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        ApiError::Domain(DomainError::Settings(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AggregateId, Money};
    use domain::{OrderStatus, StockKey};

    fn status_of(err: impl Into<DomainError>) -> StatusCode {
        ApiError::Domain(err.into()).into_response().status()
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        assert_eq!(status_of(SellError::NoLines), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(SellError::InvalidVatRate { rate: rust_decimal::Decimal::from(-300) }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(SellError::AmountOverflow), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(PaymentError::InvalidAmount { amount: Money::ZERO }),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn state_errors_are_conflicts() {
        assert_eq!(
            status_of(SellError::CannotCancel { status: OrderStatus::Shipped }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(StockError::InsufficientStock {
                key: StockKey::product("MUG"),
                requested: 3,
                available: 1,
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn ambiguous_lookups_are_conflicts() {
        let response = ApiError::Conflict("Transaction id WV-1 matches 2 payments".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_records_are_not_found() {
        assert_eq!(
            status_of(StockError::NotRegistered { key: StockKey::product("MUG") }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::NotFound(format!("Order {} not found", AggregateId::new()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
    }
}
