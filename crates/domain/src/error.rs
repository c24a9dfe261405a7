//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::payment::PaymentError;
use crate::sell::SellError;
use crate::settings::SettingsError;
use crate::stock::StockError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Order error: {0}")]
    Sell(#[from] SellError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Stock error: {0}")]
    Stock(#[from] StockError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// A version race that a reload and retry may resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_conflict())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomainError::AggregateNotFound { .. } | DomainError::Stock(StockError::NotRegistered { .. })
        )
    }

    pub(crate) fn not_found(aggregate_type: &'static str, id: impl ToString) -> Self {
        DomainError::AggregateNotFound {
            aggregate_type,
            aggregate_id: id.to_string(),
        }
    }
}
