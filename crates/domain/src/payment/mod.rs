//! Payments against orders.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;

pub use aggregate::{Payment, transaction_id_for};
pub use commands::CreatePayment;
pub use events::{
    PaymentAmountChangedData, PaymentCancelledData, PaymentCreatedData, PaymentDeletedData,
    PaymentEvent, PaymentRefundedData, PaymentRejectedData, PaymentValidatedData,
};
pub use service::{PaymentService, Reconciliation};
pub use state::{PaymentMethod, PaymentState};

use common::Money;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Invalid amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: Money },

    #[error("A payment cannot be created in the {state} state")]
    InvalidInitialState { state: PaymentState },

    #[error("Invalid state transition: cannot {action} a {current} payment")]
    InvalidTransition {
        current: PaymentState,
        action: &'static str,
    },

    #[error("Payment already created")]
    AlreadyCreated,

    #[error("Payment has been deleted")]
    Deleted,
}
