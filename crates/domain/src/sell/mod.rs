//! Orders: lines, totals, fulfilment and the payment ledger.

mod aggregate;
mod commands;
mod events;
mod line;
mod service;
mod status;

pub use aggregate::{PaymentEntry, Sell, Settlement, quantities_by_key, settle};
pub use commands::{LineRequest, PlaceOrder, SellDraft};
pub use events::{
    OrderStatusChangedData, PaymentDetachedData, PaymentReconciledData, SellCancelledData,
    SellEvent, SellPlacedData, ShippingStatusChangedData,
};
pub use line::SellDetail;
pub use service::{OrderService, invoice_number};
pub use status::{OrderStatus, PaymentStatus, ShippingStatus};

use common::Money;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::stock::StockKey;

#[derive(Debug, Error)]
pub enum SellError {
    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has no lines")]
    NoLines,

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: Money },

    #[error("Invalid discount: amounts cannot be negative and percentages must be within 0..=100")]
    InvalidDiscount,

    #[error("Invalid VAT rate: {rate} (must be within 0..=100)")]
    InvalidVatRate { rate: Decimal },

    #[error("Order amounts are too large")]
    AmountOverflow,

    #[error("Total quantity of {key} is too large")]
    QuantityOverflow { key: StockKey },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid shipping transition: {from} -> {to}")]
    InvalidShippingTransition {
        from: ShippingStatus,
        to: ShippingStatus,
    },

    #[error("Order cannot be cancelled once {status}")]
    CannotCancel { status: OrderStatus },

    #[error("Order is cancelled")]
    Cancelled,
}
