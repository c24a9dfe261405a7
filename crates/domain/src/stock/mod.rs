//! Per-variant stock levels.

mod aggregate;
mod events;
mod service;

pub use aggregate::{StockItem, StockKey};
pub use events::{
    StockAdjustedData, StockDeductedData, StockEvent, StockRegisteredData, StockReleasedData,
    StockRestockedData,
};
pub use service::StockService;

use common::AggregateId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StockError {
    #[error("Stock for {key} is already registered")]
    AlreadyRegistered { key: StockKey },

    #[error("No stock registered for {key}")]
    NotRegistered { key: StockKey },

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Insufficient stock for {key}: requested {requested}, available {available}")]
    InsufficientStock {
        key: StockKey,
        requested: u32,
        available: u32,
    },

    #[error("Order {sell_id} holds no stock of {key} to release")]
    NothingToRelease { key: StockKey, sell_id: AggregateId },
}
