//! Stock domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::StockKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StockEvent {
    StockRegistered(StockRegisteredData),
    StockRestocked(StockRestockedData),
    /// Manual correction to an absolute level.
    StockAdjusted(StockAdjustedData),
    /// Taken by an order at placement.
    StockDeducted(StockDeductedData),
    /// Given back by a cancelled order.
    StockReleased(StockReleasedData),
}

impl DomainEvent for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockRegistered(_) => "StockRegistered",
            StockEvent::StockRestocked(_) => "StockRestocked",
            StockEvent::StockAdjusted(_) => "StockAdjusted",
            StockEvent::StockDeducted(_) => "StockDeducted",
            StockEvent::StockReleased(_) => "StockReleased",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRegisteredData {
    pub stock_id: AggregateId,
    pub key: StockKey,
    pub quantity: u32,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRestockedData {
    pub quantity: u32,
    pub note: Option<String>,
    pub restocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustedData {
    pub previous: u32,
    pub quantity: u32,
    pub adjusted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockDeductedData {
    pub quantity: u32,
    pub sell_id: AggregateId,
    pub deducted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReleasedData {
    pub quantity: u32,
    pub sell_id: AggregateId,
    pub released_at: DateTime<Utc>,
}

impl StockEvent {
    pub fn registered(stock_id: AggregateId, key: StockKey, quantity: u32) -> Self {
        StockEvent::StockRegistered(StockRegisteredData {
            stock_id,
            key,
            quantity,
            registered_at: Utc::now(),
        })
    }

    pub fn restocked(quantity: u32, note: Option<String>) -> Self {
        StockEvent::StockRestocked(StockRestockedData {
            quantity,
            note,
            restocked_at: Utc::now(),
        })
    }

    pub fn adjusted(previous: u32, quantity: u32) -> Self {
        StockEvent::StockAdjusted(StockAdjustedData {
            previous,
            quantity,
            adjusted_at: Utc::now(),
        })
    }

    pub fn deducted(quantity: u32, sell_id: AggregateId) -> Self {
        StockEvent::StockDeducted(StockDeductedData {
            quantity,
            sell_id,
            deducted_at: Utc::now(),
        })
    }

    pub fn released(quantity: u32, sell_id: AggregateId) -> Self {
        StockEvent::StockReleased(StockReleasedData {
            quantity,
            sell_id,
            released_at: Utc::now(),
        })
    }
}
