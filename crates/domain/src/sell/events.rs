//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, CustomerId, Money};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::payment::PaymentState;
use crate::pricing::{Discount, OrderTotals};
use crate::stock::StockKey;

use super::{OrderStatus, PaymentStatus, SellDetail, ShippingStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SellEvent {
    SellPlaced(SellPlacedData),
    OrderStatusChanged(OrderStatusChangedData),
    ShippingStatusChanged(ShippingStatusChangedData),
    /// A payment was created or changed; carries the recomputed totals.
    PaymentReconciled(PaymentReconciledData),
    /// A payment was deleted; carries the recomputed totals.
    PaymentDetached(PaymentDetachedData),
    SellCancelled(SellCancelledData),
}

impl DomainEvent for SellEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SellEvent::SellPlaced(_) => "SellPlaced",
            SellEvent::OrderStatusChanged(_) => "OrderStatusChanged",
            SellEvent::ShippingStatusChanged(_) => "ShippingStatusChanged",
            SellEvent::PaymentReconciled(_) => "PaymentReconciled",
            SellEvent::PaymentDetached(_) => "PaymentDetached",
            SellEvent::SellCancelled(_) => "SellCancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellPlacedData {
    pub sell_id: AggregateId,
    pub invoice_no: String,
    pub customer_id: Option<CustomerId>,
    pub lines: Vec<SellDetail>,
    pub totals: OrderTotals,
    #[serde(default)]
    pub order_discount: Discount,
    pub shipping_zone: Option<String>,
    pub currency: String,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingStatusChangedData {
    pub from: ShippingStatus,
    pub to: ShippingStatus,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReconciledData {
    pub payment_id: AggregateId,
    pub amount: Money,
    pub state: PaymentState,
    pub total_paid: Money,
    pub total_due: Money,
    pub payment_status: PaymentStatus,
    pub reconciled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetachedData {
    pub payment_id: AggregateId,
    pub total_paid: Money,
    pub total_due: Money,
    pub payment_status: PaymentStatus,
    pub detached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellCancelledData {
    pub reason: String,
    pub cancelled_by: String,
    /// Stock handed back, per key.
    pub released: Vec<(StockKey, u32)>,
    pub cancelled_at: DateTime<Utc>,
}

impl SellEvent {
    pub fn status_changed(from: OrderStatus, to: OrderStatus) -> Self {
        SellEvent::OrderStatusChanged(OrderStatusChangedData {
            from,
            to,
            changed_at: Utc::now(),
        })
    }

    pub fn shipping_changed(from: ShippingStatus, to: ShippingStatus) -> Self {
        SellEvent::ShippingStatusChanged(ShippingStatusChangedData {
            from,
            to,
            changed_at: Utc::now(),
        })
    }

    pub fn cancelled(
        reason: impl Into<String>,
        cancelled_by: impl Into<String>,
        released: Vec<(StockKey, u32)>,
    ) -> Self {
        SellEvent::SellCancelled(SellCancelledData {
            reason: reason.into(),
            cancelled_by: cancelled_by.into(),
            released,
            cancelled_at: Utc::now(),
        })
    }
}
