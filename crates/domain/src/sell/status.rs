//! Order, shipping and payment status codes.

use common::Money;
use serde::{Deserialize, Serialize};

/// Fulfilment stage of an order. Stored and exposed as its numeric code.
///
/// ```text
/// Pending ─► Confirmed ─► Processing ─► ReadyToShip ─► Shipped ─► Delivered
///    │           │             │              │
///    └───────────┴─────────────┴──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    ReadyToShip,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_code(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Processing => 2,
            OrderStatus::ReadyToShip => 3,
            OrderStatus::Shipped => 4,
            OrderStatus::Delivered => 5,
            OrderStatus::Cancelled => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => OrderStatus::Pending,
            1 => OrderStatus::Confirmed,
            2 => OrderStatus::Processing,
            3 => OrderStatus::ReadyToShip,
            4 => OrderStatus::Shipped,
            5 => OrderStatus::Delivered,
            6 => OrderStatus::Cancelled,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Forward moves only. Cancelling goes through [`OrderStatus::can_cancel`].
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        !self.is_terminal() && next != OrderStatus::Cancelled && next > *self
    }

    /// Orders can be cancelled until they leave the warehouse.
    pub fn can_cancel(&self) -> bool {
        *self <= OrderStatus::ReadyToShip
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::ReadyToShip => "ready_to_ship",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl From<OrderStatus> for u8 {
    fn from(status: OrderStatus) -> Self {
        status.as_code()
    }
}

impl TryFrom<u8> for OrderStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        OrderStatus::from_code(code).ok_or_else(|| format!("unknown order status code {code}"))
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    #[default]
    Pending,
    InProgress,
    Delivered,
    Cancelled,
}

impl ShippingStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, ShippingStatus::Delivered | ShippingStatus::Cancelled)
    }

    pub fn can_change_to(&self, next: ShippingStatus) -> bool {
        !self.is_final() && next != *self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingStatus::Pending => "pending",
            ShippingStatus::InProgress => "in_progress",
            ShippingStatus::Delivered => "delivered",
            ShippingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ShippingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShippingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "pending" => Ok(ShippingStatus::Pending),
            "in_progress" => Ok(ShippingStatus::InProgress),
            "delivered" => Ok(ShippingStatus::Delivered),
            "cancelled" | "canceled" => Ok(ShippingStatus::Cancelled),
            other => Err(format!("unknown shipping status `{other}`")),
        }
    }
}

/// How much of an order has been paid. Exposed as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Partial,
    Refunded,
}

impl PaymentStatus {
    /// Status from the paid total `paid` against the payable total `total`.
    ///
    /// Overpayment is still `Paid`.
    pub fn derive(paid: Money, total: Money) -> Self {
        if paid.cents() <= 0 {
            PaymentStatus::Unpaid
        } else if paid >= total {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        }
    }

    /// [`PaymentStatus::derive`], reporting `Refunded` instead of `Unpaid`
    /// when nothing is paid because payments were refunded.
    pub fn reconcile(paid: Money, total: Money, any_refunded: bool) -> Self {
        match Self::derive(paid, total) {
            PaymentStatus::Unpaid if any_refunded => PaymentStatus::Refunded,
            status => status,
        }
    }

    pub fn as_code(&self) -> u8 {
        match self {
            PaymentStatus::Unpaid => 0,
            PaymentStatus::Paid => 1,
            PaymentStatus::Partial => 2,
            PaymentStatus::Refunded => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => PaymentStatus::Unpaid,
            1 => PaymentStatus::Paid,
            2 => PaymentStatus::Partial,
            3 => PaymentStatus::Refunded,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl From<PaymentStatus> for u8 {
    fn from(status: PaymentStatus) -> Self {
        status.as_code()
    }
}

impl TryFrom<u8> for PaymentStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        PaymentStatus::from_code(code).ok_or_else(|| format!("unknown payment status code {code}"))
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
