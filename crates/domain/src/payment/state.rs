//! Payment lifecycle and methods.

use serde::{Deserialize, Serialize};

/// State of a payment.
///
/// ```text
/// Pending ──┬──► Success ──► Refunded
///           ├──► Failed
///           └──► Cancelled
/// ```
/// Only `Success` counts towards an order's paid total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    #[default]
    Pending,
    Success,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentState {
    pub fn counts_as_paid(&self) -> bool {
        matches!(self, PaymentState::Success)
    }

    pub fn can_validate(&self) -> bool {
        matches!(self, PaymentState::Pending)
    }

    pub fn can_reject(&self) -> bool {
        matches!(self, PaymentState::Pending)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, PaymentState::Pending)
    }

    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentState::Success)
    }

    /// Amount edits are allowed while the payment is still live.
    pub fn can_change_amount(&self) -> bool {
        matches!(self, PaymentState::Pending | PaymentState::Success)
    }

    /// States a payment may be created in.
    pub fn is_valid_initial(&self) -> bool {
        matches!(self, PaymentState::Pending | PaymentState::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Success => "success",
            PaymentState::Failed => "failed",
            PaymentState::Refunded => "refunded",
            PaymentState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(PaymentState::Pending),
            "success" | "paid" | "completed" => Ok(PaymentState::Success),
            "failed" | "rejected" => Ok(PaymentState::Failed),
            "refunded" => Ok(PaymentState::Refunded),
            "cancelled" | "canceled" => Ok(PaymentState::Cancelled),
            other => Err(format!("unknown payment state `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[serde(rename = "paypal")]
    PayPal,
    OrangeMoney,
    Wave,
    CashOnDelivery,
}

impl PaymentMethod {
    /// Prefix of transaction ids issued for this method.
    pub fn transaction_prefix(&self) -> &'static str {
        match self {
            PaymentMethod::PayPal => "PP",
            PaymentMethod::OrangeMoney => "OM",
            PaymentMethod::Wave => "WV",
            PaymentMethod::CashOnDelivery => "COD",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::PayPal => "paypal",
            PaymentMethod::OrangeMoney => "orange_money",
            PaymentMethod::Wave => "wave",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    /// Accepts the canonical names and the spellings older clients send.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "paypal" | "pp" => Ok(PaymentMethod::PayPal),
            "orange_money" | "orangemoney" | "om" => Ok(PaymentMethod::OrangeMoney),
            "wave" | "wv" => Ok(PaymentMethod::Wave),
            "cash_on_delivery" | "cod" | "cash" => Ok(PaymentMethod::CashOnDelivery),
            _ => Err(format!("unknown payment method `{s}`")),
        }
    }
}
