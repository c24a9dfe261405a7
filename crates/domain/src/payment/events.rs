//! Payment domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, Money};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{PaymentMethod, PaymentState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentEvent {
    PaymentCreated(PaymentCreatedData),
    /// Confirmed by the gateway or an administrator.
    PaymentValidated(PaymentValidatedData),
    PaymentRejected(PaymentRejectedData),
    PaymentCancelled(PaymentCancelledData),
    PaymentRefunded(PaymentRefundedData),
    PaymentAmountChanged(PaymentAmountChangedData),
    /// Detached from its order; the stream is kept for the audit trail.
    PaymentDeleted(PaymentDeletedData),
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentCreated(_) => "PaymentCreated",
            PaymentEvent::PaymentValidated(_) => "PaymentValidated",
            PaymentEvent::PaymentRejected(_) => "PaymentRejected",
            PaymentEvent::PaymentCancelled(_) => "PaymentCancelled",
            PaymentEvent::PaymentRefunded(_) => "PaymentRefunded",
            PaymentEvent::PaymentAmountChanged(_) => "PaymentAmountChanged",
            PaymentEvent::PaymentDeleted(_) => "PaymentDeleted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCreatedData {
    pub payment_id: AggregateId,
    pub sell_id: AggregateId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub state: PaymentState,
    pub transaction_id: String,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentValidatedData {
    /// Gateway reference, when the confirmation came with one.
    pub reference: Option<String>,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRejectedData {
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCancelledData {
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefundedData {
    pub reason: Option<String>,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAmountChangedData {
    pub previous: Money,
    pub amount: Money,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDeletedData {
    pub deleted_at: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn validated(reference: Option<String>) -> Self {
        PaymentEvent::PaymentValidated(PaymentValidatedData {
            reference,
            validated_at: Utc::now(),
        })
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        PaymentEvent::PaymentRejected(PaymentRejectedData {
            reason: reason.into(),
            rejected_at: Utc::now(),
        })
    }

    pub fn cancelled(reason: Option<String>) -> Self {
        PaymentEvent::PaymentCancelled(PaymentCancelledData {
            reason,
            cancelled_at: Utc::now(),
        })
    }

    pub fn refunded(reason: Option<String>) -> Self {
        PaymentEvent::PaymentRefunded(PaymentRefundedData {
            reason,
            refunded_at: Utc::now(),
        })
    }

    pub fn amount_changed(previous: Money, amount: Money) -> Self {
        PaymentEvent::PaymentAmountChanged(PaymentAmountChangedData {
            previous,
            amount,
            changed_at: Utc::now(),
        })
    }

    pub fn deleted() -> Self {
        PaymentEvent::PaymentDeleted(PaymentDeletedData {
            deleted_at: Utc::now(),
        })
    }
}
