//! Payment aggregate.

use chrono::{DateTime, Utc};
use common::{AggregateId, Money};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{CreatePayment, PaymentError, PaymentEvent, PaymentMethod, PaymentState};
use super::events::PaymentCreatedData;

/// `<METHOD>-<yyyymmddHHMMSS>-<8 hex>`, e.g. `OM-20240301101500-9F2C41AB`.
///
/// The hex part is the first 32 bits of the payment id. Two payments created
/// in the same second can share an id; readers that resolve transaction ids
/// must not assume uniqueness.
pub fn transaction_id_for(
    method: PaymentMethod,
    payment_id: AggregateId,
    at: DateTime<Utc>,
) -> String {
    let simple = payment_id.as_uuid().simple().to_string().to_uppercase();
    format!(
        "{}-{}-{}",
        method.transaction_prefix(),
        at.format("%Y%m%d%H%M%S"),
        &simple[..8]
    )
}

/// One payment attached to an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    sell_id: Option<AggregateId>,
    amount: Money,
    method: Option<PaymentMethod>,
    state: PaymentState,
    transaction_id: String,
    reference: Option<String>,
    failure_reason: Option<String>,
    note: Option<String>,
    created_at: Option<DateTime<Utc>>,
    deleted: bool,
}

impl Aggregate for Payment {
    type Event = PaymentEvent;
    type Error = PaymentError;

    fn aggregate_type() -> &'static str {
        "Payment"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            PaymentEvent::PaymentCreated(data) => self.apply_created(data),
            PaymentEvent::PaymentValidated(data) => {
                self.state = PaymentState::Success;
                if data.reference.is_some() {
                    self.reference = data.reference;
                }
            }
            PaymentEvent::PaymentRejected(data) => {
                self.state = PaymentState::Failed;
                self.failure_reason = Some(data.reason);
            }
            PaymentEvent::PaymentCancelled(data) => {
                self.state = PaymentState::Cancelled;
                self.failure_reason = data.reason;
            }
            PaymentEvent::PaymentRefunded(_) => {
                self.state = PaymentState::Refunded;
            }
            PaymentEvent::PaymentAmountChanged(data) => {
                self.amount = data.amount;
            }
            PaymentEvent::PaymentDeleted(_) => {
                self.deleted = true;
            }
        }
    }
}

impl Payment {
    fn apply_created(&mut self, data: PaymentCreatedData) {
        self.id = Some(data.payment_id);
        self.sell_id = Some(data.sell_id);
        self.amount = data.amount;
        self.method = Some(data.method);
        self.state = data.state;
        self.transaction_id = data.transaction_id;
        self.reference = data.reference;
        self.note = data.note;
        self.created_at = Some(data.created_at);
    }
}

// Queries
impl Payment {
    pub fn sell_id(&self) -> Option<AggregateId> {
        self.sell_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn method(&self) -> Option<PaymentMethod> {
        self.method
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn ensure_live(&self) -> Result<(), PaymentError> {
        if self.deleted {
            return Err(PaymentError::Deleted);
        }
        Ok(())
    }

    fn transition_error(&self, action: &'static str) -> PaymentError {
        PaymentError::InvalidTransition {
            current: self.state,
            action,
        }
    }
}

// Commands
impl Payment {
    pub fn create(&self, cmd: &CreatePayment) -> Result<Vec<PaymentEvent>, PaymentError> {
        if self.id.is_some() {
            return Err(PaymentError::AlreadyCreated);
        }
        if !cmd.amount.is_positive() {
            return Err(PaymentError::InvalidAmount { amount: cmd.amount });
        }
        if !cmd.initial_state.is_valid_initial() {
            return Err(PaymentError::InvalidInitialState {
                state: cmd.initial_state,
            });
        }

        let created_at = Utc::now();
        Ok(vec![PaymentEvent::PaymentCreated(PaymentCreatedData {
            payment_id: cmd.payment_id,
            sell_id: cmd.sell_id,
            amount: cmd.amount,
            method: cmd.method,
            state: cmd.initial_state,
            transaction_id: transaction_id_for(cmd.method, cmd.payment_id, created_at),
            reference: cmd.reference.clone(),
            note: cmd.note.clone(),
            created_at,
        })])
    }

    /// Marks the payment successful. Replays on a successful payment record
    /// nothing, so repeated gateway confirmations are harmless.
    pub fn validate(&self, reference: Option<String>) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_live()?;
        if self.state == PaymentState::Success {
            return Ok(vec![]);
        }
        if !self.state.can_validate() {
            return Err(self.transition_error("validate"));
        }
        Ok(vec![PaymentEvent::validated(reference)])
    }

    pub fn reject(&self, reason: impl Into<String>) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_live()?;
        if self.state == PaymentState::Failed {
            return Ok(vec![]);
        }
        if !self.state.can_reject() {
            return Err(self.transition_error("reject"));
        }
        Ok(vec![PaymentEvent::rejected(reason)])
    }

    pub fn cancel(&self, reason: Option<String>) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_live()?;
        if self.state == PaymentState::Cancelled {
            return Ok(vec![]);
        }
        if !self.state.can_cancel() {
            return Err(self.transition_error("cancel"));
        }
        Ok(vec![PaymentEvent::cancelled(reason)])
    }

    pub fn refund(&self, reason: Option<String>) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_live()?;
        if !self.state.can_refund() {
            return Err(self.transition_error("refund"));
        }
        Ok(vec![PaymentEvent::refunded(reason)])
    }

    pub fn change_amount(&self, amount: Money) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_live()?;
        if !amount.is_positive() {
            return Err(PaymentError::InvalidAmount { amount });
        }
        if !self.state.can_change_amount() {
            return Err(self.transition_error("change the amount of"));
        }
        if amount == self.amount {
            return Ok(vec![]);
        }
        Ok(vec![PaymentEvent::amount_changed(self.amount, amount)])
    }

    pub fn delete(&self) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_live()?;
        Ok(vec![PaymentEvent::deleted()])
    }
}
