//! Payment commands.

use common::{AggregateId, Money};

use crate::command::Command;

use super::{Payment, PaymentMethod, PaymentState};

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub payment_id: AggregateId,
    pub sell_id: AggregateId,
    pub amount: Money,
    pub method: PaymentMethod,
    /// `Pending` for gateway payments awaiting confirmation, `Success` for
    /// payments recorded as already received.
    pub initial_state: PaymentState,
    pub reference: Option<String>,
    pub note: Option<String>,
}

impl CreatePayment {
    /// A pending payment with a fresh id.
    pub fn pending(sell_id: AggregateId, amount: Money, method: PaymentMethod) -> Self {
        Self {
            payment_id: AggregateId::new(),
            sell_id,
            amount,
            method,
            initial_state: PaymentState::Pending,
            reference: None,
            note: None,
        }
    }

    /// A payment recorded as already received.
    pub fn received(sell_id: AggregateId, amount: Money, method: PaymentMethod) -> Self {
        Self {
            initial_state: PaymentState::Success,
            ..Self::pending(sell_id, amount, method)
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl Command for CreatePayment {
    type Aggregate = Payment;

    fn aggregate_id(&self) -> AggregateId {
        self.payment_id
    }
}
