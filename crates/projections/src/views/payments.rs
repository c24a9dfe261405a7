//! Payments read model.
//!
//! Keeps a row per live payment and an index from gateway transaction id to
//! payment, which is how gateway callbacks find the payment they confirm.
//! Transaction ids carry only 32 bits of the payment id, so the index keeps
//! every payment sharing one and lookups refuse to pick among them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, Money};
use domain::{PaymentEvent, PaymentMethod, PaymentState};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::error::ProjectionError;
use crate::projection::Projection;
use crate::read_model::ReadModel;

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSummary {
    pub payment_id: AggregateId,
    pub sell_id: AggregateId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub state: PaymentState,
    pub transaction_id: String,
    pub reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct PaymentsState {
    payments: HashMap<AggregateId, PaymentSummary>,
    by_transaction: HashMap<String, Vec<AggregateId>>,
}

#[derive(Clone)]
pub struct PaymentsView {
    state: Arc<RwLock<PaymentsState>>,
}

impl PaymentsView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PaymentsState::default())),
        }
    }

    pub async fn get(&self, payment_id: AggregateId) -> Option<PaymentSummary> {
        self.state.read().await.payments.get(&payment_id).cloned()
    }

    /// The payment issued under `transaction_id`. `None` when no payment or
    /// more than one carries it.
    pub async fn by_transaction(&self, transaction_id: &str) -> Option<PaymentSummary> {
        match self.with_transaction(transaction_id).await.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        }
    }

    /// Every live payment issued under `transaction_id`.
    pub async fn with_transaction(&self, transaction_id: &str) -> Vec<PaymentSummary> {
        let state = self.state.read().await;
        state
            .by_transaction
            .get(transaction_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.payments.get(id))
            .cloned()
            .collect()
    }

    /// Payments of one order, oldest first.
    pub async fn for_sell(&self, sell_id: AggregateId) -> Vec<PaymentSummary> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|p| p.sell_id == sell_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        payments
    }

    /// Every payment, newest first.
    pub async fn all(&self) -> Vec<PaymentSummary> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state.payments.values().cloned().collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        payments
    }
}

impl Default for PaymentsView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for PaymentsView {
    fn name(&self) -> &'static str {
        "PaymentsView"
    }

    fn subscribes_to(&self) -> &'static [&'static str] {
        &["Payment"]
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let payment_event: PaymentEvent = event.decode()?;
        let payment_id = event.aggregate_id;
        let mut state = self.state.write().await;

        match payment_event {
            PaymentEvent::PaymentCreated(data) => {
                let holders = state
                    .by_transaction
                    .entry(data.transaction_id.clone())
                    .or_default();
                if !holders.contains(&payment_id) {
                    holders.push(payment_id);
                }
                if holders.len() > 1 {
                    tracing::warn!(
                        transaction_id = %data.transaction_id,
                        payments = holders.len(),
                        "transaction id shared by several payments"
                    );
                }
                state.payments.insert(
                    payment_id,
                    PaymentSummary {
                        payment_id,
                        sell_id: data.sell_id,
                        amount: data.amount,
                        method: data.method,
                        state: data.state,
                        transaction_id: data.transaction_id,
                        reference: data.reference,
                        failure_reason: None,
                        created_at: data.created_at,
                        updated_at: data.created_at,
                    },
                );
            }
            PaymentEvent::PaymentDeleted(_) => {
                if let Some(removed) = state.payments.remove(&payment_id)
                    && let Some(holders) = state.by_transaction.get_mut(&removed.transaction_id)
                {
                    holders.retain(|id| *id != payment_id);
                    if holders.is_empty() {
                        state.by_transaction.remove(&removed.transaction_id);
                    }
                }
            }
            other => {
                let payment = state.payments.get_mut(&payment_id).ok_or(
                    ProjectionError::MissingRecord {
                        view: "PaymentsView",
                        aggregate_id: payment_id,
                    },
                )?;
                apply_change(payment, other);
            }
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.payments.clear();
        state.by_transaction.clear();
        Ok(())
    }
}

fn apply_change(payment: &mut PaymentSummary, event: PaymentEvent) {
    match event {
        PaymentEvent::PaymentValidated(data) => {
            payment.state = PaymentState::Success;
            if data.reference.is_some() {
                payment.reference = data.reference;
            }
            payment.updated_at = data.validated_at;
        }
        PaymentEvent::PaymentRejected(data) => {
            payment.state = PaymentState::Failed;
            payment.failure_reason = Some(data.reason);
            payment.updated_at = data.rejected_at;
        }
        PaymentEvent::PaymentCancelled(data) => {
            payment.state = PaymentState::Cancelled;
            payment.updated_at = data.cancelled_at;
        }
        PaymentEvent::PaymentRefunded(data) => {
            payment.state = PaymentState::Refunded;
            payment.updated_at = data.refunded_at;
        }
        PaymentEvent::PaymentAmountChanged(data) => {
            payment.amount = data.amount;
            payment.updated_at = data.changed_at;
        }
        PaymentEvent::PaymentCreated(_) | PaymentEvent::PaymentDeleted(_) => {}
    }
}

impl ReadModel for PaymentsView {
    fn name(&self) -> &'static str {
        "PaymentsView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.payments.len()).unwrap_or(0)
    }
}
