//! Payment operations and order reconciliation.

use common::{AggregateId, Money};
use event_store::EventStore;

use crate::command::{CommandHandler, UnitOfWork, apply_committed};
use crate::error::DomainError;
use crate::retry::{RetryPolicy, retry_on_conflict};
use crate::sell::Sell;

use super::{CreatePayment, Payment, PaymentError, PaymentEvent};

/// A payment together with its order, both as committed.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub payment: Payment,
    pub sell: Sell,
}

/// Creates and moves payments, keeping each order's paid total in step.
///
/// Every payment write is committed together with the recomputed totals of
/// its order, both streams at their expected versions. A concurrent writer
/// on either stream turns into a conflict, and the whole operation is
/// reloaded and retried.
pub struct PaymentService<S: EventStore> {
    payments: CommandHandler<S, Payment>,
    sells: CommandHandler<S, Sell>,
    retry: RetryPolicy,
}

impl<S: EventStore + Clone> PaymentService<S> {
    pub fn new(store: S) -> Self {
        Self {
            payments: CommandHandler::new(store.clone()),
            sells: CommandHandler::new(store),
            retry: RetryPolicy::default(),
        }
    }
}

impl<S: EventStore> PaymentService<S> {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.payments = self.payments.with_retry(retry);
        self.sells = self.sells.with_retry(retry);
        self.retry = retry;
        self
    }

    #[tracing::instrument(
        skip(self, cmd),
        fields(payment_id = %cmd.payment_id, sell_id = %cmd.sell_id, amount = %cmd.amount, method = %cmd.method)
    )]
    pub async fn create_payment(&self, cmd: CreatePayment) -> Result<Reconciliation, DomainError> {
        let cmd = &cmd;
        let outcome = retry_on_conflict(&self.retry, "create_payment", move || self.create_once(cmd))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to create payment"))?;

        metrics::counter!("payments_reconciled", "operation" => "create").increment(1);
        tracing::info!(
            transaction_id = %outcome.payment.transaction_id(),
            state = %outcome.payment.state(),
            payment_status = %outcome.sell.payment_status(),
            "payment created"
        );
        Ok(outcome)
    }

    async fn create_once(&self, cmd: &CreatePayment) -> Result<Reconciliation, DomainError> {
        let sell = self.sells.require(cmd.sell_id).await?;
        let payment = self.payments.load(cmd.payment_id).await?;

        let events = payment.create(cmd)?;
        let payment_append = self.payments.stage(cmd.payment_id, &payment, &events)?;
        let mut payment = payment;
        apply_committed(&mut payment, events);

        let sell_events = sell.record_payment(cmd.payment_id, payment.amount(), payment.state())?;

        let mut uow = UnitOfWork::new();
        uow.add(payment_append);
        uow.add(self.sells.stage(cmd.sell_id, &sell, &sell_events)?);
        uow.commit(self.sells.store()).await?;

        let mut sell = sell;
        apply_committed(&mut sell, sell_events);
        self.sells.snapshot_after_commit(&sell).await;
        Ok(Reconciliation { payment, sell })
    }

    /// Confirms a pending payment. Confirming a successful payment again
    /// changes nothing, so gateway notifications can be replayed.
    #[tracing::instrument(skip(self, reference))]
    pub async fn validate_payment(
        &self,
        payment_id: AggregateId,
        reference: Option<String>,
    ) -> Result<Reconciliation, DomainError> {
        self.change(payment_id, "validate", |payment| payment.validate(reference.clone()))
            .await
    }

    #[tracing::instrument(skip(self, reason))]
    pub async fn reject_payment(
        &self,
        payment_id: AggregateId,
        reason: String,
    ) -> Result<Reconciliation, DomainError> {
        self.change(payment_id, "reject", |payment| payment.reject(reason.clone()))
            .await
    }

    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_payment(
        &self,
        payment_id: AggregateId,
        reason: Option<String>,
    ) -> Result<Reconciliation, DomainError> {
        self.change(payment_id, "cancel", |payment| payment.cancel(reason.clone()))
            .await
    }

    #[tracing::instrument(skip(self, reason))]
    pub async fn refund_payment(
        &self,
        payment_id: AggregateId,
        reason: Option<String>,
    ) -> Result<Reconciliation, DomainError> {
        self.change(payment_id, "refund", |payment| payment.refund(reason.clone()))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_amount(
        &self,
        payment_id: AggregateId,
        amount: Money,
    ) -> Result<Reconciliation, DomainError> {
        self.change(payment_id, "update_amount", |payment| payment.change_amount(amount))
            .await
    }

    /// Detaches the payment from its order. The payment stream is kept.
    #[tracing::instrument(skip(self))]
    pub async fn delete_payment(&self, payment_id: AggregateId) -> Result<Reconciliation, DomainError> {
        self.change(payment_id, "delete", Payment::delete).await
    }

    /// `None` for unknown and deleted payments.
    pub async fn get_payment(&self, payment_id: AggregateId) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .payments
            .load_existing(payment_id)
            .await?
            .filter(|payment| !payment.is_deleted()))
    }

    /// Payments attached to the order, oldest ledger entry order.
    pub async fn list_for_order(&self, sell_id: AggregateId) -> Result<Vec<Payment>, DomainError> {
        let sell = self.sells.require(sell_id).await?;
        let mut payments = Vec::with_capacity(sell.payments().len());
        for payment_id in sell.payments().keys() {
            payments.push(self.payments.require(*payment_id).await?);
        }
        payments.sort_by_key(Payment::created_at);
        Ok(payments)
    }

    async fn change<F>(
        &self,
        payment_id: AggregateId,
        operation: &'static str,
        command: F,
    ) -> Result<Reconciliation, DomainError>
    where
        F: Fn(&Payment) -> Result<Vec<PaymentEvent>, PaymentError>,
    {
        let command = &command;
        let outcome = retry_on_conflict(&self.retry, operation, move || {
            self.change_once(payment_id, command)
        })
        .await
        .inspect_err(|e| tracing::error!(operation, error = %e, "payment operation failed"))?;

        metrics::counter!("payments_reconciled", "operation" => operation).increment(1);
        tracing::info!(
            operation,
            state = %outcome.payment.state(),
            total_paid = %outcome.sell.total_paid(),
            payment_status = %outcome.sell.payment_status(),
            "payment reconciled"
        );
        Ok(outcome)
    }

    async fn change_once<F>(
        &self,
        payment_id: AggregateId,
        command: &F,
    ) -> Result<Reconciliation, DomainError>
    where
        F: Fn(&Payment) -> Result<Vec<PaymentEvent>, PaymentError>,
    {
        let payment = self.payments.require(payment_id).await?;
        let sell_id = payment
            .sell_id()
            .ok_or_else(|| DomainError::not_found("Sell", payment_id))?;
        let sell = self.sells.require(sell_id).await?;

        let events = command(&payment)?;
        if events.is_empty() {
            return Ok(Reconciliation { payment, sell });
        }

        let payment_append = self.payments.stage(payment_id, &payment, &events)?;
        let mut payment = payment;
        apply_committed(&mut payment, events);

        let sell_events = if payment.is_deleted() {
            sell.detach_payment(payment_id)?
        } else {
            sell.record_payment(payment_id, payment.amount(), payment.state())?
        };

        let mut uow = UnitOfWork::new();
        uow.add(payment_append);
        uow.add(self.sells.stage(sell_id, &sell, &sell_events)?);
        uow.commit(self.sells.store()).await?;

        let mut sell = sell;
        apply_committed(&mut sell, sell_events);
        self.sells.snapshot_after_commit(&sell).await;
        Ok(Reconciliation { payment, sell })
    }
}
