//! Sell (order) aggregate.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use common::{AggregateId, CustomerId, Money};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::payment::PaymentState;
use crate::pricing::{Discount, OrderTotals, is_valid_vat_rate, order_totals};
use crate::stock::StockKey;

use super::events::{PaymentDetachedData, PaymentReconciledData, SellPlacedData};
use super::{
    OrderStatus, PaymentStatus, SellDetail, SellDraft, SellError, SellEvent, ShippingStatus,
};

/// What the order knows about one of its payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub amount: Money,
    pub state: PaymentState,
}

/// Paid total, amount due and status for a payment ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub total_paid: Money,
    pub total_due: Money,
    pub payment_status: PaymentStatus,
}

/// Sums successful payments against `payable`.
pub fn settle<'a>(
    payable: Money,
    ledger: impl IntoIterator<Item = &'a PaymentEntry>,
) -> Result<Settlement, SellError> {
    let mut total_paid = Money::ZERO;
    let mut any_refunded = false;
    for entry in ledger {
        if entry.state.counts_as_paid() {
            total_paid = total_paid
                .checked_add(entry.amount)
                .ok_or(SellError::AmountOverflow)?;
        }
        any_refunded |= entry.state == PaymentState::Refunded;
    }

    Ok(Settlement {
        total_paid,
        total_due: payable.saturating_sub(total_paid),
        payment_status: PaymentStatus::reconcile(total_paid, payable, any_refunded),
    })
}

/// Total quantity per stock key across `lines`.
pub fn quantities_by_key<'a>(
    lines: impl IntoIterator<Item = &'a SellDetail>,
) -> Result<BTreeMap<StockKey, u32>, SellError> {
    let mut merged = BTreeMap::new();
    for line in lines {
        let key = line.stock_key();
        let slot: &mut u32 = merged.entry(key.clone()).or_insert(0);
        *slot = slot
            .checked_add(line.quantity)
            .ok_or(SellError::QuantityOverflow { key })?;
    }
    Ok(merged)
}

/// An order: its lines, totals, fulfilment state and payment ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sell {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    invoice_no: String,
    customer_id: Option<CustomerId>,
    lines: Vec<SellDetail>,
    totals: OrderTotals,
    order_discount: Discount,
    shipping_zone: Option<String>,
    currency: String,

    order_status: OrderStatus,
    shipping_status: ShippingStatus,
    payment_status: PaymentStatus,
    total_paid: Money,
    total_due: Money,
    payments: BTreeMap<AggregateId, PaymentEntry>,

    placed_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
}

impl Aggregate for Sell {
    type Event = SellEvent;
    type Error = SellError;

    fn aggregate_type() -> &'static str {
        "Sell"
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
            SellEvent::SellPlaced(data) => self.apply_placed(data),
            SellEvent::OrderStatusChanged(data) => self.order_status = data.to,
            SellEvent::ShippingStatusChanged(data) => self.shipping_status = data.to,
            SellEvent::PaymentReconciled(data) => {
                self.payments.insert(
                    data.payment_id,
                    PaymentEntry {
                        amount: data.amount,
                        state: data.state,
                    },
                );
                self.total_paid = data.total_paid;
                self.total_due = data.total_due;
                self.payment_status = data.payment_status;
            }
            SellEvent::PaymentDetached(data) => {
                self.payments.remove(&data.payment_id);
                self.total_paid = data.total_paid;
                self.total_due = data.total_due;
                self.payment_status = data.payment_status;
            }
            SellEvent::SellCancelled(data) => {
                self.order_status = OrderStatus::Cancelled;
                self.shipping_status = ShippingStatus::Cancelled;
                self.cancel_reason = Some(data.reason);
            }
        }
    }
}

impl SnapshotCapable for Sell {
    fn snapshot_interval() -> usize {
        25
    }
}

impl Sell {
    fn apply_placed(&mut self, data: SellPlacedData) {
        self.id = Some(data.sell_id);
        self.invoice_no = data.invoice_no;
        self.customer_id = data.customer_id;
        self.lines = data.lines;
        self.totals = data.totals;
        self.order_discount = data.order_discount;
        self.shipping_zone = data.shipping_zone;
        self.currency = data.currency;
        self.placed_at = Some(data.placed_at);
        self.order_status = OrderStatus::Pending;
        self.shipping_status = ShippingStatus::Pending;
        self.payment_status = PaymentStatus::Unpaid;
        self.total_paid = Money::ZERO;
        self.total_due = data.totals.grand_total;
    }
}

// Queries
impl Sell {
    pub fn invoice_no(&self) -> &str {
        &self.invoice_no
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn lines(&self) -> &[SellDetail] {
        &self.lines
    }

    pub fn totals(&self) -> &OrderTotals {
        &self.totals
    }

    pub fn order_discount(&self) -> Discount {
        self.order_discount
    }

    pub fn shipping_zone(&self) -> Option<&str> {
        self.shipping_zone.as_deref()
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// What the customer owes; always the grand total.
    pub fn total_payable_amount(&self) -> Money {
        self.totals.grand_total
    }

    pub fn total_paid(&self) -> Money {
        self.total_paid
    }

    pub fn total_due(&self) -> Money {
        self.total_due
    }

    /// Amount paid beyond the payable total. Reported only.
    pub fn overpayment(&self) -> Money {
        self.total_paid.saturating_sub(self.total_payable_amount())
    }

    pub fn order_status(&self) -> OrderStatus {
        self.order_status
    }

    pub fn shipping_status(&self) -> ShippingStatus {
        self.shipping_status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payments(&self) -> &BTreeMap<AggregateId, PaymentEntry> {
        &self.payments
    }

    pub fn payment(&self, payment_id: AggregateId) -> Option<&PaymentEntry> {
        self.payments.get(&payment_id)
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.order_status == OrderStatus::Cancelled
    }

    /// Stock keys this order took stock from.
    pub fn stock_keys(&self) -> BTreeSet<StockKey> {
        self.lines.iter().map(SellDetail::stock_key).collect()
    }

    fn ensure_open(&self) -> Result<(), SellError> {
        if self.is_cancelled() {
            return Err(SellError::Cancelled);
        }
        Ok(())
    }
}

// Commands
impl Sell {
    pub fn place(&self, draft: SellDraft) -> Result<Vec<SellEvent>, SellError> {
        if self.id.is_some() {
            return Err(SellError::AlreadyPlaced);
        }
        if draft.lines.is_empty() {
            return Err(SellError::NoLines);
        }
        if !draft.order_discount.is_valid() {
            return Err(SellError::InvalidDiscount);
        }
        if let Some(line) = draft.lines.iter().find(|l| !is_valid_vat_rate(l.vat_rate)) {
            return Err(SellError::InvalidVatRate {
                rate: line.vat_rate,
            });
        }

        let amounts: Vec<_> = draft.lines.iter().map(SellDetail::amounts).collect();
        let totals = order_totals(&amounts, draft.order_discount, draft.shipping_cost)
            .ok_or(SellError::AmountOverflow)?;

        Ok(vec![SellEvent::SellPlaced(SellPlacedData {
            sell_id: draft.sell_id,
            invoice_no: draft.invoice_no,
            customer_id: draft.customer_id,
            lines: draft.lines,
            totals,
            order_discount: draft.order_discount,
            shipping_zone: draft.shipping_zone,
            currency: draft.currency,
            placed_at: Utc::now(),
        })])
    }

    /// Moves the order forward. Shipping follows when the order ships or is
    /// delivered.
    pub fn advance_status(&self, to: OrderStatus) -> Result<Vec<SellEvent>, SellError> {
        self.ensure_open()?;
        if !self.order_status.can_advance_to(to) {
            return Err(SellError::InvalidTransition {
                from: self.order_status,
                to,
            });
        }

        let mut events = vec![SellEvent::status_changed(self.order_status, to)];
        let shipping = match to {
            OrderStatus::Shipped => Some(ShippingStatus::InProgress),
            OrderStatus::Delivered => Some(ShippingStatus::Delivered),
            _ => None,
        };
        if let Some(shipping) = shipping
            && self.shipping_status.can_change_to(shipping)
        {
            events.push(SellEvent::shipping_changed(self.shipping_status, shipping));
        }
        Ok(events)
    }

    pub fn set_shipping_status(&self, to: ShippingStatus) -> Result<Vec<SellEvent>, SellError> {
        self.ensure_open()?;
        if to == self.shipping_status {
            return Ok(vec![]);
        }
        if !self.shipping_status.can_change_to(to) {
            return Err(SellError::InvalidShippingTransition {
                from: self.shipping_status,
                to,
            });
        }
        Ok(vec![SellEvent::shipping_changed(self.shipping_status, to)])
    }

    /// `released` lists the stock going back, recorded on the event.
    pub fn cancel(
        &self,
        reason: impl Into<String>,
        cancelled_by: impl Into<String>,
        released: Vec<(StockKey, u32)>,
    ) -> Result<Vec<SellEvent>, SellError> {
        self.ensure_open()?;
        if !self.order_status.can_cancel() {
            return Err(SellError::CannotCancel {
                status: self.order_status,
            });
        }
        Ok(vec![SellEvent::cancelled(reason, cancelled_by, released)])
    }

    /// Records the current amount and state of a payment and recomputes the
    /// paid total. Unchanged entries record nothing.
    pub fn record_payment(
        &self,
        payment_id: AggregateId,
        amount: Money,
        state: PaymentState,
    ) -> Result<Vec<SellEvent>, SellError> {
        let entry = PaymentEntry { amount, state };
        match self.payments.get(&payment_id) {
            Some(existing) if *existing == entry => return Ok(vec![]),
            Some(_) => {}
            None => self.ensure_open()?,
        }

        let mut ledger = self.payments.clone();
        ledger.insert(payment_id, entry);
        let settlement = settle(self.total_payable_amount(), ledger.values())?;

        Ok(vec![SellEvent::PaymentReconciled(PaymentReconciledData {
            payment_id,
            amount,
            state,
            total_paid: settlement.total_paid,
            total_due: settlement.total_due,
            payment_status: settlement.payment_status,
            reconciled_at: Utc::now(),
        })])
    }

    /// Drops a payment from the ledger and recomputes the paid total.
    pub fn detach_payment(&self, payment_id: AggregateId) -> Result<Vec<SellEvent>, SellError> {
        if !self.payments.contains_key(&payment_id) {
            return Ok(vec![]);
        }

        let settlement = settle(
            self.total_payable_amount(),
            self.payments
                .iter()
                .filter(|(id, _)| **id != payment_id)
                .map(|(_, entry)| entry),
        )?;

        Ok(vec![SellEvent::PaymentDetached(PaymentDetachedData {
            payment_id,
            total_paid: settlement.total_paid,
            total_due: settlement.total_due,
            payment_status: settlement.payment_status,
            detached_at: Utc::now(),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn line(sku: &str, quantity: u32, cents: i64) -> SellDetail {
        SellDetail::new(
            StockKey::product(sku),
            sku,
            quantity,
            Money::from_cents(cents),
            Decimal::ZERO,
            Discount::None,
        )
        .unwrap()
    }

    fn draft(lines: Vec<SellDetail>, shipping: i64) -> SellDraft {
        SellDraft {
            sell_id: AggregateId::new(),
            invoice_no: "INV-20240301-0000ABCD".to_string(),
            customer_id: None,
            lines,
            order_discount: Discount::None,
            shipping_cost: Money::from_cents(shipping),
            shipping_zone: None,
            currency: "XOF".to_string(),
        }
    }

    /// An order with a 10_000 grand total.
    fn placed() -> Sell {
        let mut sell = Sell::default();
        sell.apply_events(
            sell.place(draft(vec![line("MUG", 2, 4_000)], 2_000))
                .unwrap(),
        );
        sell
    }

    fn pay(sell: &mut Sell, id: AggregateId, cents: i64, state: PaymentState) {
        let events = sell.record_payment(id, Money::from_cents(cents), state).unwrap();
        sell.apply_events(events);
    }

    #[test]
    fn place_computes_totals() {
        let sell = placed();
        assert_eq!(sell.totals().items_subtotal, Money::from_cents(8_000));
        assert_eq!(sell.total_payable_amount(), Money::from_cents(10_000));
        assert_eq!(sell.total_due(), Money::from_cents(10_000));
        assert_eq!(sell.payment_status(), PaymentStatus::Unpaid);
        assert_eq!(sell.order_status(), OrderStatus::Pending);
    }

    #[test]
    fn place_rejects_empty_and_duplicate() {
        let sell = Sell::default();
        assert!(matches!(sell.place(draft(vec![], 0)), Err(SellError::NoLines)));
        assert!(matches!(
            placed().place(draft(vec![line("A", 1, 1)], 0)),
            Err(SellError::AlreadyPlaced)
        ));
    }

    #[test]
    fn partial_then_paid() {
        let mut sell = placed();
        pay(&mut sell, AggregateId::new(), 4_000, PaymentState::Success);
        assert_eq!(sell.payment_status(), PaymentStatus::Partial);
        assert_eq!(sell.total_due(), Money::from_cents(6_000));

        pay(&mut sell, AggregateId::new(), 6_000, PaymentState::Success);
        assert_eq!(sell.payment_status(), PaymentStatus::Paid);
        assert_eq!(sell.total_due(), Money::ZERO);
    }

    #[test]
    fn pending_payments_do_not_count() {
        let mut sell = placed();
        let id = AggregateId::new();
        pay(&mut sell, id, 10_000, PaymentState::Pending);
        assert_eq!(sell.total_paid(), Money::ZERO);
        assert_eq!(sell.payment_status(), PaymentStatus::Unpaid);

        pay(&mut sell, id, 10_000, PaymentState::Success);
        assert_eq!(sell.payment_status(), PaymentStatus::Paid);
        assert!(sell.record_payment(id, Money::from_cents(10_000), PaymentState::Success)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn overpayment_is_paid_and_reported() {
        let mut sell = placed();
        pay(&mut sell, AggregateId::new(), 12_500, PaymentState::Success);
        assert_eq!(sell.payment_status(), PaymentStatus::Paid);
        assert_eq!(sell.total_due(), Money::ZERO);
        assert_eq!(sell.overpayment(), Money::from_cents(2_500));
    }

    #[test]
    fn detaching_reduces_paid_total() {
        let mut sell = placed();
        let first = AggregateId::new();
        pay(&mut sell, first, 10_000, PaymentState::Success);
        pay(&mut sell, AggregateId::new(), 3_000, PaymentState::Success);

        sell.apply_events(sell.detach_payment(first).unwrap());
        assert_eq!(sell.total_paid(), Money::from_cents(3_000));
        assert_eq!(sell.payment_status(), PaymentStatus::Partial);
        assert!(sell.detach_payment(first).unwrap().is_empty());
    }

    #[test]
    fn fully_refunded_order_reports_refunded() {
        let mut sell = placed();
        let id = AggregateId::new();
        pay(&mut sell, id, 10_000, PaymentState::Success);
        pay(&mut sell, id, 10_000, PaymentState::Refunded);
        assert_eq!(sell.total_paid(), Money::ZERO);
        assert_eq!(sell.payment_status(), PaymentStatus::Refunded);
    }

    #[test]
    fn shipping_follows_order_status() {
        let mut sell = placed();
        sell.apply_events(sell.advance_status(OrderStatus::ReadyToShip).unwrap());
        assert_eq!(sell.shipping_status(), ShippingStatus::Pending);

        let events = sell.advance_status(OrderStatus::Shipped).unwrap();
        assert_eq!(events.len(), 2);
        sell.apply_events(events);
        assert_eq!(sell.shipping_status(), ShippingStatus::InProgress);

        sell.apply_events(sell.advance_status(OrderStatus::Delivered).unwrap());
        assert_eq!(sell.shipping_status(), ShippingStatus::Delivered);
        assert!(matches!(
            sell.advance_status(OrderStatus::Shipped),
            Err(SellError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancel_window() {
        let mut sell = placed();
        sell.apply_events(sell.advance_status(OrderStatus::Shipped).unwrap());
        assert!(matches!(
            sell.cancel("late", "admin", vec![]),
            Err(SellError::CannotCancel { status: OrderStatus::Shipped })
        ));

        let mut open = placed();
        open.apply_events(open.cancel("customer request", "admin", vec![]).unwrap());
        assert!(open.is_cancelled());
        assert_eq!(open.shipping_status(), ShippingStatus::Cancelled);
        assert!(matches!(
            open.record_payment(AggregateId::new(), Money::from_cents(1), PaymentState::Success),
            Err(SellError::Cancelled)
        ));
    }

    #[test]
    fn existing_payments_still_reconcile_after_cancel() {
        let mut sell = placed();
        let id = AggregateId::new();
        pay(&mut sell, id, 10_000, PaymentState::Success);
        sell.apply_events(sell.cancel("out of stock", "admin", vec![]).unwrap());

        pay(&mut sell, id, 10_000, PaymentState::Refunded);
        assert_eq!(sell.payment_status(), PaymentStatus::Refunded);
    }

    #[test]
    fn quantities_merge_per_key() {
        let merged =
            quantities_by_key(&[line("MUG", 2, 100), line("MUG", 3, 100), line("CAP", 1, 100)])
                .unwrap();
        assert_eq!(merged[&StockKey::product("MUG")], 5);
        assert_eq!(merged[&StockKey::product("CAP")], 1);
    }

    #[test]
    fn merged_quantity_overflow_is_rejected() {
        let err = quantities_by_key(&[line("MUG", u32::MAX, 1), line("MUG", u32::MAX, 1)])
            .unwrap_err();
        assert!(matches!(err, SellError::QuantityOverflow { key } if key == StockKey::product("MUG")));
    }

    #[test]
    fn place_rejects_out_of_range_vat() {
        let mut negative = line("MUG", 1, 10_000);
        negative.vat_rate = Decimal::from(-300);
        assert!(matches!(
            Sell::default().place(draft(vec![negative], 0)),
            Err(SellError::InvalidVatRate { .. })
        ));
    }

    #[test]
    fn place_rejects_totals_beyond_range() {
        let half = i64::MAX / 2;
        let lines = vec![line("MUG", 1, half), line("CAP", 1, half), line("HAT", 1, half)];
        assert!(matches!(
            Sell::default().place(draft(lines, 0)),
            Err(SellError::AmountOverflow)
        ));
    }

    #[test]
    fn payment_sum_overflow_is_rejected() {
        let mut sell = placed();
        pay(&mut sell, AggregateId::new(), i64::MAX, PaymentState::Success);
        assert_eq!(sell.payment_status(), PaymentStatus::Paid);

        let err = sell
            .record_payment(AggregateId::new(), Money::from_cents(1), PaymentState::Success)
            .unwrap_err();
        assert!(matches!(err, SellError::AmountOverflow));
        assert_eq!(sell.total_paid(), Money::from_cents(i64::MAX));
    }
}
