//! Sales read model: one row per order with its fulfilment and payment state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, CustomerId, Money};
use domain::{OrderStatus, PaymentStatus, SellEvent, ShippingStatus};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::error::ProjectionError;
use crate::projection::Projection;
use crate::read_model::ReadModel;

/// Listing row for an order.
#[derive(Debug, Clone, Serialize)]
pub struct SaleSummary {
    pub sell_id: AggregateId,
    pub invoice_no: String,
    pub customer_id: Option<CustomerId>,
    pub order_status: OrderStatus,
    pub shipping_status: ShippingStatus,
    pub payment_status: PaymentStatus,
    pub line_count: usize,
    pub grand_total: Money,
    pub total_paid: Money,
    pub total_due: Money,
    pub currency: String,
    pub cancel_reason: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Narrows a sales listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SalesFilter {
    pub order_status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub customer_id: Option<CustomerId>,
}

impl SalesFilter {
    fn matches(&self, sale: &SaleSummary) -> bool {
        self.order_status.is_none_or(|s| s == sale.order_status)
            && self.payment_status.is_none_or(|s| s == sale.payment_status)
            && self.customer_id.is_none_or(|c| Some(c) == sale.customer_id)
    }
}

/// Orders as the back office lists them.
#[derive(Clone)]
pub struct SalesView {
    sales: Arc<RwLock<HashMap<AggregateId, SaleSummary>>>,
}

impl SalesView {
    pub fn new() -> Self {
        Self {
            sales: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, sell_id: AggregateId) -> Option<SaleSummary> {
        self.sales.read().await.get(&sell_id).cloned()
    }

    /// Every order, newest first.
    pub async fn all(&self) -> Vec<SaleSummary> {
        self.filter(SalesFilter::default()).await
    }

    /// Orders matching `filter`, newest first.
    pub async fn filter(&self, filter: SalesFilter) -> Vec<SaleSummary> {
        let sales = self.sales.read().await;
        let mut matching: Vec<_> = sales.values().filter(|s| filter.matches(s)).cloned().collect();
        matching.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        matching
    }

    /// Sum still owed across orders that are not cancelled.
    pub async fn outstanding(&self) -> Money {
        self.sales
            .read()
            .await
            .values()
            .filter(|s| s.order_status != OrderStatus::Cancelled)
            .map(|s| s.total_due)
            .sum()
    }
}

impl Default for SalesView {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(sell_id: AggregateId) -> ProjectionError {
    ProjectionError::MissingRecord {
        view: "SalesView",
        aggregate_id: sell_id,
    }
}

#[async_trait]
impl Projection for SalesView {
    fn name(&self) -> &'static str {
        "SalesView"
    }

    fn subscribes_to(&self) -> &'static [&'static str] {
        &["Sell"]
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let sell_event: SellEvent = event.decode()?;
        let sell_id = event.aggregate_id;
        let mut sales = self.sales.write().await;

        if let SellEvent::SellPlaced(data) = sell_event {
            sales.insert(
                sell_id,
                SaleSummary {
                    sell_id,
                    invoice_no: data.invoice_no,
                    customer_id: data.customer_id,
                    order_status: OrderStatus::Pending,
                    shipping_status: ShippingStatus::default(),
                    payment_status: PaymentStatus::Unpaid,
                    line_count: data.lines.len(),
                    grand_total: data.totals.grand_total,
                    total_paid: Money::ZERO,
                    total_due: data.totals.grand_total,
                    currency: data.currency,
                    cancel_reason: None,
                    placed_at: data.placed_at,
                    updated_at: data.placed_at,
                },
            );
            return Ok(());
        }

        let sale = sales.get_mut(&sell_id).ok_or_else(|| missing(sell_id))?;
        match sell_event {
            SellEvent::SellPlaced(_) => {}
            SellEvent::OrderStatusChanged(data) => {
                sale.order_status = data.to;
                sale.updated_at = data.changed_at;
            }
            SellEvent::ShippingStatusChanged(data) => {
                sale.shipping_status = data.to;
                sale.updated_at = data.changed_at;
            }
            SellEvent::PaymentReconciled(data) => {
                sale.total_paid = data.total_paid;
                sale.total_due = data.total_due;
                sale.payment_status = data.payment_status;
                sale.updated_at = data.reconciled_at;
            }
            SellEvent::PaymentDetached(data) => {
                sale.total_paid = data.total_paid;
                sale.total_due = data.total_due;
                sale.payment_status = data.payment_status;
                sale.updated_at = data.detached_at;
            }
            SellEvent::SellCancelled(data) => {
                sale.order_status = OrderStatus::Cancelled;
                sale.cancel_reason = Some(data.reason);
                sale.updated_at = data.cancelled_at;
            }
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.sales.write().await.clear();
        Ok(())
    }
}

impl ReadModel for SalesView {
    fn name(&self) -> &'static str {
        "SalesView"
    }

    fn count(&self) -> usize {
        self.sales.try_read().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::sell::{PaymentReconciledData, SellPlacedData};
    use domain::{DomainEvent, OrderTotals, PaymentState, SellDetail, StockKey};
    use event_store::Version;

    fn envelope(sell_id: AggregateId, version: i64, event: &SellEvent) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(sell_id)
            .aggregate_type("Sell")
            .event_type(event.event_type())
            .version(Version::new(version))
            .payload(event)
            .unwrap()
            .build()
            .unwrap()
    }

    fn placed(sell_id: AggregateId, total: i64, placed_at: DateTime<Utc>) -> SellEvent {
        let line = SellDetail::new(
            StockKey::product("MUG"),
            "Mug",
            1,
            Money::from_cents(total),
            Default::default(),
            Default::default(),
        )
        .unwrap();
        SellEvent::SellPlaced(SellPlacedData {
            sell_id,
            invoice_no: format!("INV-{}", &sell_id.to_string()[..8]),
            customer_id: None,
            lines: vec![line],
            totals: OrderTotals {
                items_subtotal: Money::from_cents(total),
                grand_total: Money::from_cents(total),
                ..Default::default()
            },
            order_discount: Default::default(),
            shipping_zone: None,
            currency: "XOF".to_string(),
            placed_at,
        })
    }

    fn reconciled(paid: i64, due: i64, status: PaymentStatus) -> SellEvent {
        SellEvent::PaymentReconciled(PaymentReconciledData {
            payment_id: AggregateId::new(),
            amount: Money::from_cents(paid),
            state: PaymentState::Success,
            total_paid: Money::from_cents(paid),
            total_due: Money::from_cents(due),
            payment_status: status,
            reconciled_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn placed_order_starts_unpaid() {
        let view = SalesView::new();
        let sell_id = AggregateId::new();
        view.handle(&envelope(sell_id, 1, &placed(sell_id, 5_000, Utc::now())))
            .await
            .unwrap();

        let sale = view.get(sell_id).await.unwrap();
        assert_eq!(sale.order_status, OrderStatus::Pending);
        assert_eq!(sale.payment_status, PaymentStatus::Unpaid);
        assert_eq!(sale.total_due, Money::from_cents(5_000));
        assert_eq!(sale.line_count, 1);
        assert_eq!(ReadModel::count(&view), 1);
    }

    #[tokio::test]
    async fn reconciliation_updates_totals() {
        let view = SalesView::new();
        let sell_id = AggregateId::new();
        view.handle(&envelope(sell_id, 1, &placed(sell_id, 5_000, Utc::now())))
            .await
            .unwrap();
        view.handle(&envelope(sell_id, 2, &reconciled(2_000, 3_000, PaymentStatus::Partial)))
            .await
            .unwrap();

        let sale = view.get(sell_id).await.unwrap();
        assert_eq!(sale.total_paid, Money::from_cents(2_000));
        assert_eq!(sale.payment_status, PaymentStatus::Partial);
        assert_eq!(view.outstanding().await, Money::from_cents(3_000));
    }

    #[tokio::test]
    async fn cancelled_orders_owe_nothing() {
        let view = SalesView::new();
        let sell_id = AggregateId::new();
        view.handle(&envelope(sell_id, 1, &placed(sell_id, 5_000, Utc::now())))
            .await
            .unwrap();
        view.handle(&envelope(sell_id, 2, &SellEvent::cancelled("duplicate", "admin", vec![])))
            .await
            .unwrap();

        let sale = view.get(sell_id).await.unwrap();
        assert_eq!(sale.order_status, OrderStatus::Cancelled);
        assert_eq!(sale.cancel_reason.as_deref(), Some("duplicate"));
        assert_eq!(view.outstanding().await, Money::ZERO);
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_filterable() {
        let view = SalesView::new();
        let older = AggregateId::new();
        let newer = AggregateId::new();
        let now = Utc::now();
        view.handle(&envelope(older, 1, &placed(older, 1_000, now - Duration::hours(1))))
            .await
            .unwrap();
        view.handle(&envelope(newer, 1, &placed(newer, 2_000, now)))
            .await
            .unwrap();
        view.handle(&envelope(older, 2, &reconciled(1_000, 0, PaymentStatus::Paid)))
            .await
            .unwrap();

        let all: Vec<_> = view.all().await.into_iter().map(|s| s.sell_id).collect();
        assert_eq!(all, vec![newer, older]);

        let paid = view
            .filter(SalesFilter {
                payment_status: Some(PaymentStatus::Paid),
                ..Default::default()
            })
            .await;
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].sell_id, older);
    }

    #[tokio::test]
    async fn event_for_unknown_order_is_an_error() {
        let view = SalesView::new();
        let sell_id = AggregateId::new();
        let result = view
            .handle(&envelope(sell_id, 2, &SellEvent::status_changed(OrderStatus::Pending, OrderStatus::Processing)))
            .await;
        assert!(matches!(result, Err(ProjectionError::MissingRecord { .. })));
    }

    #[tokio::test]
    async fn reset_clears_rows() {
        let view = SalesView::new();
        let sell_id = AggregateId::new();
        view.handle(&envelope(sell_id, 1, &placed(sell_id, 100, Utc::now())))
            .await
            .unwrap();
        view.reset().await.unwrap();
        assert!(view.all().await.is_empty());
    }
}
