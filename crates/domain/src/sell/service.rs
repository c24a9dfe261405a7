//! Order placement, fulfilment and cancellation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{AggregateId, Money};
use event_store::{EventEnvelope, EventStore};

use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, UnitOfWork, apply_committed};
use crate::error::DomainError;
use crate::pricing::is_valid_vat_rate;
use crate::retry::{RetryPolicy, retry_on_conflict};
use crate::settings::SettingsService;
use crate::stock::{StockError, StockItem, StockKey};

use super::{
    OrderStatus, PlaceOrder, Sell, SellDetail, SellDraft, SellError, ShippingStatus,
    quantities_by_key,
};

/// `<prefix>-<yyyymmdd>-<8 hex>`, the hex part taken from the order id.
pub fn invoice_number(prefix: &str, sell_id: AggregateId, at: DateTime<Utc>) -> String {
    let simple = sell_id.as_uuid().simple().to_string().to_uppercase();
    format!("{}-{}-{}", prefix, at.format("%Y%m%d"), &simple[..8])
}

/// Places and manages orders.
///
/// Placing an order deducts stock and creates the order in one commit, and
/// cancelling releases the stock in the same commit as the cancellation, so
/// stock levels never disagree with the orders holding them.
pub struct OrderService<S: EventStore> {
    sells: CommandHandler<S, Sell>,
    stock: CommandHandler<S, StockItem>,
    settings: Arc<SettingsService>,
    retry: RetryPolicy,
}

impl<S: EventStore + Clone> OrderService<S> {
    pub fn new(store: S, settings: Arc<SettingsService>) -> Self {
        Self {
            sells: CommandHandler::new(store.clone()),
            stock: CommandHandler::new(store),
            settings,
            retry: RetryPolicy::default(),
        }
    }
}

impl<S: EventStore> OrderService<S> {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.sells = self.sells.with_retry(retry);
        self.stock = self.stock.with_retry(retry);
        self.retry = retry;
        self
    }

    /// Prices the order, deducts its stock and records it.
    ///
    /// Fails with [`StockError::InsufficientStock`] when any key cannot cover
    /// the merged quantity of its lines; nothing is written in that case.
    #[tracing::instrument(skip(self, cmd), fields(sell_id = %cmd.sell_id, lines = cmd.lines.len()))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<Sell, DomainError> {
        validate_lines(&cmd)?;
        let settings = self.settings.current().await?;

        let lines = cmd
            .lines
            .iter()
            .map(|line| {
                SellDetail::new(
                    line.stock_key(),
                    line.name.clone(),
                    line.quantity,
                    line.unit_price,
                    line.vat_rate.unwrap_or(settings.default_vat_rate),
                    line.discount,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let items_total = Money::checked_sum(lines.iter().map(|line| line.total))
            .ok_or(SellError::AmountOverflow)?;
        let shipping_cost = settings
            .shipping
            .cost_for(cmd.shipping_zone.as_deref(), items_total);
        let wanted = quantities_by_key(&lines)?;

        let draft = SellDraft {
            sell_id: cmd.sell_id,
            invoice_no: invoice_number(&settings.invoice_prefix, cmd.sell_id, Utc::now()),
            customer_id: cmd.customer_id,
            lines,
            order_discount: cmd.order_discount,
            shipping_cost,
            shipping_zone: cmd.shipping_zone.clone(),
            currency: settings.currency.clone(),
        };

        let draft = &draft;
        let wanted = &wanted;
        let sell = retry_on_conflict(&self.retry, "place_order", move || {
            self.place_once(draft, wanted)
        })
        .await
        .inspect_err(|e| {
            if let DomainError::Stock(StockError::InsufficientStock { key, .. }) = e {
                metrics::counter!("stock_rejections").increment(1);
                tracing::warn!(%key, error = %e, "order rejected");
            } else {
                tracing::error!(error = %e, "failed to place order");
            }
        })?;

        metrics::counter!("orders_placed").increment(1);
        tracing::info!(
            invoice_no = %sell.invoice_no(),
            grand_total = %sell.total_payable_amount(),
            "order placed"
        );
        Ok(sell)
    }

    async fn place_once(
        &self,
        draft: &SellDraft,
        wanted: &BTreeMap<StockKey, u32>,
    ) -> Result<Sell, DomainError> {
        let sell = self.sells.load(draft.sell_id).await?;
        let sell_events = sell.place(draft.clone())?;

        let mut uow = UnitOfWork::new();
        let mut touched = Vec::with_capacity(wanted.len());
        for (key, quantity) in wanted {
            let item = self.load_stock(key).await?;
            let events = item.deduct(*quantity, draft.sell_id)?;
            uow.add(self.stock.stage(key.stream_id(), &item, &events)?);
            touched.push((item, events));
        }
        uow.add(self.sells.stage(draft.sell_id, &sell, &sell_events)?);
        uow.commit(self.sells.store()).await?;

        let mut sell = sell;
        apply_committed(&mut sell, sell_events);
        self.sells.snapshot_after_commit(&sell).await;
        for (mut item, events) in touched {
            apply_committed(&mut item, events);
            self.stock.snapshot_after_commit(&item).await;
        }
        Ok(sell)
    }

    #[tracing::instrument(skip(self))]
    pub async fn advance_status(
        &self,
        sell_id: AggregateId,
        to: OrderStatus,
    ) -> Result<Sell, DomainError> {
        let result = self
            .sells
            .execute_existing(sell_id, |sell| sell.advance_status(to))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to change order status"))?;
        self.sells.snapshot_after_commit(&result.aggregate).await;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_shipping_status(
        &self,
        sell_id: AggregateId,
        to: ShippingStatus,
    ) -> Result<Sell, DomainError> {
        let result = self
            .sells
            .execute_existing(sell_id, |sell| sell.set_shipping_status(to))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to change shipping status"))?;
        self.sells.snapshot_after_commit(&result.aggregate).await;
        Ok(result.aggregate)
    }

    /// Cancels the order and hands its stock back.
    #[tracing::instrument(skip(self, reason, cancelled_by))]
    pub async fn cancel_order(
        &self,
        sell_id: AggregateId,
        reason: String,
        cancelled_by: String,
    ) -> Result<Sell, DomainError> {
        let reason = &reason;
        let cancelled_by = &cancelled_by;
        let sell = retry_on_conflict(&self.retry, "cancel_order", move || {
            self.cancel_once(sell_id, reason, cancelled_by)
        })
        .await
        .inspect_err(|e| tracing::error!(error = %e, "failed to cancel order"))?;

        tracing::info!(invoice_no = %sell.invoice_no(), "order cancelled");
        Ok(sell)
    }

    async fn cancel_once(
        &self,
        sell_id: AggregateId,
        reason: &str,
        cancelled_by: &str,
    ) -> Result<Sell, DomainError> {
        let sell = self.sells.require(sell_id).await?;
        if sell.is_cancelled() {
            return Err(SellError::Cancelled.into());
        }
        if !sell.order_status().can_cancel() {
            return Err(SellError::CannotCancel {
                status: sell.order_status(),
            }
            .into());
        }

        let mut uow = UnitOfWork::new();
        let mut released = Vec::new();
        let mut touched = Vec::new();
        for key in sell.stock_keys() {
            let item = self.stock.load(key.stream_id()).await?;
            let held = item.held_by(sell_id);
            if held == 0 {
                continue;
            }
            let events = item.release(held, sell_id)?;
            uow.add(self.stock.stage(key.stream_id(), &item, &events)?);
            released.push((key, held));
            touched.push((item, events));
        }

        let sell_events = sell.cancel(reason, cancelled_by, released)?;
        uow.add(self.sells.stage(sell_id, &sell, &sell_events)?);
        uow.commit(self.sells.store()).await?;

        let mut sell = sell;
        apply_committed(&mut sell, sell_events);
        self.sells.snapshot_after_commit(&sell).await;
        for (mut item, events) in touched {
            apply_committed(&mut item, events);
            self.stock.snapshot_after_commit(&item).await;
        }
        Ok(sell)
    }

    pub async fn get_order(&self, sell_id: AggregateId) -> Result<Option<Sell>, DomainError> {
        self.sells.load_existing(sell_id).await
    }

    /// Raw event history of one order, oldest first.
    pub async fn history(&self, sell_id: AggregateId) -> Result<Vec<EventEnvelope>, DomainError> {
        Ok(self.sells.store().get_events_for_aggregate(sell_id).await?)
    }

    async fn load_stock(&self, key: &StockKey) -> Result<StockItem, DomainError> {
        let item = self.stock.load(key.stream_id()).await?;
        if item.id().is_none() {
            return Err(StockError::NotRegistered { key: key.clone() }.into());
        }
        Ok(item)
    }
}

fn validate_lines(cmd: &PlaceOrder) -> Result<(), SellError> {
    if cmd.lines.is_empty() {
        return Err(SellError::NoLines);
    }
    for line in &cmd.lines {
        if line.quantity == 0 {
            return Err(SellError::InvalidQuantity {
                quantity: line.quantity,
            });
        }
        if !line.unit_price.is_positive() {
            return Err(SellError::InvalidPrice {
                price: line.unit_price,
            });
        }
        if !line.discount.is_valid() {
            return Err(SellError::InvalidDiscount);
        }
        if let Some(rate) = line.vat_rate
            && !is_valid_vat_rate(rate)
        {
            return Err(SellError::InvalidVatRate { rate });
        }
    }
    if !cmd.order_discount.is_valid() {
        return Err(SellError::InvalidDiscount);
    }
    Ok(())
}
