//! Order commands.

use common::{AggregateId, CustomerId, Money, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::pricing::Discount;
use crate::stock::StockKey;

use super::{Sell, SellDetail};

/// A line as requested at checkout, before pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant: Option<String>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    /// Falls back to the store's default VAT rate.
    #[serde(default)]
    pub vat_rate: Option<Decimal>,
    #[serde(default)]
    pub discount: Discount,
}

impl LineRequest {
    pub fn new(
        key: StockKey,
        name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: key.product_id,
            variant: key.variant,
            name: name.into(),
            quantity,
            unit_price,
            vat_rate: None,
            discount: Discount::None,
        }
    }

    pub fn with_vat_rate(mut self, rate: Decimal) -> Self {
        self.vat_rate = Some(rate);
        self
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = discount;
        self
    }

    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.product_id.clone(), self.variant.clone())
    }
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub sell_id: AggregateId,
    pub customer_id: Option<CustomerId>,
    pub lines: Vec<LineRequest>,
    pub order_discount: Discount,
    pub shipping_zone: Option<String>,
}

impl PlaceOrder {
    pub fn new(lines: Vec<LineRequest>) -> Self {
        Self {
            sell_id: AggregateId::new(),
            customer_id: None,
            lines,
            order_discount: Discount::None,
            shipping_zone: None,
        }
    }

    pub fn for_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.order_discount = discount;
        self
    }

    pub fn shipped_to(mut self, zone: impl Into<String>) -> Self {
        self.shipping_zone = Some(zone.into());
        self
    }
}

impl Command for PlaceOrder {
    type Aggregate = Sell;

    fn aggregate_id(&self) -> AggregateId {
        self.sell_id
    }
}

/// A priced order ready to be placed.
#[derive(Debug, Clone)]
pub struct SellDraft {
    pub sell_id: AggregateId,
    pub invoice_no: String,
    pub customer_id: Option<CustomerId>,
    pub lines: Vec<SellDetail>,
    pub order_discount: Discount,
    pub shipping_cost: Money,
    pub shipping_zone: Option<String>,
    pub currency: String,
}
