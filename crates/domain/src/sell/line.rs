//! Order line items.

use common::{Money, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::{Discount, LineAmounts, line_amounts};
use crate::stock::StockKey;

use super::SellError;

/// One product line of an order, with its amounts already computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellDetail {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub vat_rate: Decimal,
    #[serde(default)]
    pub discount: Discount,

    pub subtotal: Money,
    pub vat: Money,
    pub discount_amount: Money,
    pub total: Money,
}

impl SellDetail {
    /// Fails with [`SellError::AmountOverflow`] when the line cannot be priced.
    pub fn new(
        key: StockKey,
        name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
        vat_rate: Decimal,
        discount: Discount,
    ) -> Result<Self, SellError> {
        let mut line = Self {
            product_id: key.product_id,
            variant: key.variant,
            name: name.into(),
            quantity,
            unit_price,
            vat_rate,
            discount,
            subtotal: Money::ZERO,
            vat: Money::ZERO,
            discount_amount: Money::ZERO,
            total: Money::ZERO,
        };
        line.recompute()?;
        Ok(line)
    }

    /// Changes the quantity and reprices. On overflow the line is left as it was.
    pub fn set_quantity(&mut self, quantity: u32) -> Result<(), SellError> {
        let previous = self.quantity;
        self.quantity = quantity;
        self.recompute().inspect_err(|_| self.quantity = previous)
    }

    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.product_id.clone(), self.variant.clone())
    }

    pub fn amounts(&self) -> LineAmounts {
        LineAmounts {
            subtotal: self.subtotal,
            vat: self.vat,
            discount: self.discount_amount,
            total: self.total,
        }
    }

    fn recompute(&mut self) -> Result<(), SellError> {
        let amounts = line_amounts(self.unit_price, self.quantity, self.vat_rate, self.discount)
            .ok_or(SellError::AmountOverflow)?;
        self.subtotal = amounts.subtotal;
        self.vat = amounts.vat;
        self.discount_amount = amounts.discount;
        self.total = amounts.total;
        Ok(())
    }
}
