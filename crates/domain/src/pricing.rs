//! Line and order arithmetic.
//!
//! Amounts are integer minor units. Every percentage is rounded half away
//! from zero to a whole minor unit at the line it applies to, and order
//! totals are plain sums of the rounded line values. Computations return
//! `None` when an amount leaves the `i64` range.

use std::collections::BTreeMap;

use common::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// VAT rates are percentages within `0..=100`.
pub fn is_valid_vat_rate(rate: Decimal) -> bool {
    rate >= Decimal::ZERO && rate <= Decimal::ONE_HUNDRED
}

/// A price reduction on a line or on the whole order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    None,
    /// Fixed amount off.
    Fixed(Money),
    /// Percentage of the amount it applies to.
    Percent(Decimal),
}

impl Discount {
    /// Amount taken off `base`, never negative and never more than `base`.
    pub fn amount_on(&self, base: Money) -> Money {
        let raw = match self {
            Discount::None => Money::ZERO,
            Discount::Fixed(amount) => *amount,
            Discount::Percent(rate) => base.percent(*rate),
        };
        raw.max(Money::ZERO).min(base.max(Money::ZERO))
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Discount::None => true,
            Discount::Fixed(amount) => !amount.is_negative(),
            Discount::Percent(rate) => *rate >= Decimal::ZERO && *rate <= Decimal::ONE_HUNDRED,
        }
    }
}

/// Computed amounts of one line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineAmounts {
    pub subtotal: Money,
    pub vat: Money,
    pub discount: Money,
    pub total: Money,
}

/// `subtotal = unit × qty`, `vat = subtotal × rate%`, discount applies to
/// `subtotal + vat`.
pub fn line_amounts(
    unit_price: Money,
    quantity: u32,
    vat_rate: Decimal,
    discount: Discount,
) -> Option<LineAmounts> {
    let subtotal = unit_price.checked_mul(quantity)?;
    let vat = subtotal.checked_percent(vat_rate)?;
    let gross = subtotal.checked_add(vat)?;
    let discount = discount.amount_on(gross);

    Some(LineAmounts {
        subtotal,
        vat,
        discount,
        total: gross.checked_sub(discount)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub items_subtotal: Money,
    pub vat_total: Money,
    /// Line discounts plus the order-level discount.
    pub discount_total: Money,
    pub shipping_cost: Money,
    pub grand_total: Money,
}

/// Aggregates line amounts into order totals.
///
/// `order_discount` applies to the sum of line totals and is capped by it.
pub fn order_totals(
    lines: &[LineAmounts],
    order_discount: Discount,
    shipping_cost: Money,
) -> Option<OrderTotals> {
    let items_subtotal = Money::checked_sum(lines.iter().map(|l| l.subtotal))?;
    let vat_total = Money::checked_sum(lines.iter().map(|l| l.vat))?;
    let line_discounts = Money::checked_sum(lines.iter().map(|l| l.discount))?;
    let lines_total = Money::checked_sum(lines.iter().map(|l| l.total))?;

    let order_discount = order_discount.amount_on(lines_total);
    let discount_total = line_discounts.checked_add(order_discount)?;
    let grand_total = items_subtotal
        .checked_add(vat_total)?
        .checked_sub(discount_total)?
        .checked_add(shipping_cost)?;

    Some(OrderTotals {
        items_subtotal,
        vat_total,
        discount_total,
        shipping_cost,
        grand_total,
    })
}

/// Flat shipping rates per delivery zone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingRates {
    pub default_rate: Money,
    #[serde(default)]
    pub zones: BTreeMap<String, Money>,
    /// Orders whose items total reaches this amount ship for free.
    #[serde(default)]
    pub free_shipping_threshold: Option<Money>,
}

impl ShippingRates {
    pub fn cost_for(&self, zone: Option<&str>, items_total: Money) -> Money {
        if let Some(threshold) = self.free_shipping_threshold
            && items_total >= threshold
        {
            return Money::ZERO;
        }

        zone.and_then(|z| self.zones.get(z))
            .copied()
            .unwrap_or(self.default_rate)
    }
}
