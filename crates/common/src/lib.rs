//! Shared identifiers and the [`Money`] type.

mod ids;
mod money;

pub use ids::{AggregateId, CustomerId, ProductId};
pub use money::Money;
