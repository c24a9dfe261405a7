//! Storefront back office domain.
//!
//! Three kinds of aggregate, each its own event stream:
//! - [`Sell`]: an order, with its priced lines, fulfilment status and a
//!   ledger of the payments made against it
//! - [`Payment`]: one payment and its lifecycle
//! - [`StockItem`]: on-hand quantity of one product variant
//!
//! Operations that touch more than one stream (placing an order, moving a
//! payment) stage an append per stream and commit them together through a
//! [`UnitOfWork`], retrying under a [`RetryPolicy`] when another writer got
//! there first.

pub mod aggregate;
pub mod command;
pub mod error;
pub mod payment;
pub mod pricing;
pub mod retry;
pub mod sell;
pub mod settings;
pub mod stock;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use command::{Command, CommandHandler, CommandResult, UnitOfWork};
pub use common::{AggregateId, CustomerId, Money, ProductId};
pub use error::DomainError;
pub use payment::{
    CreatePayment, Payment, PaymentError, PaymentEvent, PaymentMethod, PaymentService,
    PaymentState, Reconciliation,
};
pub use pricing::{Discount, LineAmounts, OrderTotals, ShippingRates};
pub use retry::RetryPolicy;
pub use sell::{
    LineRequest, OrderService, OrderStatus, PaymentStatus, PlaceOrder, Sell, SellDetail,
    SellError, SellEvent, ShippingStatus,
};
pub use settings::{
    JsonFileSettings, SettingsError, SettingsService, SettingsSource, StaticSettings,
    StoreSettings,
};
pub use stock::{StockError, StockEvent, StockItem, StockKey, StockService};
