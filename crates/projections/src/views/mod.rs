//! Read model views.

pub mod payments;
pub mod sales;
pub mod stock_levels;

pub use payments::{PaymentSummary, PaymentsView};
pub use sales::{SaleSummary, SalesFilter, SalesView};
pub use stock_levels::{StockLevel, StockLevelsView};
