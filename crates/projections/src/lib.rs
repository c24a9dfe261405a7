//! Query side of the back office.
//!
//! - [`Projection`] folds stored events into a read model
//! - [`ReadModel`] exposes a view for health reporting
//! - [`ProjectionProcessor`] feeds events from the store to projections
//! - three views: sales, payments and stock levels

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::Projection;
pub use read_model::ReadModel;
pub use views::{
    PaymentSummary, PaymentsView, SaleSummary, SalesFilter, SalesView, StockLevel,
    StockLevelsView,
};
