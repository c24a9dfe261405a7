//! Services and read models shared by the handlers.

use std::sync::Arc;

use domain::{
    OrderService, PaymentService, RetryPolicy, SettingsService, StockService, StoreSettings,
};
use event_store::EventStore;
use projections::{
    PaymentsView, Projection, ProjectionProcessor, ReadModel, SalesView, StockLevelsView,
};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub orders: OrderService<S>,
    pub payments: PaymentService<S>,
    pub stock: StockService<S>,
    pub settings: Arc<SettingsService>,
    pub sales: SalesView,
    pub payment_rows: PaymentsView,
    pub stock_levels: StockLevelsView,
    pub event_store: S,
    pub projection_processor: Arc<ProjectionProcessor<S>>,
}

impl<S: EventStore + Clone + 'static> AppState<S> {
    /// Wires the services and views over one store.
    pub fn new(event_store: S, settings: Arc<SettingsService>, retry: RetryPolicy) -> Self {
        let sales = SalesView::new();
        let payment_rows = PaymentsView::new();
        let stock_levels = StockLevelsView::new();

        let mut processor = ProjectionProcessor::new(event_store.clone());
        processor.register(Box::new(sales.clone()) as Box<dyn Projection>);
        processor.register(Box::new(payment_rows.clone()));
        processor.register(Box::new(stock_levels.clone()));

        Self {
            orders: OrderService::new(event_store.clone(), Arc::clone(&settings)).with_retry(retry),
            payments: PaymentService::new(event_store.clone()).with_retry(retry),
            stock: StockService::new(event_store.clone()).with_retry(retry),
            settings,
            sales,
            payment_rows,
            stock_levels,
            event_store,
            projection_processor: Arc::new(processor),
        }
    }

    /// Brings the read models up to date before a listing is served.
    pub async fn catch_up(&self) -> Result<(), ApiError> {
        self.projection_processor.run_catch_up().await?;
        Ok(())
    }

    pub fn read_models(&self) -> [&dyn ReadModel; 3] {
        [&self.sales, &self.payment_rows, &self.stock_levels]
    }
}

/// State over built-in store settings and the default retry policy.
pub fn create_default_state<S: EventStore + Clone + 'static>(event_store: S) -> Arc<AppState<S>> {
    let settings = Arc::new(SettingsService::fixed(StoreSettings::default()));
    Arc::new(AppState::new(event_store, settings, RetryPolicy::default()))
}
