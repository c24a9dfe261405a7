//! Stock administration.

use event_store::EventStore;

use crate::command::CommandHandler;
use crate::error::DomainError;
use crate::retry::RetryPolicy;

use super::{StockError, StockItem, StockKey};

/// Registers products and keeps their on-hand levels.
///
/// Order placement and cancellation move stock through `OrderService`, which
/// commits the movement together with the order.
pub struct StockService<S: EventStore> {
    handler: CommandHandler<S, StockItem>,
}

impl<S: EventStore> StockService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.handler = self.handler.with_retry(retry);
        self
    }

    #[tracing::instrument(skip(self, key), fields(key = %key))]
    pub async fn register_product(
        &self,
        key: StockKey,
        quantity: u32,
    ) -> Result<StockItem, DomainError> {
        let result = self
            .handler
            .execute(key.stream_id(), |item| item.register(key.clone(), quantity))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to register stock"))?;
        tracing::info!(quantity, "stock registered");
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self, key), fields(key = %key))]
    pub async fn restock(
        &self,
        key: StockKey,
        quantity: u32,
        note: Option<String>,
    ) -> Result<StockItem, DomainError> {
        let result = self
            .handler
            .execute_existing(key.stream_id(), |item| item.restock(quantity, note.clone()))
            .await
            .map_err(|e| not_registered(e, &key))?;
        Ok(result.aggregate)
    }

    /// Admin correction to an absolute level.
    #[tracing::instrument(skip(self, key), fields(key = %key))]
    pub async fn set_level(&self, key: StockKey, quantity: u32) -> Result<StockItem, DomainError> {
        let result = self
            .handler
            .execute_existing(key.stream_id(), |item| item.set_level(quantity))
            .await
            .map_err(|e| not_registered(e, &key))?;
        Ok(result.aggregate)
    }

    pub async fn get_stock(&self, key: &StockKey) -> Result<Option<StockItem>, DomainError> {
        self.handler.load_existing(key.stream_id()).await
    }
}

fn not_registered(error: DomainError, key: &StockKey) -> DomainError {
    match error {
        DomainError::AggregateNotFound { .. } => {
            DomainError::Stock(StockError::NotRegistered { key: key.clone() })
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_store::InMemoryEventStore;

    #[tokio::test]
    async fn register_restock_and_adjust() {
        let service = StockService::new(InMemoryEventStore::new());
        let key = StockKey::new("SHOE", Some("42".to_string()));

        service.register_product(key.clone(), 3).await.unwrap();
        service.restock(key.clone(), 7, None).await.unwrap();
        let item = service.set_level(key.clone(), 8).await.unwrap();
        assert_eq!(item.available(), 8);

        let loaded = service.get_stock(&key).await.unwrap().unwrap();
        assert_eq!(loaded.available(), 8);
    }

    #[tokio::test]
    async fn restock_of_unknown_key_is_not_registered() {
        let service = StockService::new(InMemoryEventStore::new());
        let err = service
            .restock(StockKey::product("GHOST"), 1, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Stock(StockError::NotRegistered { .. })
        ));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let service = StockService::new(InMemoryEventStore::new());
        let key = StockKey::product("MUG");
        service.register_product(key.clone(), 1).await.unwrap();
        assert!(matches!(
            service.register_product(key, 1).await,
            Err(DomainError::Stock(StockError::AlreadyRegistered { .. }))
        ));
    }
}
