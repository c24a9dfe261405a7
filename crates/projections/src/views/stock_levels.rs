//! Stock levels read model.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{StockEvent, StockKey};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::error::ProjectionError;
use crate::projection::Projection;
use crate::read_model::ReadModel;

#[derive(Debug, Clone, Serialize)]
pub struct StockLevel {
    pub key: StockKey,
    pub available: u32,
    /// Units taken by orders and not handed back.
    pub committed: u32,
    pub updated_at: DateTime<Utc>,
}

/// Available quantity per product variant.
#[derive(Clone)]
pub struct StockLevelsView {
    levels: Arc<RwLock<HashMap<AggregateId, StockLevel>>>,
}

impl StockLevelsView {
    pub fn new() -> Self {
        Self {
            levels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &StockKey) -> Option<StockLevel> {
        self.levels.read().await.get(&key.stream_id()).cloned()
    }

    /// Every level, ordered by key.
    pub async fn all(&self) -> Vec<StockLevel> {
        let mut levels: Vec<_> = self.levels.read().await.values().cloned().collect();
        levels.sort_by(|a, b| a.key.cmp(&b.key));
        levels
    }

    /// Levels at or below `threshold`, lowest first.
    pub async fn low_stock(&self, threshold: u32) -> Vec<StockLevel> {
        let mut low: Vec<_> = self
            .levels
            .read()
            .await
            .values()
            .filter(|l| l.available <= threshold)
            .cloned()
            .collect();
        low.sort_by(|a, b| a.available.cmp(&b.available).then_with(|| a.key.cmp(&b.key)));
        low
    }
}

impl Default for StockLevelsView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for StockLevelsView {
    fn name(&self) -> &'static str {
        "StockLevelsView"
    }

    fn subscribes_to(&self) -> &'static [&'static str] {
        &["Stock"]
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let stock_event: StockEvent = event.decode()?;
        let stock_id = event.aggregate_id;
        let mut levels = self.levels.write().await;

        if let StockEvent::StockRegistered(data) = stock_event {
            levels.insert(
                stock_id,
                StockLevel {
                    key: data.key,
                    available: data.quantity,
                    committed: 0,
                    updated_at: data.registered_at,
                },
            );
            return Ok(());
        }

        let level = levels
            .get_mut(&stock_id)
            .ok_or(ProjectionError::MissingRecord {
                view: "StockLevelsView",
                aggregate_id: stock_id,
            })?;
        match stock_event {
            StockEvent::StockRegistered(_) => {}
            StockEvent::StockRestocked(data) => {
                level.available = level.available.saturating_add(data.quantity);
                level.updated_at = data.restocked_at;
            }
            StockEvent::StockAdjusted(data) => {
                level.available = data.quantity;
                level.updated_at = data.adjusted_at;
            }
            StockEvent::StockDeducted(data) => {
                level.available = level.available.saturating_sub(data.quantity);
                level.committed = level.committed.saturating_add(data.quantity);
                level.updated_at = data.deducted_at;
            }
            StockEvent::StockReleased(data) => {
                level.available = level.available.saturating_add(data.quantity);
                level.committed = level.committed.saturating_sub(data.quantity);
                level.updated_at = data.released_at;
            }
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.levels.write().await.clear();
        Ok(())
    }
}

impl ReadModel for StockLevelsView {
    fn name(&self) -> &'static str {
        "StockLevelsView"
    }

    fn count(&self) -> usize {
        self.levels.try_read().map(|l| l.len()).unwrap_or(0)
    }
}
