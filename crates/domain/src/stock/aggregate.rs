//! Stock item aggregate.

use std::collections::BTreeMap;

use common::{AggregateId, ProductId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::{StockError, StockEvent};

/// A sellable unit: a product, optionally narrowed to one variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl StockKey {
    pub fn new(product_id: impl Into<ProductId>, variant: Option<String>) -> Self {
        Self {
            product_id: product_id.into(),
            variant: variant.filter(|v| !v.is_empty()),
        }
    }

    pub fn product(product_id: impl Into<ProductId>) -> Self {
        Self::new(product_id, None)
    }

    /// Stream id of this key's stock item, derived from the key itself.
    pub fn stream_id(&self) -> AggregateId {
        AggregateId::from_name("stock", &self.to_string())
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}/{}", self.product_id, variant),
            None => write!(f, "{}", self.product_id),
        }
    }
}

/// On-hand quantity of one [`StockKey`], plus what each order has taken.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockItem {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    key: Option<StockKey>,

    available: u32,

    /// Quantities deducted per order and not yet released.
    held: BTreeMap<AggregateId, u32>,
}

impl Aggregate for StockItem {
    type Event = StockEvent;
    type Error = StockError;

    fn aggregate_type() -> &'static str {
        "Stock"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            StockEvent::StockRegistered(data) => {
                self.id = Some(data.stock_id);
                self.key = Some(data.key);
                self.available = data.quantity;
            }
            StockEvent::StockRestocked(data) => {
                self.available = self.available.saturating_add(data.quantity);
            }
            StockEvent::StockAdjusted(data) => {
                self.available = data.quantity;
            }
            StockEvent::StockDeducted(data) => {
                self.available = self.available.saturating_sub(data.quantity);
                *self.held.entry(data.sell_id).or_default() += data.quantity;
            }
            StockEvent::StockReleased(data) => {
                self.available = self.available.saturating_add(data.quantity);
                if let Some(held) = self.held.get_mut(&data.sell_id) {
                    *held = held.saturating_sub(data.quantity);
                    if *held == 0 {
                        self.held.remove(&data.sell_id);
                    }
                }
            }
        }
    }
}

impl SnapshotCapable for StockItem {
    fn snapshot_interval() -> usize {
        200
    }
}

// Queries
impl StockItem {
    pub fn key(&self) -> Option<&StockKey> {
        self.key.as_ref()
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    /// Quantity `sell_id` currently holds.
    pub fn held_by(&self, sell_id: AggregateId) -> u32 {
        self.held.get(&sell_id).copied().unwrap_or(0)
    }

    pub fn can_fulfil(&self, quantity: u32) -> bool {
        quantity <= self.available
    }

    fn require_key(&self) -> Result<&StockKey, StockError> {
        self.key.as_ref().ok_or_else(|| StockError::NotRegistered {
            key: StockKey::product("<unknown>"),
        })
    }
}

// Commands
impl StockItem {
    pub fn register(&self, key: StockKey, quantity: u32) -> Result<Vec<StockEvent>, StockError> {
        if self.id.is_some() {
            return Err(StockError::AlreadyRegistered { key });
        }
        Ok(vec![StockEvent::registered(key.stream_id(), key, quantity)])
    }

    pub fn restock(&self, quantity: u32, note: Option<String>) -> Result<Vec<StockEvent>, StockError> {
        self.require_key()?;
        if quantity == 0 {
            return Err(StockError::InvalidQuantity { quantity });
        }
        Ok(vec![StockEvent::restocked(quantity, note)])
    }

    /// Sets the on-hand level outright. Unchanged levels record nothing.
    pub fn set_level(&self, quantity: u32) -> Result<Vec<StockEvent>, StockError> {
        self.require_key()?;
        if quantity == self.available {
            return Ok(vec![]);
        }
        Ok(vec![StockEvent::adjusted(self.available, quantity)])
    }

    pub fn deduct(&self, quantity: u32, sell_id: AggregateId) -> Result<Vec<StockEvent>, StockError> {
        let key = self.require_key()?;
        if quantity == 0 {
            return Err(StockError::InvalidQuantity { quantity });
        }
        if !self.can_fulfil(quantity) {
            return Err(StockError::InsufficientStock {
                key: key.clone(),
                requested: quantity,
                available: self.available,
            });
        }
        Ok(vec![StockEvent::deducted(quantity, sell_id)])
    }

    /// Returns up to what `sell_id` holds.
    pub fn release(&self, quantity: u32, sell_id: AggregateId) -> Result<Vec<StockEvent>, StockError> {
        let key = self.require_key()?;
        if quantity == 0 {
            return Err(StockError::InvalidQuantity { quantity });
        }
        if self.held_by(sell_id) < quantity {
            return Err(StockError::NothingToRelease {
                key: key.clone(),
                sell_id,
            });
        }
        Ok(vec![StockEvent::released(quantity, sell_id)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(quantity: u32) -> StockItem {
        let key = StockKey::new("TSHIRT", Some("red-m".to_string()));
        let mut item = StockItem::default();
        item.apply_events(item.register(key, quantity).unwrap());
        item
    }

    #[test]
    fn key_display_and_stream_id() {
        let plain = StockKey::product("MUG");
        let variant = StockKey::new("TSHIRT", Some("red-m".to_string()));
        assert_eq!(plain.to_string(), "MUG");
        assert_eq!(variant.to_string(), "TSHIRT/red-m");
        assert_eq!(StockKey::new("MUG", Some(String::new())), plain);
        assert_eq!(variant.stream_id(), StockKey::new("TSHIRT", Some("red-m".into())).stream_id());
        assert_ne!(plain.stream_id(), variant.stream_id());
    }

    #[test]
    fn register_sets_level_and_id() {
        let item = registered(10);
        assert_eq!(item.available(), 10);
        assert_eq!(item.id(), Some(item.key().unwrap().stream_id()));
    }

    #[test]
    fn cannot_register_twice() {
        let item = registered(1);
        assert!(matches!(
            item.register(StockKey::product("X"), 1),
            Err(StockError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn unregistered_item_rejects_commands() {
        let item = StockItem::default();
        assert!(matches!(item.restock(1, None), Err(StockError::NotRegistered { .. })));
        assert!(matches!(
            item.deduct(1, AggregateId::new()),
            Err(StockError::NotRegistered { .. })
        ));
    }

    #[test]
    fn deduct_beyond_available_fails() {
        let item = registered(2);
        let err = item.deduct(3, AggregateId::new()).unwrap_err();
        assert!(matches!(
            err,
            StockError::InsufficientStock { requested: 3, available: 2, .. }
        ));
    }

    #[test]
    fn deduct_then_release_restores_level() {
        let sell = AggregateId::new();
        let mut item = registered(5);

        item.apply_events(item.deduct(3, sell).unwrap());
        assert_eq!(item.available(), 2);
        assert_eq!(item.held_by(sell), 3);

        item.apply_events(item.release(3, sell).unwrap());
        assert_eq!(item.available(), 5);
        assert_eq!(item.held_by(sell), 0);
    }

    #[test]
    fn cannot_release_more_than_held() {
        let sell = AggregateId::new();
        let mut item = registered(5);
        item.apply_events(item.deduct(1, sell).unwrap());

        assert!(matches!(
            item.release(2, sell),
            Err(StockError::NothingToRelease { .. })
        ));
        assert!(item.release(1, AggregateId::new()).is_err());
    }

    #[test]
    fn restock_and_set_level() {
        let mut item = registered(1);
        item.apply_events(item.restock(4, Some("supplier delivery".into())).unwrap());
        assert_eq!(item.available(), 5);

        item.apply_events(item.set_level(2).unwrap());
        assert_eq!(item.available(), 2);
        assert!(item.set_level(2).unwrap().is_empty());
        assert!(matches!(item.restock(0, None), Err(StockError::InvalidQuantity { .. })));
    }
}
