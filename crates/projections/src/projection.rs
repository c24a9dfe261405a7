//! The projection trait.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// Folds stored events into a read model.
///
/// The [`ProjectionProcessor`](crate::ProjectionProcessor) tracks how far
/// each projection has read and only hands it events of the aggregate types
/// it subscribes to.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Aggregate types whose events this projection reads, e.g. `["Sell"]`.
    fn subscribes_to(&self) -> &'static [&'static str];

    fn wants(&self, event: &EventEnvelope) -> bool {
        self.subscribes_to().contains(&event.aggregate_type.as_str())
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Drops everything the projection has built.
    async fn reset(&self) -> Result<()>;
}
