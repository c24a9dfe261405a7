//! Event storage for the storefront.
//!
//! Every aggregate (a sell, a payment, a stock item) is one stream of events.
//! Writers state the version they expect each stream to be at; a mismatch is
//! reported as [`EventStoreError::ConcurrencyConflict`] and nothing is written.
//! [`EventStore::append_streams`] extends this to several streams at once so a
//! payment and the order it pays for move together or not at all.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{
    AppendOptions, EventStore, EventStoreExt, EventStream, RecordedEvent, RecordedEventStream,
    StreamAppend,
};
