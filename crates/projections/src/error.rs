//! Projection error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An event arrived for a record the view has never seen.
    #[error("{view}: no record for {aggregate_id}")]
    MissingRecord {
        view: &'static str,
        aggregate_id: common::AggregateId,
    },
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
