use std::collections::HashSet;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version};

/// Concurrency expectations for a single-stream append.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Version the stream must be at. `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// No version check.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// The stream must not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// New events for one stream, part of a possibly multi-stream commit.
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub aggregate_id: AggregateId,
    pub expected_version: Option<Version>,
    pub events: Vec<EventEnvelope>,
}

impl StreamAppend {
    pub fn new(
        aggregate_id: AggregateId,
        expected_version: Option<Version>,
        events: Vec<EventEnvelope>,
    ) -> Self {
        Self {
            aggregate_id,
            expected_version,
            events,
        }
    }

    /// Version the stream will be at once this append is committed.
    pub fn resulting_version(&self) -> Option<Version> {
        self.events.last().map(|e| e.version)
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// An event read back from the global log.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// Position in the global log. Increases in commit order and may skip
    /// values.
    pub position: u64,
    pub event: EventEnvelope,
}

pub type RecordedEventStream = Pin<Box<dyn Stream<Item = Result<RecordedEvent>> + Send>>;

/// Persistence for event streams.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to a single stream and returns its new version.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let aggregate_id = events
            .first()
            .map(|e| e.aggregate_id)
            .ok_or_else(|| EventStoreError::InvalidAppend("empty event list".to_string()))?;

        let versions = self
            .append_streams(vec![StreamAppend::new(
                aggregate_id,
                options.expected_version,
                events,
            )])
            .await?;

        versions
            .into_iter()
            .next()
            .ok_or_else(|| EventStoreError::InvalidAppend("no stream was written".to_string()))
    }

    /// Appends to several streams in one all-or-nothing commit.
    ///
    /// Every expected version is checked before anything is written; one
    /// mismatch fails the whole batch with `ConcurrencyConflict`. Returns the
    /// new version of each stream, in the order given.
    async fn append_streams(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>>;

    /// All events of one stream, oldest first.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Events committed after `position`, in position order.
    ///
    /// Positions are handed out in commit order: once a reader has seen a
    /// position, no event with a lower one becomes visible later. A reader
    /// can therefore keep the last position it handled and resume after it.
    async fn stream_events_after(&self, position: u64) -> Result<RecordedEventStream>;

    /// Every stored event in commit order.
    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::StreamExt;

        let recorded = self.stream_events_after(0).await?;
        Ok(Box::pin(recorded.map(|r| r.map(|r| r.event))))
    }

    /// `None` if the stream has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Stores a snapshot, replacing any earlier one for the same stream.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn append_event(&self, event: EventEnvelope, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }

    /// Latest snapshot (if any) plus the events recorded after it.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        match self.get_snapshot(aggregate_id).await? {
            Some(snapshot) => {
                let events = self
                    .get_events_for_aggregate_from_version(aggregate_id, snapshot.version.next())
                    .await?;
                Ok((Some(snapshot), events))
            }
            None => Ok((None, self.get_events_for_aggregate(aggregate_id).await?)),
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks a multi-stream batch for shape errors before any version lookup.
///
/// Each stream may appear once, must carry at least one event, and its
/// events must belong to it with consecutive versions.
pub fn validate_appends(appends: &[StreamAppend]) -> Result<()> {
    if appends.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "no streams to append".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(appends.len());
    for append in appends {
        if !seen.insert(append.aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} appears twice in one commit",
                append.aggregate_id
            )));
        }
        validate_stream_events(append.aggregate_id, &append.events)?;
    }

    Ok(())
}

fn validate_stream_events(aggregate_id: AggregateId, events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(format!(
            "stream {aggregate_id} has no events"
        )));
    };

    let mut expected = first.version;
    for (i, event) in events.iter().enumerate() {
        if event.aggregate_id != aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {} belongs to {}, not {aggregate_id}",
                event.event_id, event.aggregate_id
            )));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::InvalidAppend(format!(
                "mixed aggregate types in stream {aggregate_id}"
            )));
        }
        if i > 0 {
            expected = expected.next();
            if event.version != expected {
                return Err(EventStoreError::InvalidAppend(format!(
                    "versions must be consecutive: expected {expected}, got {}",
                    event.version
                )));
            }
        }
    }

    Ok(())
}

/// Checks that the first event of `append` follows directly on `current`.
pub(crate) fn check_stream_head(append: &StreamAppend, current: Version) -> Result<()> {
    if let Some(expected) = append.expected_version
        && expected != current
    {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id: append.aggregate_id,
            expected,
            actual: current,
        });
    }

    if let Some(first) = append.events.first()
        && first.version != current.next()
    {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id: append.aggregate_id,
            expected: append
                .expected_version
                .unwrap_or(Version::new(first.version.as_i64() - 1)),
            actual: current,
        });
    }

    Ok(())
}
