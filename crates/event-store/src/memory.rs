use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, Result, Snapshot, Version,
    store::{
        EventStore, RecordedEvent, RecordedEventStream, StreamAppend, check_stream_head,
        validate_appends,
    },
};

#[derive(Default)]
struct Log {
    /// Commit order across all streams. An event's position is its index + 1.
    events: Vec<EventEnvelope>,
    heads: HashMap<AggregateId, Version>,
}

/// Event store held in process memory.
///
/// Backs the test suites and the server when no database is configured.
/// A single write lock covers the version checks and the writes of a commit,
/// so concurrent `append_streams` calls are serialized.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, Snapshot>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    pub async fn clear(&self) {
        let mut log = self.log.write().await;
        log.events.clear();
        log.heads.clear();
        self.snapshots.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_streams(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_appends(&appends)?;

        let mut log = self.log.write().await;

        for append in &appends {
            let current = log
                .heads
                .get(&append.aggregate_id)
                .copied()
                .unwrap_or(Version::initial());
            check_stream_head(append, current)?;
        }

        let mut versions = Vec::with_capacity(appends.len());
        for append in appends {
            let head = append.resulting_version().unwrap_or(Version::initial());
            log.heads.insert(append.aggregate_id, head);
            log.events.extend(append.events);
            versions.push(head);
        }

        Ok(versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.get_events_for_aggregate_from_version(aggregate_id, Version::first())
            .await
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        // Versions within a stream are committed in order, so the log order
        // is already version order.
        Ok(log
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.version >= from_version)
            .cloned()
            .collect())
    }

    async fn stream_events_after(&self, position: u64) -> Result<RecordedEventStream> {
        use futures_util::stream;

        let skip = usize::try_from(position).unwrap_or(usize::MAX);
        let recorded: Vec<RecordedEvent> = self
            .log
            .read()
            .await
            .events
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(index, event)| RecordedEvent {
                position: index as u64 + 1,
                event: event.clone(),
            })
            .collect();
        Ok(Box::pin(stream::iter(recorded.into_iter().map(Ok))))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.log.read().await.heads.get(&aggregate_id).copied())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.aggregate_id, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.read().await.get(&aggregate_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppendOptions, EventStoreError};

    fn event(aggregate_id: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Sell")
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"test": true}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn append_and_read_back() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let version = store
            .append(
                vec![event(id, 1, "SellPlaced"), event(id, 2, "OrderStatusChanged")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();
        assert_eq!(version, Version::new(2));

        let events = store.get_events_for_aggregate(id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, "OrderStatusChanged");
        assert_eq!(
            store.get_aggregate_version(id).await.unwrap(),
            Some(Version::new(2))
        );
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        store
            .append(vec![event(id, 1, "SellPlaced")], AppendOptions::expect_new())
            .await
            .unwrap();

        let result = store
            .append(
                vec![event(id, 2, "PaymentReconciled")],
                AppendOptions::expect_version(Version::initial()),
            )
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { actual, .. }) if actual == Version::first()
        ));
    }

    #[tokio::test]
    async fn multi_stream_commit_is_all_or_nothing() {
        let store = InMemoryEventStore::new();
        let sell = AggregateId::new();
        let payment = AggregateId::new();

        store
            .append(vec![event(sell, 1, "SellPlaced")], AppendOptions::expect_new())
            .await
            .unwrap();

        // The sell stream expectation is stale, so the payment must not land either.
        let result = store
            .append_streams(vec![
                StreamAppend::new(
                    payment,
                    Some(Version::initial()),
                    vec![event(payment, 1, "PaymentCreated")],
                ),
                StreamAppend::new(
                    sell,
                    Some(Version::initial()),
                    vec![event(sell, 1, "PaymentReconciled")],
                ),
            ])
            .await;

        assert!(result.unwrap_err().is_conflict());
        assert!(store.get_events_for_aggregate(payment).await.unwrap().is_empty());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn multi_stream_commit_returns_each_head() {
        let store = InMemoryEventStore::new();
        let sell = AggregateId::new();
        let payment = AggregateId::new();

        store
            .append(vec![event(sell, 1, "SellPlaced")], AppendOptions::expect_new())
            .await
            .unwrap();

        let versions = store
            .append_streams(vec![
                StreamAppend::new(
                    payment,
                    Some(Version::initial()),
                    vec![event(payment, 1, "PaymentCreated")],
                ),
                StreamAppend::new(
                    sell,
                    Some(Version::first()),
                    vec![event(sell, 2, "PaymentReconciled")],
                ),
            ])
            .await
            .unwrap();

        assert_eq!(versions, vec![Version::first(), Version::new(2)]);
    }

    #[tokio::test]
    async fn concurrent_writers_on_one_stream_cannot_both_win() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, 1, "SellPlaced")], AppendOptions::expect_new())
            .await
            .unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .append(
                        vec![event(id, 2, "PaymentReconciled")],
                        AppendOptions::expect_version(Version::first()),
                    )
                    .await
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .append(
                        vec![event(id, 2, "PaymentReconciled")],
                        AppendOptions::expect_version(Version::first()),
                    )
                    .await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn read_from_version() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(
                vec![event(id, 1, "A"), event(id, 2, "B"), event(id, 3, "C")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let tail = store
            .get_events_for_aggregate_from_version(id, Version::new(2))
            .await
            .unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].version, Version::new(2));
    }

    #[tokio::test]
    async fn stream_all_keeps_commit_order() {
        use futures_util::StreamExt;

        let store = InMemoryEventStore::new();
        let first = AggregateId::new();
        let second = AggregateId::new();

        store
            .append(vec![event(second, 1, "B1")], AppendOptions::new())
            .await
            .unwrap();
        store
            .append(vec![event(first, 1, "A1")], AppendOptions::new())
            .await
            .unwrap();
        store
            .append(vec![event(second, 2, "B2")], AppendOptions::new())
            .await
            .unwrap();

        let types: Vec<String> = store
            .stream_all_events()
            .await
            .unwrap()
            .map(|e| e.unwrap().event_type)
            .collect()
            .await;
        assert_eq!(types, vec!["B1", "A1", "B2"]);
    }

    #[tokio::test]
    async fn snapshots_replace_and_clear() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        assert!(store.get_snapshot(id).await.unwrap().is_none());

        store
            .save_snapshot(Snapshot::new(id, "Sell", Version::new(3), serde_json::json!({})))
            .await
            .unwrap();
        store
            .save_snapshot(Snapshot::new(id, "Sell", Version::new(6), serde_json::json!({})))
            .await
            .unwrap();

        let snap = store.get_snapshot(id).await.unwrap().unwrap();
        assert_eq!(snap.version, Version::new(6));

        store.clear().await;
        assert!(store.get_snapshot(id).await.unwrap().is_none());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn read_after_position_resumes_where_the_reader_stopped() {
        use futures_util::StreamExt;

        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store
            .append(vec![event(a, 1, "A1"), event(a, 2, "A2")], AppendOptions::new())
            .await
            .unwrap();

        let first: Vec<RecordedEvent> = store
            .stream_events_after(0)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(first.iter().map(|r| r.position).collect::<Vec<_>>(), [1, 2]);

        store
            .append(vec![event(b, 1, "B1")], AppendOptions::new())
            .await
            .unwrap();
        let rest: Vec<RecordedEvent> = store
            .stream_events_after(2)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].position, 3);
        assert_eq!(rest[0].event.event_type, "B1");
        assert!(store.stream_events_after(3).await.unwrap().next().await.is_none());
    }
}
