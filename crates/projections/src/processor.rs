//! Feeds stored events to projections.

use event_store::{EventEnvelope, EventStore, RecordedEvent};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Delivers events from a store to registered projections.
///
/// - catch-up: reads the events committed after the oldest projection cursor
///   and hands each projection the ones past its own cursor
/// - single event: pushes one freshly committed event to all projections
/// - rebuild: resets every projection and replays from the start
///
/// Cursors hold the last global position a projection has dealt with, so a
/// catch-up only reads the tail of the log. Catch-up runs are serialised, so
/// two requests catching up at the same time never apply an event twice.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    /// Last position handled, per projection (same order as `projections`).
    cursors: Mutex<Vec<u64>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            cursors: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
        self.cursors.get_mut().push(0);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Brings every projection up to the end of the store.
    ///
    /// Returns the number of events delivered. A failing projection keeps its
    /// cursor before the failed event, so the next run retries from there.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut cursors = self.cursors.lock().await;
        let Some(&from) = cursors.iter().min() else {
            return Ok(0);
        };

        let mut stream = self.store.stream_events_after(from).await?;
        let mut read: u64 = 0;
        let mut delivered: u64 = 0;

        while let Some(recorded) = stream.next().await {
            let RecordedEvent { position, event } = recorded?;
            read += 1;

            for (projection, cursor) in self.projections.iter().zip(cursors.iter_mut()) {
                if position <= *cursor {
                    continue;
                }
                if projection.wants(&event) {
                    projection.handle(&event).await.inspect_err(|e| {
                        tracing::error!(
                            projection = projection.name(),
                            position,
                            event_type = %event.event_type,
                            error = %e,
                            "projection failed"
                        );
                    })?;
                    delivered += 1;
                    metrics::counter!("projections_events_processed", "projection" => projection.name())
                        .increment(1);
                }
                *cursor = position;
            }
        }

        if delivered > 0 {
            tracing::debug!(from, events_read = read, delivered, "catch-up complete");
        }
        Ok(delivered)
    }

    /// Delivers one event to every projection that wants it.
    ///
    /// The event does not move catch-up cursors, so use this only for
    /// projections that are not also caught up from the store.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            if projection.wants(event) {
                projection.handle(event).await?;
            }
        }
        Ok(())
    }

    /// Resets every projection and replays the whole store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        {
            let mut cursors = self.cursors.lock().await;
            for (projection, cursor) in self.projections.iter().zip(cursors.iter_mut()) {
                projection.reset().await?;
                *cursor = 0;
            }
        }
        tracing::info!(projections = self.projections.len(), "rebuilding projections");
        self.run_catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{
        AppendOptions, InMemoryEventStore, RecordedEventStream, Snapshot, StreamAppend, Version,
    };
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    /// Counts the events of one aggregate type.
    struct Counter {
        aggregate_type: &'static [&'static str],
        seen: Arc<AtomicU64>,
    }

    impl Counter {
        fn new(aggregate_type: &'static [&'static str]) -> (Self, Arc<AtomicU64>) {
            let seen = Arc::new(AtomicU64::new(0));
            (
                Self {
                    aggregate_type,
                    seen: Arc::clone(&seen),
                },
                seen,
            )
        }
    }

    #[async_trait]
    impl Projection for Counter {
        fn name(&self) -> &'static str {
            "Counter"
        }

        fn subscribes_to(&self) -> &'static [&'static str] {
            self.aggregate_type
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reset(&self) -> Result<()> {
            self.seen.store(0, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Records the version of every event it handles, failing once on
    /// `fail_on` when armed.
    struct Recorder {
        handled: Arc<StdMutex<Vec<i64>>>,
        fail_on: i64,
        armed: AtomicBool,
    }

    impl Recorder {
        fn new(fail_on: Option<i64>) -> (Self, Arc<StdMutex<Vec<i64>>>) {
            let handled = Arc::new(StdMutex::new(Vec::new()));
            (
                Self {
                    handled: Arc::clone(&handled),
                    fail_on: fail_on.unwrap_or(-1),
                    armed: AtomicBool::new(fail_on.is_some()),
                },
                handled,
            )
        }
    }

    #[async_trait]
    impl Projection for Recorder {
        fn name(&self) -> &'static str {
            "Recorder"
        }

        fn subscribes_to(&self) -> &'static [&'static str] {
            &["Sell", "Stock"]
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<()> {
            let version = event.version.as_i64();
            if version == self.fail_on && self.armed.swap(false, Ordering::SeqCst) {
                return Err(crate::ProjectionError::MissingRecord {
                    view: "Recorder",
                    aggregate_id: event.aggregate_id,
                });
            }
            self.handled.lock().unwrap().push(version);
            Ok(())
        }

        async fn reset(&self) -> Result<()> {
            self.handled.lock().unwrap().clear();
            Ok(())
        }
    }

    /// Answers each read with the next scripted batch, whatever position was
    /// asked for, and remembers the positions asked for.
    struct ScriptedStore {
        batches: StdMutex<VecDeque<Vec<RecordedEvent>>>,
        reads_after: Arc<StdMutex<Vec<u64>>>,
    }

    impl ScriptedStore {
        fn new(batches: Vec<Vec<(u64, i64)>>) -> Self {
            let aggregate_id = AggregateId::new();
            let batches = batches
                .into_iter()
                .map(|batch| {
                    batch
                        .into_iter()
                        .map(|(position, version)| RecordedEvent {
                            position,
                            event: event(aggregate_id, "Sell", version),
                        })
                        .collect()
                })
                .collect();
            Self {
                batches: StdMutex::new(batches),
                reads_after: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl EventStore for ScriptedStore {
        async fn append_streams(
            &self,
            _appends: Vec<StreamAppend>,
        ) -> event_store::Result<Vec<Version>> {
            unimplemented!("read-only store")
        }

        async fn get_events_for_aggregate(
            &self,
            _aggregate_id: AggregateId,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            Ok(Vec::new())
        }

        async fn get_events_for_aggregate_from_version(
            &self,
            _aggregate_id: AggregateId,
            _from_version: Version,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            Ok(Vec::new())
        }

        async fn stream_events_after(
            &self,
            position: u64,
        ) -> event_store::Result<RecordedEventStream> {
            self.reads_after.lock().unwrap().push(position);
            let batch = self.batches.lock().unwrap().pop_front().unwrap_or_default();
            Ok(Box::pin(futures_util::stream::iter(batch.into_iter().map(Ok))))
        }

        async fn get_aggregate_version(
            &self,
            _aggregate_id: AggregateId,
        ) -> event_store::Result<Option<Version>> {
            Ok(None)
        }

        async fn save_snapshot(&self, _snapshot: Snapshot) -> event_store::Result<()> {
            Ok(())
        }

        async fn get_snapshot(
            &self,
            _aggregate_id: AggregateId,
        ) -> event_store::Result<Option<Snapshot>> {
            Ok(None)
        }
    }

    fn event(aggregate_id: AggregateId, aggregate_type: &str, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(aggregate_type)
            .event_type("Test")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    async fn seeded() -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let sell = AggregateId::new();
        let stock = AggregateId::new();
        store
            .append(vec![event(sell, "Sell", 1), event(sell, "Sell", 2)], AppendOptions::new())
            .await
            .unwrap();
        store
            .append(vec![event(stock, "Stock", 1)], AppendOptions::new())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn catch_up_delivers_subscribed_events_once() {
        let (sells, sells_seen) = Counter::new(&["Sell"]);
        let (stock, stock_seen) = Counter::new(&["Stock"]);
        let mut processor = ProjectionProcessor::new(seeded().await);
        processor.register(Box::new(sells));
        processor.register(Box::new(stock));

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(sells_seen.load(Ordering::SeqCst), 2);
        assert_eq!(stock_seen.load(Ordering::SeqCst), 1);

        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(sells_seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn catch_up_picks_up_new_events() {
        let store = seeded().await;
        let (sells, seen) = Counter::new(&["Sell"]);
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(sells));
        processor.run_catch_up().await.unwrap();

        store
            .append(vec![event(AggregateId::new(), "Sell", 1)], AppendOptions::new())
            .await
            .unwrap();
        processor.run_catch_up().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrent_catch_ups_do_not_double_apply() {
        let (sells, seen) = Counter::new(&["Sell"]);
        let mut processor = ProjectionProcessor::new(seeded().await);
        processor.register(Box::new(sells));
        let processor = Arc::new(processor);

        let a = tokio::spawn({
            let processor = Arc::clone(&processor);
            async move { processor.run_catch_up().await.unwrap() }
        });
        let b = tokio::spawn({
            let processor = Arc::clone(&processor);
            async move { processor.run_catch_up().await.unwrap() }
        });
        a.await.unwrap();
        b.await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rebuild_resets_and_replays() {
        let (sells, seen) = Counter::new(&["Sell"]);
        let mut processor = ProjectionProcessor::new(seeded().await);
        processor.register(Box::new(sells));

        processor.run_catch_up().await.unwrap();
        assert_eq!(processor.rebuild_all().await.unwrap(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn catch_up_resumes_after_the_last_position() {
        // Positions skip values, and the second read repeats events already
        // handled before the new ones.
        let store = ScriptedStore::new(vec![
            vec![(1, 1), (2, 2), (5, 5)],
            vec![(2, 2), (5, 5), (6, 6), (7, 7)],
        ]);
        let reads_after = Arc::clone(&store.reads_after);
        let (recorder, handled) = Recorder::new(None);
        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(recorder));

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(processor.run_catch_up().await.unwrap(), 2);

        assert_eq!(*handled.lock().unwrap(), vec![1, 2, 5, 6, 7]);
        assert_eq!(*reads_after.lock().unwrap(), vec![0, 5]);
    }

    #[tokio::test]
    async fn catch_up_reads_from_the_slowest_projection() {
        let store = seeded().await;
        let (ahead, ahead_seen) = Counter::new(&["Sell", "Stock"]);
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(ahead));
        processor.run_catch_up().await.unwrap();

        // Register a second projection that starts from the beginning.
        let (behind, behind_seen) = Counter::new(&["Sell", "Stock"]);
        processor.register(Box::new(behind));
        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(ahead_seen.load(Ordering::SeqCst), 3);
        assert_eq!(behind_seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_event_is_retried_on_the_next_catch_up() {
        let (recorder, handled) = Recorder::new(Some(2));
        let (counter, counted) = Counter::new(&["Sell", "Stock"]);
        let mut processor = ProjectionProcessor::new(seeded().await);
        processor.register(Box::new(recorder));
        processor.register(Box::new(counter));

        assert!(processor.run_catch_up().await.is_err());
        assert_eq!(*handled.lock().unwrap(), vec![1]);
        assert_eq!(counted.load(Ordering::SeqCst), 1);

        assert_eq!(processor.run_catch_up().await.unwrap(), 4);
        assert_eq!(*handled.lock().unwrap(), vec![1, 2, 1]);
        assert_eq!(counted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn process_event_skips_unsubscribed_types() {
        let (sells, seen) = Counter::new(&["Sell"]);
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(sells));
        assert_eq!(processor.projection_count(), 1);

        processor
            .process_event(&event(AggregateId::new(), "Payment", 1))
            .await
            .unwrap();
        processor
            .process_event(&event(AggregateId::new(), "Sell", 1))
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
