//! Aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact recorded on a stream, named in the past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Name stored alongside the payload.
    fn event_type(&self) -> &'static str;
}

/// State rebuilt by folding a stream of events.
///
/// Command methods live on the concrete types. They inspect the current state
/// and return the events to record (or an error) without mutating anything;
/// only [`Aggregate::apply`] changes state.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;
    type Error: std::error::Error + Send + Sync;

    /// Stream family name, e.g. `Sell`.
    fn aggregate_type() -> &'static str;

    /// `None` until the creating event has been applied.
    fn id(&self) -> Option<AggregateId>;

    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Folds one event into the state. Must not fail.
    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Aggregates whose state is periodically stored as a snapshot.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Events between snapshots.
    fn snapshot_interval() -> usize {
        100
    }

    fn should_snapshot(&self) -> bool {
        let version = self.version().as_i64();
        version > 0 && (version as usize).is_multiple_of(Self::snapshot_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Opened { id: AggregateId },
        Added { by: u32 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "CounterOpened",
                CounterEvent::Added { .. } => "CounterAdded",
            }
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Counter {
        id: Option<AggregateId>,
        total: u32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("counter error")]
    struct CounterError;

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Error = CounterError;

        fn aggregate_type() -> &'static str {
            "Counter"
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
                CounterEvent::Opened { id } => self.id = Some(id),
                CounterEvent::Added { by } => self.total += by,
            }
        }
    }

    impl SnapshotCapable for Counter {
        fn snapshot_interval() -> usize {
            10
        }
    }

    #[test]
    fn folds_events_in_order() {
        let id = AggregateId::new();
        let mut counter = Counter::default();
        counter.apply_events([
            CounterEvent::Opened { id },
            CounterEvent::Added { by: 2 },
            CounterEvent::Added { by: 5 },
        ]);

        assert_eq!(counter.id(), Some(id));
        assert_eq!(counter.total, 7);
        assert_eq!(CounterEvent::Added { by: 1 }.event_type(), "CounterAdded");
    }

    #[test]
    fn snapshots_on_interval_boundaries() {
        let mut counter = Counter::default();
        assert!(!counter.should_snapshot());

        counter.set_version(Version::new(10));
        assert!(counter.should_snapshot());

        counter.set_version(Version::new(11));
        assert!(!counter.should_snapshot());
    }
}
