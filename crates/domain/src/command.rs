//! Loading aggregates and recording their events.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{
    EventEnvelope, EventStore, EventStoreExt, Snapshot, StreamAppend, Version,
};
use serde::de::DeserializeOwned;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;
use crate::retry::{RetryPolicy, retry_on_conflict};

/// Outcome of a successful command.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// State after the new events were applied.
    pub aggregate: A,
    pub events: Vec<A::Event>,
    pub new_version: Version,
}

/// An intention addressed to one aggregate.
pub trait Command: Send + Sync {
    type Aggregate: Aggregate;

    fn aggregate_id(&self) -> AggregateId;
}

/// Loads aggregates of type `A` from `S` and writes their events back.
///
/// Single-stream commands go through [`CommandHandler::execute`]. Commands
/// that touch several streams build a [`StreamAppend`] per stream with
/// [`CommandHandler::stage`] and commit them together in a [`UnitOfWork`].
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    retry: RetryPolicy,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate + DeserializeOwned,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            _phantom: PhantomData,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds the aggregate from its latest snapshot and later events.
    /// A stream with no events yields `A::default()`.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => {
                let version = snapshot.version;
                let mut restored: A = snapshot.into_state()?;
                restored.set_version(version);
                restored
            }
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = envelope.decode()?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Like [`Self::load_existing`] but a missing stream is an error.
    pub async fn require(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        self.load_existing(aggregate_id)
            .await?
            .ok_or_else(|| DomainError::not_found(A::aggregate_type(), aggregate_id))
    }

    /// Runs `command_fn` against the current state and appends its events,
    /// reloading and re-running it when another writer got there first.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let command_fn = &command_fn;
        retry_on_conflict(&self.retry, A::aggregate_type(), move || {
            self.execute_once(aggregate_id, false, command_fn)
        })
        .await
    }

    /// [`Self::execute`] for commands that need the aggregate to exist.
    pub async fn execute_existing<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let command_fn = &command_fn;
        retry_on_conflict(&self.retry, A::aggregate_type(), move || {
            self.execute_once(aggregate_id, true, command_fn)
        })
        .await
    }

    async fn execute_once<F>(
        &self,
        aggregate_id: AggregateId,
        must_exist: bool,
        command_fn: &F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = if must_exist {
            self.require(aggregate_id).await?
        } else {
            self.load(aggregate_id).await?
        };

        let events = command_fn(&aggregate)?;
        if events.is_empty() {
            let new_version = aggregate.version();
            return Ok(CommandResult {
                aggregate,
                events,
                new_version,
            });
        }

        let append = self.stage(aggregate_id, &aggregate, &events)?;
        self.store.append_streams(vec![append]).await?;

        apply_committed(&mut aggregate, events.iter().cloned());
        Ok(CommandResult {
            new_version: aggregate.version(),
            aggregate,
            events,
        })
    }

    /// Builds the append for `events` on top of `aggregate` without writing.
    ///
    /// The append expects the stream to still be at `aggregate.version()`.
    pub fn stage(
        &self,
        aggregate_id: AggregateId,
        aggregate: &A,
        events: &[A::Event],
    ) -> Result<StreamAppend, DomainError> {
        let current = aggregate.version();
        let mut version = current;
        let mut envelopes = Vec::with_capacity(events.len());

        for event in events {
            version = version.next();
            envelopes.push(
                EventEnvelope::builder()
                    .aggregate_id(aggregate_id)
                    .aggregate_type(A::aggregate_type())
                    .event_type(event.event_type())
                    .version(version)
                    .payload(event)?
                    .build()?,
            );
        }

        Ok(StreamAppend::new(aggregate_id, Some(current), envelopes))
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Stores a snapshot when the aggregate sits on a snapshot boundary.
    pub async fn snapshot_if_due(&self, aggregate: &A) -> Result<(), DomainError> {
        let Some(id) = aggregate.id() else {
            return Ok(());
        };
        if !aggregate.should_snapshot() {
            return Ok(());
        }

        let snapshot = Snapshot::from_state(id, A::aggregate_type(), aggregate.version(), aggregate)?;
        self.store.save_snapshot(snapshot).await?;
        tracing::debug!(aggregate_id = %id, version = %aggregate.version(), "snapshot saved");
        Ok(())
    }

    /// [`Self::snapshot_if_due`] after a commit has already succeeded; a
    /// failure is logged and dropped.
    pub async fn snapshot_after_commit(&self, aggregate: &A) {
        if let Err(e) = self.snapshot_if_due(aggregate).await {
            tracing::warn!(aggregate_type = A::aggregate_type(), error = %e, "snapshot failed");
        }
    }
}

/// Applies events that were just committed and advances the version to match.
pub fn apply_committed<A: Aggregate>(aggregate: &mut A, events: impl IntoIterator<Item = A::Event>) {
    let mut version = aggregate.version();
    for event in events {
        aggregate.apply(event);
        version = version.next();
    }
    aggregate.set_version(version);
}

/// Appends staged for several streams, committed in one atomic write.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    appends: Vec<StreamAppend>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an append; appends without events are dropped.
    pub fn add(&mut self, append: StreamAppend) {
        if !append.events.is_empty() {
            self.appends.push(append);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.appends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.appends.len()
    }

    /// Writes every queued append or none of them.
    pub async fn commit<S: EventStore + ?Sized>(self, store: &S) -> Result<Vec<Version>, DomainError> {
        if self.appends.is_empty() {
            return Ok(Vec::new());
        }
        Ok(store.append_streams(self.appends).await?)
    }
}
