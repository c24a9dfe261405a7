use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Snapshot, Version,
    store::{
        EventStore, RecordedEvent, RecordedEventStream, StreamAppend, check_stream_head,
        validate_appends,
    },
};

const EVENT_COLUMNS: &str =
    "id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata";

/// Key of the advisory lock every commit holds while it writes.
const APPEND_LOCK: i64 = 0x5345_4C4C_4C4F_4721;

/// Event store backed by PostgreSQL.
///
/// A commit runs in one transaction holding a transaction-scoped advisory
/// lock shared by all writers. Head versions are read and `global_position`
/// values drawn under that lock, and it is only released once the commit is
/// visible, so positions become visible in increasing order and readers can
/// resume after the last position they saw. The `unique_aggregate_version`
/// constraint catches any writer that skipped the check.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and applies pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata: HashMap<String, serde_json::Value> =
            serde_json::from_value(row.try_get("metadata")?)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn lock_appends(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn head_version(tx: &mut Transaction<'_, Postgres>, id: AggregateId) -> Result<Version> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(id.as_uuid())
                .fetch_one(&mut **tx)
                .await?;
        Ok(Version::new(version.unwrap_or(0)))
    }

    async fn insert_event(
        tx: &mut Transaction<'_, Postgres>,
        append: &StreamAppend,
        event: &EventEnvelope,
    ) -> Result<()> {
        let metadata = serde_json::to_value(&event.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(&event.event_type)
        .bind(event.aggregate_id.as_uuid())
        .bind(&event.aggregate_type)
        .bind(event.version.as_i64())
        .bind(event.timestamp)
        .bind(&event.payload)
        .bind(metadata)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_aggregate_version")
            {
                return EventStoreError::ConcurrencyConflict {
                    aggregate_id: append.aggregate_id,
                    expected: append.expected_version.unwrap_or(Version::initial()),
                    actual: event.version,
                };
            }
            EventStoreError::Database(e)
        })?;

        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append_streams(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_appends(&appends)?;

        let mut tx = self.pool.begin().await?;

        Self::lock_appends(&mut tx).await?;

        for append in &appends {
            let current = Self::head_version(&mut tx, append.aggregate_id).await?;
            if let Err(e) = check_stream_head(append, current) {
                tracing::debug!(aggregate_id = %append.aggregate_id, error = %e, "append rejected");
                return Err(e);
            }
        }

        let mut versions = Vec::with_capacity(appends.len());
        for append in &appends {
            for event in &append.events {
                Self::insert_event(&mut tx, append, event).await?;
            }
            versions.push(append.resulting_version().unwrap_or(Version::initial()));
        }

        tx.commit().await?;
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
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE aggregate_id = $1 AND version >= $2 \
             ORDER BY version ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_id.as_uuid())
            .bind(from_version.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_events_after(&self, position: u64) -> Result<RecordedEventStream> {
        use futures_util::StreamExt;

        // Rows are collected first so the stream does not borrow the query text.
        let sql = format!(
            "SELECT global_position, {EVENT_COLUMNS} FROM events \
             WHERE global_position > $1 \
             ORDER BY global_position ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let stream = futures_util::stream::iter(rows).map(|row| -> Result<RecordedEvent> {
            let position: i64 = row.try_get("global_position")?;
            Ok(RecordedEvent {
                position: u64::try_from(position).unwrap_or_default(),
                event: Self::row_to_event(row)?,
            })
        });
        Ok(Box::pin(stream))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, timestamp, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                timestamp = EXCLUDED.timestamp,
                state = EXCLUDED.state
            "#,
        )
        .bind(snapshot.aggregate_id.as_uuid())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(snapshot.timestamp)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT aggregate_id, aggregate_type, version, timestamp, state \
             FROM snapshots WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Snapshot> {
            Ok(Snapshot {
                aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                version: Version::new(row.try_get("version")?),
                timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
                state: row.try_get("state")?,
            })
        })
        .transpose()
    }
}
