//! PostgreSQL integration tests.
//!
//! They start a Postgres container, so they are ignored by default. Run with:
//!
//! ```bash
//! cargo test -p event-store --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;

use event_store::{
    AggregateId, AppendOptions, EventEnvelope, EventStore, EventStoreError, EventStoreExt,
    PostgresEventStore, Snapshot, StreamAppend, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // dropping the handle stops the container
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string = format!("postgres://postgres:postgres@{host}:{port}/postgres");

            let pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_events_table.sql"
            ))
            .execute(&pool)
            .await
            .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn test_store() -> PostgresEventStore {
    let info = container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE events, snapshots")
        .execute(&pool)
        .await
        .unwrap();

    PostgresEventStore::new(pool)
}

fn event(aggregate_id: AggregateId, aggregate_type: &str, version: i64, event_type: &str) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type(aggregate_type)
        .event_type(event_type)
        .version(Version::new(version))
        .payload_raw(serde_json::json!({"test": true}))
        .build()
        .unwrap()
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn append_and_read_back() {
    let store = test_store().await;
    let id = AggregateId::new();

    let version = store
        .append(
            vec![event(id, "Sell", 1, "SellPlaced"), event(id, "Sell", 2, "OrderStatusChanged")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();
    assert_eq!(version, Version::new(2));

    let events = store.get_events_for_aggregate(id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "SellPlaced");
    assert!(store.aggregate_exists(id).await.unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn stale_version_conflicts() {
    let store = test_store().await;
    let id = AggregateId::new();

    store
        .append(vec![event(id, "Sell", 1, "SellPlaced")], AppendOptions::expect_new())
        .await
        .unwrap();

    let err = store
        .append(
            vec![event(id, "Sell", 2, "PaymentReconciled")],
            AppendOptions::expect_version(Version::initial()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EventStoreError::ConcurrencyConflict { .. }));
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn failed_multi_stream_commit_writes_nothing() {
    let store = test_store().await;
    let sell = AggregateId::new();
    let payment = AggregateId::new();

    store
        .append(vec![event(sell, "Sell", 1, "SellPlaced")], AppendOptions::expect_new())
        .await
        .unwrap();

    let err = store
        .append_streams(vec![
            StreamAppend::new(
                payment,
                Some(Version::initial()),
                vec![event(payment, "Payment", 1, "PaymentCreated")],
            ),
            StreamAppend::new(
                sell,
                Some(Version::initial()),
                vec![event(sell, "Sell", 1, "PaymentReconciled")],
            ),
        ])
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(store.get_aggregate_version(payment).await.unwrap(), None);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn racing_commits_on_one_stream_serialize() {
    let store = test_store().await;
    let sell = AggregateId::new();
    store
        .append(vec![event(sell, "Sell", 1, "SellPlaced")], AppendOptions::expect_new())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let payment = AggregateId::new();
            store
                .append_streams(vec![
                    StreamAppend::new(
                        payment,
                        Some(Version::initial()),
                        vec![event(payment, "Payment", 1, "PaymentCreated")],
                    ),
                    StreamAppend::new(
                        sell,
                        Some(Version::first()),
                        vec![event(sell, "Sell", 2, "PaymentReconciled")],
                    ),
                ])
                .await
        }));
    }

    let mut won = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            won += 1;
        }
    }
    assert_eq!(won, 1);
    assert_eq!(
        store.get_aggregate_version(sell).await.unwrap(),
        Some(Version::new(2))
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn stream_all_follows_commit_order() {
    use futures_util::StreamExt;

    let store = test_store().await;
    let a = AggregateId::new();
    let b = AggregateId::new();

    for (id, version, kind) in [(b, 1, "B1"), (a, 1, "A1"), (b, 2, "B2")] {
        store
            .append(vec![event(id, "Stock", version, kind)], AppendOptions::new())
            .await
            .unwrap();
    }

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
#[serial]
#[ignore = "requires docker"]
async fn read_after_position_returns_only_later_events() {
    use futures_util::StreamExt;

    let store = test_store().await;
    let id = AggregateId::new();
    store
        .append(
            vec![event(id, "Stock", 1, "S1"), event(id, "Stock", 2, "S2")],
            AppendOptions::new(),
        )
        .await
        .unwrap();

    let first: Vec<_> = store
        .stream_events_after(0)
        .await
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(first.len(), 2);
    assert!(first[0].position < first[1].position);

    store
        .append(vec![event(id, "Stock", 3, "S3")], AppendOptions::new())
        .await
        .unwrap();
    let rest: Vec<String> = store
        .stream_events_after(first[1].position)
        .await
        .unwrap()
        .map(|r| r.unwrap().event.event_type)
        .collect()
        .await;
    assert_eq!(rest, vec!["S3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires docker"]
async fn tailing_reader_sees_every_concurrent_commit_once() {
    use futures_util::StreamExt;
    use std::collections::HashSet;

    const WRITERS: usize = 8;
    const COMMITS: i64 = 25;

    let store = test_store().await;
    let writers: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let id = AggregateId::new();
                for version in 1..=COMMITS {
                    store
                        .append(vec![event(id, "Stock", version, "Moved")], AppendOptions::new())
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    let expected = WRITERS * COMMITS as usize;
    let mut seen = HashSet::new();
    let mut cursor = 0;
    loop {
        let writers_done = writers.iter().all(|w| w.is_finished());
        let batch: Vec<_> = store
            .stream_events_after(cursor)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        if batch.is_empty() && writers_done {
            break;
        }
        for recorded in batch {
            assert!(recorded.position > cursor);
            cursor = recorded.position;
            assert!(seen.insert(recorded.event.event_id), "event read twice");
        }
        tokio::task::yield_now().await;
    }

    for writer in writers {
        writer.await.unwrap();
    }
    assert_eq!(seen.len(), expected);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn snapshot_upsert() {
    let store = test_store().await;
    let id = AggregateId::new();

    store
        .save_snapshot(Snapshot::new(id, "Sell", Version::new(5), serde_json::json!({"n": 1})))
        .await
        .unwrap();
    store
        .save_snapshot(Snapshot::new(id, "Sell", Version::new(10), serde_json::json!({"n": 2})))
        .await
        .unwrap();

    let snap = store.get_snapshot(id).await.unwrap().unwrap();
    assert_eq!(snap.version, Version::new(10));
    assert_eq!(snap.state, serde_json::json!({"n": 2}));
    assert!(store.get_snapshot(AggregateId::new()).await.unwrap().is_none());
}
