//! PostgreSQL loader tests
//!
//! These tests start a PostgreSQL container and require Docker:
//!
//! ```bash
//! cargo test -p etl-worker --test postgres_loader_tests -- --ignored
//! ```

mod common;

use common::{Harness, TestPostgres, SAMPLE_OBJECT};
use etl_common::types::{StoredRow, TransformedRecord};
use etl_worker::delivery::CycleOutcome;
use etl_worker::error::LoadError;
use etl_worker::loader::Loader;
use etl_worker::queue::MemoryQueue;
use etl_worker::retry::RetryPolicy;

fn record(id: i64, name: &str, price: i64) -> TransformedRecord {
    TransformedRecord {
        id,
        name: name.to_string(),
        price,
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_load_twice_is_idempotent() {
    let pg = TestPostgres::start().await.unwrap();
    let loader = pg.loader();
    let records = vec![record(1, "Apple", 110), record(2, "Banana", 55)];

    assert_eq!(loader.load("data-1.json", &records).await.unwrap(), 2);
    let once = loader.rows_for_batch("data-1.json").await.unwrap();
    loader.load("data-1.json", &records).await.unwrap();
    let twice = loader.rows_for_batch("data-1.json").await.unwrap();

    assert_eq!(once.len(), 2);
    assert_eq!(once, twice);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reload_overwrites_same_batch() {
    let pg = TestPostgres::start().await.unwrap();
    let loader = pg.loader();

    loader.load("data-1.json", &[record(1, "Apple", 110)]).await.unwrap();
    loader
        .load("data-1.json", &[record(1, "Green Apple", 121)])
        .await
        .unwrap();

    assert_eq!(
        loader.rows_for_batch("data-1.json").await.unwrap(),
        vec![StoredRow::from_record("data-1.json", &record(1, "Green Apple", 121))]
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_failed_record_rolls_back_whole_batch() {
    let pg = TestPostgres::start().await.unwrap();
    let loader = pg.loader();
    // PostgreSQL rejects NUL bytes in TEXT (SQLSTATE 22021)
    let records = vec![record(1, "Apple", 110), record(2, "Bad\0Name", 55)];

    let err = loader.load("data-1.json", &records).await.unwrap_err();

    assert!(matches!(err, LoadError::Constraint(_)), "{err:?}");
    assert!(loader.rows_for_batch("data-1.json").await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_batches_accumulate_history() {
    let pg = TestPostgres::start().await.unwrap();
    let loader = pg.loader();

    loader.load("data-1.json", &[record(7, "Apple", 110)]).await.unwrap();
    loader.load("data-2.json", &[record(7, "Apple", 121)]).await.unwrap();

    let rows = loader.rows_for_id(7).await.unwrap();
    assert_eq!(
        rows,
        vec![
            StoredRow::from_record("data-1.json", &record(7, "Apple", 110)),
            StoredRow::from_record("data-2.json", &record(7, "Apple", 121)),
        ]
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_closed_connection_is_transient() {
    let pg = TestPostgres::start().await.unwrap();
    let loader = pg.loader();
    loader.close().await;

    let err = loader.load("data-1.json", &[record(1, "Apple", 110)]).await.unwrap_err();

    assert!(matches!(err, LoadError::Connection(_)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Docker"]
async fn test_duplicate_delivery_against_postgres() {
    let pg = TestPostgres::start().await.unwrap();
    let harness = Harness::build(MemoryQueue::new(), pg.loader(), RetryPolicy::default());
    harness.publish("data-1.json", SAMPLE_OBJECT).await;
    harness.notify("data-1.json").await;

    for _ in 0..2 {
        assert!(matches!(
            harness.delivery.poll_once().await.unwrap(),
            CycleOutcome::Committed { records: 2, .. }
        ));
    }

    let rows = harness.loader.rows_for_batch("data-1.json").await.unwrap();
    assert_eq!(
        rows,
        vec![
            StoredRow::from_record("data-1.json", &record(1, "Apple", 110)),
            StoredRow::from_record("data-1.json", &record(2, "Banana", 55)),
        ]
    );
}
