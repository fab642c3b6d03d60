//! Stream protocol tests.
//!
//! These tests drive provision, write, read and property updates through
//! `StreamRepository` and check the rows left in the store. Each adapter
//! should run these tests.

use std::sync::Arc;

use uuid::Uuid;

use tablestream::config::StreamLimits;
use tablestream::storage::{query_rows, Row, RowQuery, TableStore};
use tablestream::stream::{
    Entity, EventData, EventProperties, Include, Partition, StreamHeader, StreamProperties,
};
use tablestream::{ConcurrencyConflict, StreamError, StreamRepository};

/// Fresh partition so tests never see each other's rows.
pub fn test_partition(name: &str) -> Partition {
    Partition::new(format!("test_{}_{}", name, Uuid::new_v4().simple()))
        .expect("partition key should be valid")
}

pub fn make_event(kind: &str, id: Option<&str>) -> EventData {
    let event = EventData::new(
        EventProperties::new()
            .with("Type", kind)
            .expect("Type is not reserved"),
    );
    match id {
        Some(id) => event.with_id(id),
        None => event,
    }
}

pub fn make_events(count: usize) -> Vec<EventData> {
    (1..=count)
        .map(|i| make_event("Tick", Some(&format!("evt-{i}"))))
        .collect()
}

/// Every row stored under the partition's table partition key.
pub async fn partition_rows<S: TableStore>(store: &S, partition: &Partition) -> Vec<Row> {
    query_rows(
        store,
        partition.partition_key(),
        &RowQuery::new().range("", "\u{10ffff}"),
    )
    .await
    .expect("query should succeed")
}

fn repository<S: TableStore + 'static>(store: &Arc<S>) -> StreamRepository {
    StreamRepository::new(store.clone())
}

// =============================================================================
// Provision
// =============================================================================

pub async fn test_provision_twice_conflicts<S: TableStore + 'static>(store: Arc<S>) {
    let repo = repository(&store);
    let partition = test_partition("provision_twice");

    repo.provision(&partition, StreamProperties::new())
        .await
        .expect("first provision should succeed");
    let before = partition_rows(store.as_ref(), &partition).await;

    let err = repo
        .provision(&partition, StreamProperties::new())
        .await
        .expect_err("second provision should fail");

    assert!(err.is_concurrency_conflict(), "got {err:?}");
    assert_eq!(partition_rows(store.as_ref(), &partition).await, before);
}

// =============================================================================
// Write
// =============================================================================

pub async fn test_write_creates_expected_rows<S: TableStore + 'static>(store: Arc<S>) {
    let repo = repository(&store);
    let partition = test_partition("write_rows");
    let header = repo
        .provision(&partition, StreamProperties::new())
        .await
        .unwrap();

    let result = repo.write(&header, make_events(2)).await.expect("write should succeed");

    assert_eq!(result.stream.version(), 2);
    let rows = partition_rows(store.as_ref(), &partition).await;
    // 2 events + 2 ids + header
    assert_eq!(rows.len(), 5);
    assert_eq!(rows.iter().filter(|r| r.row_key.starts_with("SS-SE-")).count(), 2);
    assert_eq!(rows.iter().filter(|r| r.row_key.starts_with("SS-UID-")).count(), 2);
}

pub async fn test_duplicate_event_leaves_rows_unchanged<S: TableStore + 'static>(store: Arc<S>) {
    let repo = repository(&store);
    let partition = test_partition("duplicate");
    let first = repo
        .write_new(&partition, vec![make_event("Created", Some("order-created"))])
        .await
        .unwrap();
    let before = partition_rows(store.as_ref(), &partition).await;

    let err = repo
        .write(
            &first.stream,
            vec![make_event("Created", Some("order-created"))],
        )
        .await
        .expect_err("duplicate id should be rejected");

    match err {
        StreamError::DuplicateEvent { id, .. } => assert_eq!(id, "order-created"),
        other => panic!("expected duplicate event, got {other:?}"),
    }
    assert_eq!(partition_rows(store.as_ref(), &partition).await, before);
}

pub async fn test_chunked_write_versions_are_consecutive<S: TableStore + 'static>(store: Arc<S>) {
    let limits = StreamLimits {
        max_operations_per_batch: 5,
        ..Default::default()
    };
    let repo = StreamRepository::with_limits(store.clone(), limits).unwrap();
    let partition = test_partition("chunked");

    let result = repo
        .write_new(&partition, make_events(9))
        .await
        .expect("chunked write should succeed");

    assert_eq!(result.stream.version(), 9);
    assert_eq!(result.stream.count(), 9);
    let slice = repo.read(&partition, 1, 100).await.unwrap();
    let versions: Vec<_> = slice.events.iter().map(|e| e.version).collect();
    assert_eq!(versions, (1..=9).collect::<Vec<u64>>());
    assert_eq!(repo.open(&partition).await.unwrap(), result.stream);
}

pub async fn test_concurrent_writers_one_wins<S: TableStore + 'static>(store: Arc<S>) {
    let repo = repository(&store);
    let partition = test_partition("concurrent");
    let header = repo
        .provision(&partition, StreamProperties::new())
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        repo.write(&header, vec![make_event("A", None)]),
        repo.write(&header, vec![make_event("B", None)]),
    );

    let outcomes = [a, b];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one writer should win");
    let loser = outcomes
        .into_iter()
        .find_map(Result::err)
        .expect("one writer should lose");
    assert!(loser.is_concurrency_conflict(), "got {loser:?}");
    assert_eq!(repo.open(&partition).await.unwrap().version(), 1);
}

pub async fn test_stale_header_after_retry<S: TableStore + 'static>(store: Arc<S>) {
    let repo = repository(&store);
    let partition = test_partition("retry");
    let header = repo
        .provision(&partition, StreamProperties::new())
        .await
        .unwrap();
    repo.write(&header, vec![make_event("A", None)]).await.unwrap();

    let err = repo
        .write(&header, vec![make_event("B", None)])
        .await
        .expect_err("stale header should conflict");
    assert!(matches!(
        err,
        StreamError::ConcurrencyConflict {
            kind: ConcurrencyConflict::StreamChanged,
            ..
        }
    ));

    // Re-open and retry
    let current = repo.open(&partition).await.unwrap();
    let retried = repo
        .write(&current, vec![make_event("B", None)])
        .await
        .expect("retry with fresh header should succeed");
    assert_eq!(retried.stream.version(), 2);
}

// =============================================================================
// Includes
// =============================================================================

pub async fn test_includes_follow_merge_rules<S: TableStore + 'static>(store: Arc<S>) {
    let repo = repository(&store);
    let partition = test_partition("includes");

    let summary = Entity::new(Row::new("", "summary").with_property("Total", 10i64));
    let scratch = Entity::new(Row::new("", "scratch"));
    let first = repo
        .write_new(
            &partition,
            vec![
                make_event("Opened", None)
                    .include(Include::insert(summary.clone()))
                    .include(Include::insert(scratch.clone())),
                make_event("Cleaned", None).include(Include::delete(scratch)),
            ],
        )
        .await
        .expect("write with includes should succeed");

    assert_eq!(first.includes.len(), 1);
    let written = first.includes[0].clone();
    assert_eq!(written.row_key(), "summary");

    // Delete then insert of a stored row becomes a replace
    let replacement = written.with_row(
        written
            .row()
            .clone()
            .with_property("Total", 20i64),
    );
    let second = repo
        .write(
            &first.stream,
            vec![make_event("Recounted", None)
                .include(Include::delete(written))
                .include(Include::insert(replacement))],
        )
        .await
        .expect("delete then insert should succeed");
    assert_eq!(second.includes.len(), 1);

    let rows = partition_rows(store.as_ref(), &partition).await;
    assert!(rows.iter().all(|r| r.row_key != "scratch"));
    let summary_row = rows.iter().find(|r| r.row_key == "summary").unwrap();
    assert_eq!(summary_row.property("Total").and_then(|v| v.as_i64()), Some(20));
    assert_eq!(summary_row.etag, second.includes[0].row().etag);
}

// =============================================================================
// Read
// =============================================================================

pub async fn test_read_slices_cover_stream<S: TableStore + 'static>(store: Arc<S>) {
    let repo = repository(&store);
    let partition = test_partition("slices");
    repo.write_new(&partition, make_events(25)).await.unwrap();

    let mut versions = Vec::new();
    let mut next = Some(1);
    let mut slices = 0;
    while let Some(start) = next {
        let slice = repo.read(&partition, start, 4).await.expect("read should succeed");
        versions.extend(slice.events.iter().map(|e| e.version));
        next = slice.next_version;
        slices += 1;
    }

    assert_eq!(versions, (1..=25).collect::<Vec<u64>>());
    assert_eq!(slices, 7);
}

pub async fn test_read_middle_slice<S: TableStore + 'static>(store: Arc<S>) {
    let repo = repository(&store);
    let partition = test_partition("middle");
    repo.write_new(&partition, make_events(10)).await.unwrap();

    let slice = repo.read(&partition, 2, 2).await.unwrap();

    let versions: Vec<_> = slice.events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![2, 3]);
    assert!(!slice.is_end_of_stream);
    assert_eq!(slice.next_version, Some(4));
}

// =============================================================================
// Properties and virtual partitions
// =============================================================================

pub async fn test_set_properties_round_trip<S: TableStore + 'static>(store: Arc<S>) {
    let repo = repository(&store);
    let partition = test_partition("properties");
    let header = repo
        .provision(
            &partition,
            StreamProperties::new().with("Owner", "alice").unwrap(),
        )
        .await
        .unwrap();

    let properties = StreamProperties::new()
        .with("Owner", "bob")
        .unwrap()
        .with("Region", "eu")
        .unwrap();
    let updated = repo.set_properties(&header, properties.clone()).await.unwrap();

    let opened = repo.open(&partition).await.unwrap();
    assert_eq!(opened.properties(), &properties);
    assert_eq!(opened.etag(), updated.etag());

    let err = repo
        .set_properties(&StreamHeader::new(partition.clone()), StreamProperties::new())
        .await
        .expect_err("transient header should be rejected");
    assert!(matches!(err, StreamError::InvalidArgument(_)));
}

pub async fn test_virtual_partitions_are_isolated<S: TableStore + 'static>(store: Arc<S>) {
    let repo = repository(&store);
    let table_partition = format!("test_virtual_{}", Uuid::new_v4().simple());
    let a = Partition::new(format!("{table_partition}|stream-a")).unwrap();
    let b = Partition::new(format!("{table_partition}|stream-b")).unwrap();

    repo.write_new(&a, make_events(3)).await.unwrap();
    repo.write_new(&b, make_events(1)).await.unwrap();

    assert_eq!(repo.open(&a).await.unwrap().version(), 3);
    assert_eq!(repo.open(&b).await.unwrap().version(), 1);
    assert_eq!(repo.read(&b, 1, 10).await.unwrap().events.len(), 1);
    // Same ids in different virtual partitions do not collide
    assert_eq!(partition_rows(store.as_ref(), &a).await.len(), 7 + 3);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all stream protocol tests against an adapter.
#[macro_export]
macro_rules! run_stream_protocol_tests {
    ($store:expr) => {
        use $crate::stream::stream_protocol_tests::*;

        test_provision_twice_conflicts($store.clone()).await;
        println!("  test_provision_twice_conflicts: PASSED");

        test_write_creates_expected_rows($store.clone()).await;
        println!("  test_write_creates_expected_rows: PASSED");

        test_duplicate_event_leaves_rows_unchanged($store.clone()).await;
        println!("  test_duplicate_event_leaves_rows_unchanged: PASSED");

        test_chunked_write_versions_are_consecutive($store.clone()).await;
        println!("  test_chunked_write_versions_are_consecutive: PASSED");

        test_concurrent_writers_one_wins($store.clone()).await;
        println!("  test_concurrent_writers_one_wins: PASSED");

        test_stale_header_after_retry($store.clone()).await;
        println!("  test_stale_header_after_retry: PASSED");

        test_includes_follow_merge_rules($store.clone()).await;
        println!("  test_includes_follow_merge_rules: PASSED");

        test_read_slices_cover_stream($store.clone()).await;
        println!("  test_read_slices_cover_stream: PASSED");

        test_read_middle_slice($store.clone()).await;
        println!("  test_read_middle_slice: PASSED");

        test_set_properties_round_trip($store.clone()).await;
        println!("  test_set_properties_round_trip: PASSED");

        test_virtual_partitions_are_isolated($store.clone()).await;
        println!("  test_virtual_partitions_are_isolated: PASSED");
    };
}
