//! TableStore interface tests.
//!
//! These tests verify the conditional-write, batch and query semantics the
//! stream protocols depend on. Each adapter should run these tests.

use uuid::Uuid;

use tablestream::storage::{
    query_rows, BatchFailureReason, PropertyValue, Row, RowQuery, StoreError, TableOperation,
    TableStore, ETAG_ANY,
};

/// Fresh partition key so tests never see each other's rows.
pub fn test_partition(name: &str) -> String {
    format!("test_{}_{}", name, Uuid::new_v4().simple())
}

pub fn make_row(partition_key: &str, row_key: &str, value: i64) -> Row {
    Row::new(partition_key, row_key).with_property("Value", value)
}

fn value(row: &Row) -> Option<i64> {
    row.property("Value").and_then(PropertyValue::as_i64)
}

fn failure(result: Result<impl std::fmt::Debug, StoreError>) -> (Option<usize>, BatchFailureReason) {
    match result {
        Err(StoreError::Batch(batch)) => (batch.index, batch.reason),
        other => panic!("expected batch failure, got {:?}", other),
    }
}

async fn insert<S: TableStore>(store: &S, pk: &str, row_key: &str, value: i64) -> String {
    let outcomes = store
        .submit_batch(pk, vec![TableOperation::Insert(make_row(pk, row_key, value))])
        .await
        .expect("insert should succeed");
    outcomes[0].etag.clone().expect("insert should return an etag")
}

// =============================================================================
// Single-row tests
// =============================================================================

pub async fn test_insert_and_get<S: TableStore>(store: &S) {
    let pk = test_partition("insert_get");

    let etag = insert(store, &pk, "row-1", 7).await;

    let row = store
        .get(&pk, "row-1")
        .await
        .expect("get should succeed")
        .expect("row should exist");
    assert_eq!(row.partition_key, pk);
    assert_eq!(value(&row), Some(7));
    assert_eq!(row.etag.as_deref(), Some(etag.as_str()));
    assert!(row.timestamp.is_some(), "store should stamp a timestamp");
}

pub async fn test_get_missing_row<S: TableStore>(store: &S) {
    let pk = test_partition("get_missing");

    let row = store.get(&pk, "nope").await.expect("get should succeed");
    assert!(row.is_none(), "missing row should be None");
}

// =============================================================================
// Conditional operations
// =============================================================================

pub async fn test_insert_existing_row_fails<S: TableStore>(store: &S) {
    let pk = test_partition("insert_existing");
    insert(store, &pk, "row-1", 1).await;

    let result = store
        .submit_batch(&pk, vec![TableOperation::Insert(make_row(&pk, "row-1", 2))])
        .await;

    assert_eq!(failure(result), (Some(0), BatchFailureReason::AlreadyExists));
}

pub async fn test_replace_requires_matching_etag<S: TableStore>(store: &S) {
    let pk = test_partition("replace_etag");
    let etag = insert(store, &pk, "row-1", 1).await;

    let stale = make_row(&pk, "row-1", 2).with_etag("W/\"stale\"");
    let result = store
        .submit_batch(&pk, vec![TableOperation::Replace(stale)])
        .await;
    assert_eq!(
        failure(result),
        (Some(0), BatchFailureReason::PreconditionFailed)
    );

    let current = make_row(&pk, "row-1", 3).with_etag(etag.clone());
    let outcomes = store
        .submit_batch(&pk, vec![TableOperation::Replace(current)])
        .await
        .expect("replace with current etag should succeed");
    assert_ne!(outcomes[0].etag.as_deref(), Some(etag.as_str()));

    let row = store.get(&pk, "row-1").await.unwrap().unwrap();
    assert_eq!(value(&row), Some(3));
}

pub async fn test_replace_missing_row_not_found<S: TableStore>(store: &S) {
    let pk = test_partition("replace_missing");

    let result = store
        .submit_batch(
            &pk,
            vec![TableOperation::Replace(
                make_row(&pk, "row-1", 1).with_etag(ETAG_ANY),
            )],
        )
        .await;

    assert_eq!(failure(result), (Some(0), BatchFailureReason::NotFound));
}

pub async fn test_delete_with_wildcard_etag<S: TableStore>(store: &S) {
    let pk = test_partition("delete_wildcard");
    insert(store, &pk, "row-1", 1).await;

    store
        .submit_batch(
            &pk,
            vec![TableOperation::Delete(
                Row::new(pk.as_str(), "row-1").with_etag(ETAG_ANY),
            )],
        )
        .await
        .expect("wildcard delete should succeed");

    assert!(store.get(&pk, "row-1").await.unwrap().is_none());
}

pub async fn test_insert_or_merge_keeps_other_properties<S: TableStore>(store: &S) {
    let pk = test_partition("merge");
    store
        .submit_batch(
            &pk,
            vec![TableOperation::Insert(
                make_row(&pk, "row-1", 1).with_property("Name", "first"),
            )],
        )
        .await
        .unwrap();

    store
        .submit_batch(
            &pk,
            vec![TableOperation::InsertOrMerge(make_row(&pk, "row-1", 2))],
        )
        .await
        .expect("merge should succeed");

    let row = store.get(&pk, "row-1").await.unwrap().unwrap();
    assert_eq!(value(&row), Some(2));
    assert_eq!(row.property("Name"), Some(&PropertyValue::from("first")));
}

pub async fn test_insert_or_replace_drops_other_properties<S: TableStore>(store: &S) {
    let pk = test_partition("upsert");
    store
        .submit_batch(
            &pk,
            vec![TableOperation::Insert(
                make_row(&pk, "row-1", 1).with_property("Name", "first"),
            )],
        )
        .await
        .unwrap();

    store
        .submit_batch(
            &pk,
            vec![TableOperation::InsertOrReplace(make_row(&pk, "row-1", 2))],
        )
        .await
        .expect("replace should succeed");

    let row = store.get(&pk, "row-1").await.unwrap().unwrap();
    assert_eq!(value(&row), Some(2));
    assert!(row.property("Name").is_none());
}

// =============================================================================
// Batch semantics
// =============================================================================

pub async fn test_batch_returns_outcome_per_operation<S: TableStore>(store: &S) {
    let pk = test_partition("batch_outcomes");

    let outcomes = store
        .submit_batch(
            &pk,
            vec![
                TableOperation::Insert(make_row(&pk, "a", 1)),
                TableOperation::Insert(make_row(&pk, "b", 2)),
                TableOperation::InsertOrReplace(make_row(&pk, "c", 3)),
            ],
        )
        .await
        .expect("batch should succeed");

    let keys: Vec<_> = outcomes.iter().map(|o| o.row_key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    assert!(outcomes.iter().all(|o| o.etag.is_some()));
}

pub async fn test_batch_is_atomic<S: TableStore>(store: &S) {
    let pk = test_partition("batch_atomic");
    insert(store, &pk, "existing", 1).await;

    let result = store
        .submit_batch(
            &pk,
            vec![
                TableOperation::Insert(make_row(&pk, "new-1", 1)),
                TableOperation::Insert(make_row(&pk, "new-2", 2)),
                TableOperation::Insert(make_row(&pk, "existing", 3)),
            ],
        )
        .await;

    assert_eq!(failure(result), (Some(2), BatchFailureReason::AlreadyExists));
    assert!(store.get(&pk, "new-1").await.unwrap().is_none());
    assert!(store.get(&pk, "new-2").await.unwrap().is_none());
    let existing = store.get(&pk, "existing").await.unwrap().unwrap();
    assert_eq!(value(&existing), Some(1));
}

pub async fn test_batch_over_limit_is_rejected<S: TableStore>(store: &S) {
    let pk = test_partition("batch_limit");
    let operations = (0..=store.max_batch_operations())
        .map(|i| TableOperation::Insert(make_row(&pk, &format!("row-{i:04}"), i as i64)))
        .collect();

    let result = store.submit_batch(&pk, operations).await;

    assert!(result.is_err(), "oversized batch should be rejected");
    assert!(store.get(&pk, "row-0000").await.unwrap().is_none());
}

// =============================================================================
// Queries
// =============================================================================

pub async fn test_query_exact_and_range<S: TableStore>(store: &S) {
    let pk = test_partition("query");
    let operations = ["a", "b", "c", "d", "e", "head"]
        .iter()
        .map(|key| TableOperation::Insert(make_row(&pk, key, 0)))
        .collect();
    store.submit_batch(&pk, operations).await.unwrap();

    let query = RowQuery::new().exact("head").range("b", "d");
    let rows = query_rows(store, &pk, &query).await.expect("query should succeed");

    let keys: Vec<_> = rows.iter().map(|r| r.row_key.as_str()).collect();
    assert_eq!(keys, vec!["b", "c", "d", "head"]);
}

pub async fn test_query_reads_every_page<S: TableStore>(store: &S) {
    let pk = test_partition("query_pages");
    let total = 3 * store.max_batch_operations().min(50);
    let keys: Vec<String> = (0..total).map(|i| format!("row-{i:04}")).collect();
    for chunk in keys.chunks(store.max_batch_operations().min(50)) {
        let operations = chunk
            .iter()
            .map(|key| TableOperation::Insert(make_row(&pk, key, 0)))
            .collect();
        store.submit_batch(&pk, operations).await.unwrap();
    }

    let query = RowQuery::new().range("row-0000", "row-9999");
    let rows = query_rows(store, &pk, &query).await.expect("query should succeed");

    let read: Vec<_> = rows.iter().map(|r| r.row_key.clone()).collect();
    assert_eq!(read, keys);
}

pub async fn test_query_unknown_partition_is_empty<S: TableStore>(store: &S) {
    let pk = test_partition("query_empty");

    let rows = query_rows(store, &pk, &RowQuery::new().range("a", "z"))
        .await
        .expect("query should succeed");

    assert!(rows.is_empty());
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all TableStore interface tests against an adapter.
#[macro_export]
macro_rules! run_table_store_tests {
    ($store:expr) => {
        use $crate::storage::table_store_tests::*;

        test_insert_and_get($store).await;
        println!("  test_insert_and_get: PASSED");

        test_get_missing_row($store).await;
        println!("  test_get_missing_row: PASSED");

        test_insert_existing_row_fails($store).await;
        println!("  test_insert_existing_row_fails: PASSED");

        test_replace_requires_matching_etag($store).await;
        println!("  test_replace_requires_matching_etag: PASSED");

        test_replace_missing_row_not_found($store).await;
        println!("  test_replace_missing_row_not_found: PASSED");

        test_delete_with_wildcard_etag($store).await;
        println!("  test_delete_with_wildcard_etag: PASSED");

        test_insert_or_merge_keeps_other_properties($store).await;
        println!("  test_insert_or_merge_keeps_other_properties: PASSED");

        test_insert_or_replace_drops_other_properties($store).await;
        println!("  test_insert_or_replace_drops_other_properties: PASSED");

        test_batch_returns_outcome_per_operation($store).await;
        println!("  test_batch_returns_outcome_per_operation: PASSED");

        test_batch_is_atomic($store).await;
        println!("  test_batch_is_atomic: PASSED");

        test_batch_over_limit_is_rejected($store).await;
        println!("  test_batch_over_limit_is_rejected: PASSED");

        test_query_exact_and_range($store).await;
        println!("  test_query_exact_and_range: PASSED");

        test_query_reads_every_page($store).await;
        println!("  test_query_reads_every_page: PASSED");

        test_query_unknown_partition_is_empty($store).await;
        println!("  test_query_unknown_partition_is_empty: PASSED");
    };
}
