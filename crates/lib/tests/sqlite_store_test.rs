//! # SQLite Store Tests
//!
//! Verifies that `SqliteStore` persists every field of a process record and
//! that its query and statistics paths agree with the in-memory store.

mod common;

use crate::common::setup_tracing;
use chrono::{Duration, Utc};
use ingestflow::{
    IngestionError, IngestionStatus, IngestionType, MemoryStore, PageRequest, ProcessFilter,
    ProcessStore, SortField, SortOrder,
};
use ingestflow_test_utils::{ProcessFixture, TestSetup};
use serde_json::json;
use tempfile::tempdir;

#[tokio::test]
async fn test_record_round_trips_through_sqlite() -> anyhow::Result<()> {
    setup_tracing();
    let setup = TestSetup::new().await?;

    let mut result = serde_json::Map::new();
    result.insert("rows".to_string(), json!([1, 2, 3]));
    let process = ProcessFixture::new("alice", IngestionType::DocumentUpload)
        .total_items(12)
        .completed_after(3)
        .result(result)
        .insert(&setup.store)
        .await?;

    let loaded = setup.store.get(process.id).await?.expect("row exists");
    assert_eq!(loaded.id, process.id);
    assert_eq!(loaded.status, IngestionStatus::Completed);
    assert_eq!(loaded.result, process.result);
    assert_eq!(loaded.processed_items, 12);
    // Timestamps are stored with millisecond precision.
    assert_eq!(
        loaded.started_at.map(|t| t.timestamp_millis()),
        process.started_at.map(|t| t.timestamp_millis())
    );
    assert_eq!(loaded.initiated_by, "alice");
    Ok(())
}

#[tokio::test]
async fn test_save_and_delete() -> anyhow::Result<()> {
    setup_tracing();
    let setup = TestSetup::new().await?;

    let mut process = ProcessFixture::new("alice", IngestionType::ApiSync)
        .insert(&setup.store)
        .await?;
    process.status = IngestionStatus::Failed;
    process.error_message = Some("quota exceeded".to_string());
    setup.store.save(&process).await?;

    let loaded = setup.store.get(process.id).await?.expect("row exists");
    assert_eq!(loaded.status, IngestionStatus::Failed);
    assert_eq!(loaded.error_message.as_deref(), Some("quota exceeded"));

    assert!(setup.store.delete(process.id).await?);
    assert!(!setup.store.delete(process.id).await?);
    assert_eq!(
        setup.store.save(&process).await.unwrap_err(),
        IngestionError::NotFound
    );
    Ok(())
}

#[tokio::test]
async fn test_query_matches_memory_store() -> anyhow::Result<()> {
    setup_tracing();
    let setup = TestSetup::new().await?;
    let memory = MemoryStore::new();
    let base = Utc::now() - Duration::hours(1);

    for i in 0..7i64 {
        let owner = if i % 3 == 0 { "bob" } else { "alice" };
        let process = ProcessFixture::new(owner, IngestionType::BatchImport)
            .total_items(i as u32)
            .created_at(base + Duration::minutes(i))
            .build();
        setup.store.insert(&process).await?;
        memory.insert(&process).await?;
    }

    let page = PageRequest::new(2, 2).sorted(SortField::CreatedAt, SortOrder::Desc);
    let (from_sqlite, sqlite_total) = setup
        .store
        .query(Some("alice"), &ProcessFilter::default(), &page)
        .await?;
    let (from_memory, memory_total) = memory
        .query(Some("alice"), &ProcessFilter::default(), &page)
        .await?;

    assert_eq!(sqlite_total, 4);
    assert_eq!(sqlite_total, memory_total);
    let ids = |v: &[ingestflow::IngestionProcess]| v.iter().map(|p| p.id).collect::<Vec<_>>();
    assert_eq!(ids(&from_sqlite), ids(&from_memory));
    Ok(())
}

#[tokio::test]
async fn test_stats_aggregate_by_status_type_and_duration() -> anyhow::Result<()> {
    setup_tracing();
    let setup = TestSetup::new().await?;

    ProcessFixture::new("alice", IngestionType::BatchImport)
        .completed_after(2)
        .insert(&setup.store)
        .await?;
    ProcessFixture::new("alice", IngestionType::BatchImport)
        .completed_after(4)
        .insert(&setup.store)
        .await?;
    ProcessFixture::new("alice", IngestionType::ApiSync)
        .failed("boom")
        .insert(&setup.store)
        .await?;
    ProcessFixture::new("bob", IngestionType::DocumentUpload)
        .processing()
        .insert(&setup.store)
        .await?;

    let alice = setup.store.stats(Some("alice")).await?;
    assert_eq!(alice.total, 3);
    assert_eq!((alice.completed, alice.failed, alice.processing), (2, 1, 0));
    assert_eq!(alice.by_type[&IngestionType::BatchImport], 2);
    assert!((alice.average_duration - 3.0).abs() < 0.01);

    let all = setup.store.stats(None).await?;
    assert_eq!(all.total, 4);
    assert_eq!(all.processing, 1);

    let empty = TestSetup::new().await?.store.stats(None).await?;
    assert_eq!(empty.total, 0);
    assert_eq!(empty.average_duration, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_file_database_survives_reopen() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("ingest.db");
    let path = path.to_str().expect("utf-8 temp path");

    let id = {
        let setup = TestSetup::at(path).await?;
        ProcessFixture::new("alice", IngestionType::ApiSync)
            .insert(&setup.store)
            .await?
            .id
    };

    let reopened = TestSetup::at(path).await?;
    assert!(reopened.store.get(id).await?.is_some());
    Ok(())
}
