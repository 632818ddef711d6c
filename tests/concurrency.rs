//! Concurrent writers on one branch never share a number or leave two heads.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use wireframe_vcs::db::DatabaseConfig;
use wireframe_vcs::store::SurrealHistoryStore;
use wireframe_vcs::{CreateVersionOptions, VcsError, VersionControl};

const WRITERS: usize = 16;

async fn spawn_writers(vcs: &VersionControl, document: &str) -> Vec<Result<u32, VcsError>> {
    let mut handles = Vec::with_capacity(WRITERS);
    for i in 0..WRITERS {
        let vcs = vcs.clone();
        let document = document.to_string();
        handles.push(tokio::spawn(async move {
            vcs.create_version(
                &document,
                json!({"title": format!("edit {}", i)}),
                CreateVersionOptions::description(format!("writer {}", i)),
            )
            .await
            .map(|v| v.version_number)
        }));
    }

    let mut results = Vec::with_capacity(WRITERS);
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

async fn count_heads(vcs: &VersionControl, document: &str) -> usize {
    vcs.store()
        .list_branch_versions(document, "main")
        .await
        .unwrap()
        .into_iter()
        .filter(|v| v.is_current)
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_are_numbered_contiguously() {
    let vcs = VersionControl::in_memory();

    let results = spawn_writers(&vcs, "doc1").await;
    let mut numbers: Vec<u32> = results.into_iter().map(Result::unwrap).collect();
    numbers.sort_unstable();

    let expected: Vec<u32> = (1..=WRITERS as u32).collect();
    assert_eq!(numbers, expected);
    assert_eq!(count_heads(&vcs, "doc1").await, 1);
    assert_eq!(
        vcs.get_latest_version_number("doc1", "main").await.unwrap(),
        WRITERS as u32
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_on_surreal_never_share_numbers() {
    let db = DatabaseConfig::memory().connect().await.unwrap();
    let vcs = VersionControl::new(Arc::new(SurrealHistoryStore::new(Arc::new(db))));

    let results = spawn_writers(&vcs, "doc1").await;
    let mut seen = HashSet::new();
    for result in results {
        match result {
            Ok(number) => assert!(seen.insert(number), "number {} assigned twice", number),
            Err(err) => assert!(
                matches!(err, VcsError::ConcurrentModification { .. }),
                "unexpected error: {}",
                err
            ),
        }
    }

    assert!(!seen.is_empty());
    assert_eq!(count_heads(&vcs, "doc1").await, 1);
    let stored = vcs.store().list_branch_versions("doc1", "main").await.unwrap();
    assert_eq!(stored.len(), seen.len());
}

#[tokio::test]
async fn test_stale_guard_is_rejected() {
    let vcs = VersionControl::in_memory();
    let v1 = vcs
        .create_version("doc1", json!({"title": "A"}), Default::default())
        .await
        .unwrap();

    // Two editors start from v1; the first one wins.
    let first = vcs
        .create_version(
            "doc1",
            json!({"title": "B"}),
            CreateVersionOptions::default().expecting_head(Some(v1.id.clone())),
        )
        .await
        .unwrap();
    let err = vcs
        .create_version(
            "doc1",
            json!({"title": "C"}),
            CreateVersionOptions::default().expecting_head(Some(v1.id.clone())),
        )
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    match err {
        VcsError::ConcurrentModification {
            expected, actual, ..
        } => {
            assert_eq!(expected, Some(v1.id));
            assert_eq!(actual, Some(first.id.clone()));
        }
        other => panic!("unexpected error: {other}"),
    }

    let head = vcs.get_current_version("doc1", "main").await.unwrap().unwrap();
    assert_eq!(head.id, first.id);
    assert_eq!(head.version_number, 2);
}

#[tokio::test]
async fn test_guard_expecting_empty_branch_is_rejected() {
    let vcs = VersionControl::in_memory();
    let v1 = vcs
        .create_version("doc1", json!({"title": "A"}), Default::default())
        .await
        .unwrap();
    let fork = vcs.create_branch(&v1.id, "alt", "ana", None).await.unwrap();

    // A writer that observed an empty main is now stale.
    let err = vcs
        .create_version(
            "doc1",
            json!({"title": "late"}),
            CreateVersionOptions::default().expecting_head(None),
        )
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let merged = vcs.merge_branch(&fork.id, "ana", None).await.unwrap();
    assert_eq!(merged.version_number, 2);
}
