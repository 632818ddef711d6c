//! End-to-end behaviour of the version-control facade over both stores.

use serde_json::json;
use std::sync::Arc;

use wireframe_vcs::db::DatabaseConfig;
use wireframe_vcs::diff::ChangeKind;
use wireframe_vcs::model::version::VersionKind;
use wireframe_vcs::store::SurrealHistoryStore;
use wireframe_vcs::{CreateVersionOptions, VcsError, VersionControl};

async fn surreal() -> VersionControl {
    let db = DatabaseConfig::memory().connect().await.unwrap();
    VersionControl::new(Arc::new(SurrealHistoryStore::new(Arc::new(db))))
}

async fn backends() -> Vec<(&'static str, VersionControl)> {
    vec![
        ("memory", VersionControl::in_memory()),
        ("surreal", surreal().await),
    ]
}

#[tokio::test]
async fn test_sequential_creates_on_main() {
    for (backend, vcs) in backends().await {
        let v1 = vcs
            .create_version("doc1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();
        let v2 = vcs
            .create_version("doc1", json!({"title": "B"}), Default::default())
            .await
            .unwrap();

        assert_eq!((v1.version_number, v2.version_number), (1, 2), "{backend}");
        assert_eq!(v2.parent_version_id.as_deref(), Some(v1.id.as_str()), "{backend}");
        assert!(!vcs.get_version(&v1.id).await.unwrap().is_current, "{backend}");
        assert!(vcs.get_version(&v2.id).await.unwrap().is_current, "{backend}");
        assert_eq!(
            vcs.store().document_latest("doc1").await.unwrap(),
            Some(v2.id.clone()),
            "{backend}"
        );
    }
}

#[tokio::test]
async fn test_branch_is_isolated_from_main() {
    for (backend, vcs) in backends().await {
        vcs.create_version("doc1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();
        let v2 = vcs
            .create_version("doc1", json!({"title": "B"}), Default::default())
            .await
            .unwrap();

        let fork = vcs
            .create_branch(&v2.id, "experiment", "ana", None)
            .await
            .unwrap();
        let next = vcs
            .create_version(
                "doc1",
                json!({"title": "C"}),
                CreateVersionOptions::default().on_branch("experiment"),
            )
            .await
            .unwrap();

        assert_eq!(fork.version_number, 1, "{backend}");
        assert_eq!(fork.data, v2.data, "{backend}");
        assert_eq!(fork.parent_version_id.as_deref(), Some(v2.id.as_str()), "{backend}");
        assert_eq!(next.version_number, 2, "{backend}");
        assert_eq!(next.parent_version_id.as_deref(), Some(fork.id.as_str()), "{backend}");

        assert_eq!(vcs.get_latest_version_number("doc1", "main").await.unwrap(), 2);
        let main_head = vcs.get_current_version("doc1", "main").await.unwrap().unwrap();
        assert_eq!(main_head.id, v2.id, "{backend}");
    }
}

#[tokio::test]
async fn test_revert_is_non_destructive() {
    for (backend, vcs) in backends().await {
        let v1 = vcs
            .create_version("doc1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();
        let v2 = vcs
            .create_version("doc1", json!({"title": "B"}), Default::default())
            .await
            .unwrap();

        let v3 = vcs.revert_to_version(&v1.id, "ana", None).await.unwrap();
        assert_eq!(v3.version_number, 3, "{backend}");
        assert_eq!(v3.data, v1.data, "{backend}");
        assert_eq!(v3.parent_version_id.as_deref(), Some(v1.id.as_str()), "{backend}");
        assert_eq!(v3.kind, VersionKind::Reverted, "{backend}");

        let v1_after = vcs.get_version(&v1.id).await.unwrap();
        let v2_after = vcs.get_version(&v2.id).await.unwrap();
        assert_eq!(v1_after.data, json!({"title": "A"}), "{backend}");
        assert_eq!(v2_after.data, json!({"title": "B"}), "{backend}");
        assert_eq!(v1_after.version_number, 1, "{backend}");
        assert_eq!(v2_after.version_number, 2, "{backend}");
    }
}

#[tokio::test]
async fn test_compare_reports_title_change() {
    for (backend, vcs) in backends().await {
        let v1 = vcs
            .create_version("doc1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();
        let v2 = vcs
            .create_version("doc1", json!({"title": "B"}), Default::default())
            .await
            .unwrap();

        let comparison = vcs.compare_versions(&v1.id, &v2.id).await.unwrap();
        assert_eq!(comparison.changes.len(), 1, "{backend}");
        let change = &comparison.changes[0];
        assert_eq!(change.kind, ChangeKind::Modified);
        assert_eq!(change.path, "title");
        assert_eq!(change.values, (Some(json!("A")), Some(json!("B"))));
        assert!(
            comparison.summary.starts_with("1 changes detected: 1 modifications"),
            "{backend}: {}",
            comparison.summary
        );
    }
}

#[tokio::test]
async fn test_merge_overwrites_main() {
    for (backend, vcs) in backends().await {
        vcs.create_version("doc1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();
        let v2 = vcs
            .create_version("doc1", json!({"title": "B", "layout": "grid"}), Default::default())
            .await
            .unwrap();
        vcs.create_branch(&v2.id, "experiment", "ana", None)
            .await
            .unwrap();
        let head = vcs
            .create_version(
                "doc1",
                json!({"title": "C"}),
                CreateVersionOptions::default().on_branch("experiment"),
            )
            .await
            .unwrap();

        let merged = vcs.merge_branch(&head.id, "ana", None).await.unwrap();
        assert_eq!(merged.branch_name, "main", "{backend}");
        assert_eq!(merged.data, json!({"title": "C"}), "{backend}");
        assert_eq!(merged.parent_version_id.as_deref(), Some(head.id.as_str()));
        assert_eq!(merged.version_number, 3, "{backend}");

        let history = vcs.get_version_history("doc1").await.unwrap();
        assert_eq!(history.current.map(|v| v.id), Some(merged.id), "{backend}");
        assert_eq!(history.branches, vec!["main", "experiment"], "{backend}");
        assert_eq!(history.versions.len(), 5, "{backend}");
    }
}

#[tokio::test]
async fn test_single_head_after_mixed_operations() {
    for (backend, vcs) in backends().await {
        let v1 = vcs
            .create_version("doc1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();
        let v2 = vcs
            .create_version("doc1", json!({"title": "B"}), Default::default())
            .await
            .unwrap();
        vcs.create_branch(&v1.id, "alt", "ana", None).await.unwrap();
        vcs.revert_to_version(&v1.id, "ana", None).await.unwrap();
        vcs.delete_version(&v2.id, Some("ana")).await.unwrap();
        let alt_head = vcs.get_current_version("doc1", "alt").await.unwrap().unwrap();
        vcs.merge_branch(&alt_head.id, "ana", None).await.unwrap();

        for branch in ["main", "alt"] {
            let heads = vcs
                .store()
                .list_branch_versions("doc1", branch)
                .await
                .unwrap()
                .into_iter()
                .filter(|v| v.is_current)
                .count();
            assert_eq!(heads, 1, "{backend}/{branch}");
        }
    }
}

#[tokio::test]
async fn test_failed_operations_leave_heads_unchanged() {
    for (backend, vcs) in backends().await {
        let v1 = vcs
            .create_version("doc1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();

        let err = vcs
            .create_branch(&v1.id, "main", "ana", None)
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::DuplicateBranch { .. }), "{backend}");

        let err = vcs
            .create_version(
                "doc1",
                json!({"title": "B"}),
                CreateVersionOptions::default().with_parent("ver-missing"),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{backend}: {err}");

        let head = vcs.get_current_version("doc1", "main").await.unwrap().unwrap();
        assert_eq!(head.id, v1.id, "{backend}");
        assert_eq!(vcs.store().version_count().await.unwrap(), 1, "{backend}");
    }
}

#[tokio::test]
async fn test_deleted_branch_versions_stay_addressable() {
    for (backend, vcs) in backends().await {
        let v1 = vcs
            .create_version("doc1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();
        let fork = vcs.create_branch(&v1.id, "scratch", "ana", None).await.unwrap();
        let branch = vcs.find_branch("doc1", "scratch").await.unwrap().unwrap();

        vcs.delete_branch(&branch.id).await.unwrap();

        let names: Vec<String> = vcs
            .get_branches("doc1")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["main"], "{backend}");
        assert_eq!(vcs.get_version(&fork.id).await.unwrap().data, v1.data, "{backend}");
        assert_eq!(vcs.get_latest_version_number("doc1", "main").await.unwrap(), 1);
    }
}

#[tokio::test]
async fn test_main_is_listed_when_only_other_branches_have_versions() {
    for (backend, vcs) in backends().await {
        vcs.create_version(
            "doc1",
            json!({"title": "draft"}),
            CreateVersionOptions::default().on_branch("experiment"),
        )
        .await
        .unwrap();

        let branches = vcs.get_branches("doc1").await.unwrap();
        let names: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["main", "experiment"], "{backend}");
        assert!(branches[0].head_version_id.is_none(), "{backend}");
        assert_eq!(branches[0].version_count, 0, "{backend}");

        let history = vcs.get_version_history("doc1").await.unwrap();
        assert_eq!(history.branches, vec!["main", "experiment"], "{backend}");
        assert!(history.current.is_none(), "{backend}");
    }
}
