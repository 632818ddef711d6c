use tracing::{debug, info, warn};

use crate::error::{VcsError, VcsResult};
use crate::model::version::{
    BranchRecord, HeadGuard, NewVersion, Version, VersionKind, DEFAULT_BRANCH,
};

use super::{validate_branch_name, VersionControl};

const MAX_USER_ID: usize = 255;

fn require_user(user_id: &str) -> VcsResult<()> {
    if user_id.trim().is_empty() || user_id.chars().count() > MAX_USER_ID {
        return Err(VcsError::Validation(
            "user id must be 1-255 characters".to_string(),
        ));
    }
    Ok(())
}

fn require_branch_name(name: &str) -> VcsResult<()> {
    validate_branch_name(name).map_err(|e| VcsError::Validation(e.to_string()))
}

/// A version on `branch` copying `source` verbatim, with `source` as parent.
fn derived_from(
    source: &Version,
    branch: &str,
    kind: VersionKind,
    user_id: &str,
    description: String,
) -> NewVersion {
    NewVersion::new(&source.document_id, source.data.clone())
        .with_branch(branch)
        .with_parent(Some(source.id.clone()))
        .with_kind(kind)
        .with_description(Some(description))
        .with_author(Some(user_id.to_string()))
}

impl VersionControl {
    // -----------------------------------------------------------------------
    // Revert
    // -----------------------------------------------------------------------

    /// Restore an earlier state as a new head of the target's branch.
    ///
    /// Nothing is rewritten: the versions after `target_version_id` stay in
    /// place and the new version gets the next number.
    #[tracing::instrument(skip(self, description))]
    pub async fn revert_to_version(
        &self,
        target_version_id: &str,
        user_id: &str,
        description: Option<String>,
    ) -> VcsResult<Version> {
        require_user(user_id)?;
        let target = self.get_version(target_version_id).await?;

        let description = description
            .unwrap_or_else(|| format!("Reverted to version {}", target.version_number));
        let draft = derived_from(
            &target,
            &target.branch_name,
            VersionKind::Reverted,
            user_id,
            description,
        );

        let version = self.store.insert_version(draft).await?;
        info!(
            version_id = %version.id,
            version_number = version.version_number,
            branch = %version.branch_name,
            "reverted"
        );
        Ok(version)
    }

    // -----------------------------------------------------------------------
    // Branch
    // -----------------------------------------------------------------------

    /// Fork a new branch from an existing version. The branch is registered
    /// and seeded with a copy of the source version.
    #[tracing::instrument(skip(self, description))]
    pub async fn create_branch(
        &self,
        from_version_id: &str,
        branch_name: &str,
        user_id: &str,
        description: Option<String>,
    ) -> VcsResult<Version> {
        require_user(user_id)?;
        require_branch_name(branch_name)?;

        let source = self
            .store
            .get_version(from_version_id)
            .await?
            .ok_or_else(|| VcsError::SourceVersionNotFound(from_version_id.to_string()))?;

        let record = BranchRecord::new(&source.document_id, branch_name)
            .with_description(description.clone())
            .with_author(Some(user_id.to_string()));
        let branch = self.store.insert_branch(record).await?;

        let description = description.unwrap_or_else(|| {
            format!(
                "Branched from {} version {}",
                source.branch_name, source.version_number
            )
        });
        let draft = derived_from(
            &source,
            branch_name,
            VersionKind::Branched,
            user_id,
            description,
        )
        .with_guard(HeadGuard::new(None));

        match self.store.insert_version(draft).await {
            Ok(version) => {
                info!(
                    version_id = %version.id,
                    branch_id = %branch.id,
                    from = %source.id,
                    "branch created"
                );
                Ok(version)
            }
            Err(err) => {
                // Leave no empty branch behind, but never take one that
                // another writer has already put a version on.
                match self.store.remove_branch_if_empty(&branch.id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(branch_id = %branch.id, "branch kept, it has a head")
                    }
                    Err(cleanup) => {
                        warn!(branch_id = %branch.id, error = %cleanup, "branch rollback failed")
                    }
                }
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Merge a branch head into `main`.
    pub async fn merge_branch(
        &self,
        branch_head_version_id: &str,
        user_id: &str,
        description: Option<String>,
    ) -> VcsResult<Version> {
        self.merge_branch_into(branch_head_version_id, DEFAULT_BRANCH, user_id, description)
            .await
    }

    /// Overwrite `target_branch` with the content of `source_version_id`.
    ///
    /// There is no three-way merge: the new head's data is the source's data.
    /// The write is guarded on the target head observed here, so a concurrent
    /// writer on the target surfaces as `ConcurrentModification`.
    #[tracing::instrument(skip(self, description))]
    pub async fn merge_branch_into(
        &self,
        source_version_id: &str,
        target_branch: &str,
        user_id: &str,
        description: Option<String>,
    ) -> VcsResult<Version> {
        require_user(user_id)?;
        require_branch_name(target_branch)?;

        let source = self
            .store
            .get_version(source_version_id)
            .await?
            .ok_or_else(|| VcsError::SourceVersionNotFound(source_version_id.to_string()))?;

        let target_head = self
            .store
            .current_version(&source.document_id, target_branch)
            .await?;

        let description = description.unwrap_or_else(|| {
            format!(
                "Merged {} version {} into {}",
                source.branch_name, source.version_number, target_branch
            )
        });
        let draft = derived_from(
            &source,
            target_branch,
            VersionKind::Merged,
            user_id,
            description,
        )
        .with_guard(HeadGuard::new(target_head.map(|v| v.id)));

        let version = self.store.insert_version(draft).await?;
        info!(
            version_id = %version.id,
            version_number = version.version_number,
            from = %source.branch_name,
            "merged"
        );
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::version::{Branch, VersionId};
    use crate::store::{HistoryStore, InMemoryHistoryStore};
    use crate::vcs::CreateVersionOptions;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    /// In-memory store where another writer lands a version on every branch
    /// the moment it is registered.
    struct ContendedBranchStore {
        inner: InMemoryHistoryStore,
    }

    #[async_trait]
    impl HistoryStore for ContendedBranchStore {
        async fn insert_version(&self, draft: NewVersion) -> VcsResult<Version> {
            self.inner.insert_version(draft).await
        }

        async fn get_version(&self, version_id: &str) -> VcsResult<Option<Version>> {
            self.inner.get_version(version_id).await
        }

        async fn latest_version_number(&self, document_id: &str, branch: &str) -> VcsResult<u32> {
            self.inner.latest_version_number(document_id, branch).await
        }

        async fn current_version(
            &self,
            document_id: &str,
            branch: &str,
        ) -> VcsResult<Option<Version>> {
            self.inner.current_version(document_id, branch).await
        }

        async fn document_latest(&self, document_id: &str) -> VcsResult<Option<VersionId>> {
            self.inner.document_latest(document_id).await
        }

        async fn list_versions(&self, document_id: &str) -> VcsResult<Vec<Version>> {
            self.inner.list_versions(document_id).await
        }

        async fn list_branch_versions(
            &self,
            document_id: &str,
            branch: &str,
        ) -> VcsResult<Vec<Version>> {
            self.inner.list_branch_versions(document_id, branch).await
        }

        async fn delete_version(&self, version_id: &str) -> VcsResult<Option<Version>> {
            self.inner.delete_version(version_id).await
        }

        async fn insert_branch(&self, record: BranchRecord) -> VcsResult<Branch> {
            let branch = self.inner.insert_branch(record).await?;
            let other = NewVersion::new(&branch.document_id, json!({"title": "other writer"}))
                .with_branch(branch.name.clone())
                .with_author(Some("bo".to_string()));
            self.inner.insert_version(other).await?;
            Ok(branch)
        }

        async fn get_branch(&self, branch_id: &str) -> VcsResult<Option<Branch>> {
            self.inner.get_branch(branch_id).await
        }

        async fn find_branch(&self, document_id: &str, name: &str) -> VcsResult<Option<Branch>> {
            self.inner.find_branch(document_id, name).await
        }

        async fn list_branches(&self, document_id: &str) -> VcsResult<Vec<Branch>> {
            self.inner.list_branches(document_id).await
        }

        async fn remove_branch(&self, branch_id: &str) -> VcsResult<Option<Branch>> {
            self.inner.remove_branch(branch_id).await
        }

        async fn remove_branch_if_empty(&self, branch_id: &str) -> VcsResult<bool> {
            self.inner.remove_branch_if_empty(branch_id).await
        }

        async fn version_count(&self) -> VcsResult<usize> {
            self.inner.version_count().await
        }
    }

    async fn seeded() -> (VersionControl, Version, Version) {
        let vcs = VersionControl::in_memory();
        let v1 = vcs
            .create_version("doc-1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();
        let v2 = vcs
            .create_version("doc-1", json!({"title": "B"}), Default::default())
            .await
            .unwrap();
        (vcs, v1, v2)
    }

    #[tokio::test]
    async fn test_revert_appends_a_copy() {
        let (vcs, v1, v2) = seeded().await;

        let v3 = vcs.revert_to_version(&v1.id, "ana", None).await.unwrap();
        assert_eq!(v3.version_number, 3);
        assert_eq!(v3.data, v1.data);
        assert_eq!(v3.parent_version_id.as_deref(), Some(v1.id.as_str()));
        assert_eq!(v3.kind, VersionKind::Reverted);
        assert_eq!(v3.change_description.as_deref(), Some("Reverted to version 1"));
        assert!(v3.is_current);

        let old = vcs.get_version(&v2.id).await.unwrap();
        assert_eq!(old.data, json!({"title": "B"}));
        assert!(!old.is_current);
    }

    #[tokio::test]
    async fn test_revert_missing_target() {
        let vcs = VersionControl::in_memory();
        let err = vcs.revert_to_version("ver-gone", "ana", None).await.unwrap_err();
        assert!(matches!(err, VcsError::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn test_revert_stays_on_target_branch() {
        let (vcs, _, v2) = seeded().await;
        let fork = vcs.create_branch(&v2.id, "alt", "ana", None).await.unwrap();
        vcs.create_version(
            "doc-1",
            json!({"title": "alt 2"}),
            CreateVersionOptions::default().on_branch("alt"),
        )
        .await
        .unwrap();

        let reverted = vcs.revert_to_version(&fork.id, "ana", None).await.unwrap();
        assert_eq!(reverted.branch_name, "alt");
        assert_eq!(reverted.version_number, 3);
        assert_eq!(vcs.get_latest_version_number("doc-1", "main").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_branch_seeds_first_version() {
        let (vcs, _, v2) = seeded().await;

        let fork = vcs
            .create_branch(&v2.id, "experiment", "ana", Some("Dark mode".into()))
            .await
            .unwrap();
        assert_eq!(fork.branch_name, "experiment");
        assert_eq!(fork.version_number, 1);
        assert_eq!(fork.parent_version_id.as_deref(), Some(v2.id.as_str()));
        assert_eq!(fork.kind, VersionKind::Branched);
        assert_eq!(fork.data, v2.data);

        let branch = vcs.find_branch("doc-1", "experiment").await.unwrap().unwrap();
        assert_eq!(branch.description.as_deref(), Some("Dark mode"));
        assert_eq!(branch.head_version_id.as_deref(), Some(fork.id.as_str()));
        assert!(vcs.get_version(&v2.id).await.unwrap().is_current);
    }

    #[tokio::test]
    async fn test_create_branch_errors() {
        let (vcs, _, v2) = seeded().await;

        let err = vcs
            .create_branch("ver-gone", "experiment", "ana", None)
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::SourceVersionNotFound(_)));

        let err = vcs.create_branch(&v2.id, "main", "ana", None).await.unwrap_err();
        assert!(matches!(err, VcsError::DuplicateBranch { .. }));

        let err = vcs
            .create_branch(&v2.id, "bad name", "ana", None)
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::Validation(_)));

        assert_eq!(vcs.get_branches("doc-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_create_branch_keeps_other_writers_version() {
        let vcs = VersionControl::new(Arc::new(ContendedBranchStore {
            inner: InMemoryHistoryStore::new(),
        }));
        let v1 = vcs
            .create_version("doc-1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();

        let err = vcs
            .create_branch(&v1.id, "experiment", "ana", None)
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::ConcurrentModification { .. }));

        let branch = vcs.find_branch("doc-1", "experiment").await.unwrap().unwrap();
        let head = vcs
            .get_current_version("doc-1", "experiment")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(branch.head_version_id.as_deref(), Some(head.id.as_str()));
        assert_eq!(branch.version_count, 1);
        assert_eq!(head.created_by.as_deref(), Some("bo"));
        assert!(head.is_current);
    }

    #[tokio::test]
    async fn test_merge_overwrites_main() {
        let (vcs, _, v2) = seeded().await;
        vcs.create_branch(&v2.id, "experiment", "ana", None)
            .await
            .unwrap();
        let head = vcs
            .create_version(
                "doc-1",
                json!({"title": "C", "sections": []}),
                CreateVersionOptions::default().on_branch("experiment"),
            )
            .await
            .unwrap();

        let merged = vcs.merge_branch(&head.id, "ana", None).await.unwrap();
        assert_eq!(merged.branch_name, "main");
        assert_eq!(merged.version_number, 3);
        assert_eq!(merged.data, head.data);
        assert_eq!(merged.parent_version_id.as_deref(), Some(head.id.as_str()));
        assert_eq!(merged.kind, VersionKind::Merged);
        assert_eq!(
            merged.change_description.as_deref(),
            Some("Merged experiment version 2 into main")
        );

        let experiment = vcs.get_current_version("doc-1", "experiment").await.unwrap();
        assert_eq!(experiment.map(|v| v.id), Some(head.id));
    }

    #[tokio::test]
    async fn test_merge_into_other_branch() {
        let (vcs, v1, v2) = seeded().await;
        vcs.create_branch(&v1.id, "release", "ana", None).await.unwrap();

        let merged = vcs
            .merge_branch_into(&v2.id, "release", "ana", None)
            .await
            .unwrap();
        assert_eq!(merged.branch_name, "release");
        assert_eq!(merged.version_number, 2);
        assert_eq!(merged.data, json!({"title": "B"}));
    }

    #[tokio::test]
    async fn test_merge_missing_source() {
        let vcs = VersionControl::in_memory();
        let err = vcs.merge_branch("ver-gone", "ana", None).await.unwrap_err();
        assert!(matches!(err, VcsError::SourceVersionNotFound(_)));
    }

    #[tokio::test]
    async fn test_operations_require_a_user() {
        let (vcs, v1, _) = seeded().await;
        let err = vcs.revert_to_version(&v1.id, "", None).await.unwrap_err();
        assert!(matches!(err, VcsError::Validation(_)));
    }
}
