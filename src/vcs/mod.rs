//! Version-control operations over a [`HistoryStore`].
//!
//! `VersionControl` is the surface the editor talks to. It validates input,
//! composes store calls into the user-facing operations (revert, branch,
//! merge) and serves history and comparison queries. It keeps no state of its
//! own besides the store handle, so it can be shared freely behind an `Arc`.

use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};
use validator::{Validate, ValidationError};

use crate::config::{AppConfig, StorageBackend};
use crate::diff::DiffOptions;
use crate::error::{VcsError, VcsResult};
use crate::model::document::{validate_document, WireframeData};
use crate::model::version::{
    HeadGuard, NewVersion, Version, VersionId, VersionKind, DEFAULT_BRANCH,
};
use crate::store::{HistoryStore, InMemoryHistoryStore, SurrealHistoryStore};

pub mod branches;
pub mod compare;
pub mod history;
pub mod operations;

pub use branches::BranchOptions;
pub use compare::Comparison;
pub use history::VersionHistory;

const MAX_BRANCH_NAME: usize = 100;

/// Options for [`VersionControl::create_version`].
#[derive(Debug, Clone, Default, Validate, Deserialize)]
pub struct CreateVersionOptions {
    /// Why the version was created.
    #[validate(length(max = 1000))]
    pub change_description: Option<String>,
    /// Explicit parent; defaults to the branch head.
    pub parent_version_id: Option<VersionId>,
    /// Target branch; defaults to `main`.
    #[validate(custom(function = "validate_branch_name"))]
    pub branch_name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub created_by: Option<String>,
    /// Reject the write if the branch head is no longer this version.
    #[serde(skip)]
    pub guard: Option<HeadGuard>,
}

impl CreateVersionOptions {
    pub fn description(description: impl Into<String>) -> Self {
        Self {
            change_description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch_name = Some(branch.into());
        self
    }

    pub fn by(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<VersionId>) -> Self {
        self.parent_version_id = Some(parent.into());
        self
    }

    pub fn expecting_head(mut self, head: Option<VersionId>) -> Self {
        self.guard = Some(HeadGuard::new(head));
        self
    }
}

/// Branch names: 1-100 characters from `[A-Za-z0-9._/-]`, no leading or
/// trailing `/`, no `..`.
pub fn validate_branch_name(name: &str) -> Result<(), ValidationError> {
    let invalid = |message: &'static str| {
        let mut error = ValidationError::new("branch_name");
        error.message = Some(Cow::Borrowed(message));
        Err(error)
    };

    if name.is_empty() || name.chars().count() > MAX_BRANCH_NAME {
        return invalid("branch name must be 1-100 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return invalid("branch name may only contain letters, digits, '-', '_', '.', '/'");
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("..") {
        return invalid("branch name has a malformed path");
    }
    Ok(())
}

fn require_document_id(document_id: &str) -> VcsResult<()> {
    if document_id.trim().is_empty() {
        return Err(VcsError::Validation("document id must not be empty".to_string()));
    }
    Ok(())
}

/// Version-control facade over a history store.
#[derive(Clone)]
pub struct VersionControl {
    store: Arc<dyn HistoryStore>,
    diff_options: DiffOptions,
}

impl VersionControl {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            store,
            diff_options: DiffOptions::default(),
        }
    }

    /// Facade over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryHistoryStore::new()))
    }

    /// Build the facade described by the configuration, connecting to
    /// SurrealDB when that backend is selected.
    pub async fn from_config(config: &AppConfig) -> VcsResult<Self> {
        let store: Arc<dyn HistoryStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryHistoryStore::new()),
            StorageBackend::Surreal => {
                let db = config
                    .storage
                    .database_config()?
                    .connect()
                    .await
                    .map_err(|e| VcsError::Storage(format!("Failed to connect: {}", e)))?;
                Arc::new(SurrealHistoryStore::new(Arc::new(db)))
            }
        };
        Ok(Self::new(store).with_diff_options(config.diff.options()))
    }

    /// Use these options for every comparison.
    pub fn with_diff_options(mut self, options: DiffOptions) -> Self {
        self.diff_options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    pub fn diff_options(&self) -> &DiffOptions {
        &self.diff_options
    }

    // -----------------------------------------------------------------------
    // Version store operations
    // -----------------------------------------------------------------------

    /// Record a new snapshot as the head of a branch.
    ///
    /// Without an explicit parent the current head becomes the parent. The
    /// numbering and head flip are atomic in the store, so concurrent callers
    /// never share a number; pass a guard to turn a moved head into
    /// `ConcurrentModification` instead.
    #[tracing::instrument(skip(self, data, options), fields(branch = tracing::field::Empty))]
    pub async fn create_version(
        &self,
        document_id: &str,
        data: WireframeData,
        options: CreateVersionOptions,
    ) -> VcsResult<Version> {
        require_document_id(document_id)?;
        options.validate()?;
        validate_document(&data)?;

        let branch = options
            .branch_name
            .clone()
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        tracing::Span::current().record("branch", branch.as_str());

        let head = self.store.current_version(document_id, &branch).await?;
        let kind = if head.is_none() && options.parent_version_id.is_none() {
            VersionKind::Created
        } else {
            VersionKind::Updated
        };
        let parent = options
            .parent_version_id
            .or_else(|| head.map(|h| h.id));

        let mut draft = NewVersion::new(document_id, data)
            .with_branch(branch)
            .with_parent(parent)
            .with_kind(kind)
            .with_description(options.change_description)
            .with_author(options.created_by);
        if let Some(guard) = options.guard {
            draft = draft.with_guard(guard);
        }

        let version = self.store.insert_version(draft).await?;
        info!(
            version_id = %version.id,
            version_number = version.version_number,
            kind = %version.kind,
            "version created"
        );
        Ok(version)
    }

    /// Get a version by ID.
    pub async fn get_version(&self, version_id: &str) -> VcsResult<Version> {
        debug!(version_id, "get version");
        self.store
            .get_version(version_id)
            .await?
            .ok_or_else(|| VcsError::VersionNotFound(version_id.to_string()))
    }

    /// Highest version number on a branch, 0 for an empty branch.
    pub async fn get_latest_version_number(
        &self,
        document_id: &str,
        branch: &str,
    ) -> VcsResult<u32> {
        self.store.latest_version_number(document_id, branch).await
    }

    /// Head of a branch, if it has any versions.
    pub async fn get_current_version(
        &self,
        document_id: &str,
        branch: &str,
    ) -> VcsResult<Option<Version>> {
        self.store.current_version(document_id, branch).await
    }

    /// Look a version up by its number on a branch.
    pub async fn get_version_by_number(
        &self,
        document_id: &str,
        branch: &str,
        version_number: u32,
    ) -> VcsResult<Version> {
        self.store
            .list_branch_versions(document_id, branch)
            .await?
            .into_iter()
            .find(|v| v.version_number == version_number)
            .ok_or_else(|| {
                VcsError::VersionNotFound(format!(
                    "{}@{}#{}",
                    document_id, branch, version_number
                ))
            })
    }

    /// Delete a version. Siblings keep their numbers; if the version was the
    /// head, the highest remaining version on its branch takes over.
    #[tracing::instrument(skip(self))]
    pub async fn delete_version(
        &self,
        version_id: &str,
        deleted_by: Option<&str>,
    ) -> VcsResult<bool> {
        let removed = self
            .store
            .delete_version(version_id)
            .await?
            .ok_or_else(|| VcsError::VersionNotFound(version_id.to_string()))?;

        info!(
            target: "wireframe_vcs::audit",
            version_id = %removed.id,
            document_id = %removed.document_id,
            branch = %removed.branch_name,
            version_number = removed.version_number,
            was_current = removed.is_current,
            deleted_by = deleted_by.unwrap_or("unknown"),
            "version deleted"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_branch_name_rules() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("feature/hero-v2").is_ok());
        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("has space").is_err());
        assert!(validate_branch_name("/lead").is_err());
        assert!(validate_branch_name("a..b").is_err());
        assert!(validate_branch_name(&"x".repeat(101)).is_err());
    }

    #[tokio::test]
    async fn test_create_version_defaults() {
        let vcs = VersionControl::in_memory();

        let v1 = vcs
            .create_version("doc-1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();
        assert_eq!(v1.branch_name, "main");
        assert_eq!(v1.kind, VersionKind::Created);
        assert!(v1.parent_version_id.is_none());

        let v2 = vcs
            .create_version(
                "doc-1",
                json!({"title": "B"}),
                CreateVersionOptions::description("Rename").by("ana"),
            )
            .await
            .unwrap();
        assert_eq!(v2.kind, VersionKind::Updated);
        assert_eq!(v2.parent_version_id, Some(v1.id));
        assert_eq!(v2.change_description.as_deref(), Some("Rename"));
        assert_eq!(v2.created_by.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn test_create_version_validates_before_writing() {
        let vcs = VersionControl::in_memory();

        let err = vcs
            .create_version("doc-1", json!("not a document"), Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::Validation(_)));

        let err = vcs
            .create_version(
                "doc-1",
                json!({}),
                CreateVersionOptions::default().on_branch("bad name"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::Validation(_)));

        let err = vcs
            .create_version(" ", json!({}), Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::Validation(_)));

        assert_eq!(vcs.store().version_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_version_not_found() {
        let vcs = VersionControl::in_memory();
        let err = vcs.get_version("ver-nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_version_by_number() {
        let vcs = VersionControl::in_memory();
        vcs.create_version("doc-1", json!({"title": "A"}), Default::default())
            .await
            .unwrap();
        let v2 = vcs
            .create_version("doc-1", json!({"title": "B"}), Default::default())
            .await
            .unwrap();

        let found = vcs.get_version_by_number("doc-1", "main", 2).await.unwrap();
        assert_eq!(found.id, v2.id);
        assert!(vcs.get_version_by_number("doc-1", "main", 3).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_version() {
        let vcs = VersionControl::in_memory();
        let v1 = vcs
            .create_version("doc-1", json!({}), Default::default())
            .await
            .unwrap();

        assert!(vcs.delete_version(&v1.id, Some("admin")).await.unwrap());
        assert!(vcs.delete_version(&v1.id, None).await.unwrap_err().is_not_found());
        assert_eq!(vcs.get_latest_version_number("doc-1", "main").await.unwrap(), 0);
    }
}
