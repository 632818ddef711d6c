use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::document::WireframeData;

// ---------------------------------------------------------------------------
// Version: immutable snapshots of a wireframe document
// ---------------------------------------------------------------------------

/// Name of the branch every document starts on.
pub const DEFAULT_BRANCH: &str = "main";

/// A version identifier, unique within the history store.
pub type VersionId = String;

/// A branch identifier, unique within the history store.
pub type BranchId = String;

/// Generate a new version ID.
pub fn new_version_id() -> VersionId {
    format!("ver-{}", Uuid::new_v4().as_simple())
}

/// Generate a new branch ID.
pub fn new_branch_id() -> BranchId {
    format!("br-{}", Uuid::new_v4().as_simple())
}

/// Why a version was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionKind {
    /// First version of a branch that was not forked from anything.
    Created,
    /// Ordinary edit on top of the branch head.
    Updated,
    /// Copy of an older version's content.
    Reverted,
    /// First version of a branch forked from another version.
    Branched,
    /// Copy of another branch's head.
    Merged,
}

impl VersionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionKind::Created => "created",
            VersionKind::Updated => "updated",
            VersionKind::Reverted => "reverted",
            VersionKind::Branched => "branched",
            VersionKind::Merged => "merged",
        }
    }
}

impl std::fmt::Display for VersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable version of a document.
///
/// Parent links are plain ids, so the history of a document is an arena of
/// versions forming a DAG across branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Unique version identifier.
    pub id: VersionId,
    /// The document this version belongs to.
    pub document_id: String,
    /// Branch this version is attached to.
    pub branch_name: String,
    /// 1-based sequence number within `(document_id, branch_name)`.
    pub version_number: u32,
    /// Version this one was derived from (revert source, fork point, merge source
    /// or previous head).
    pub parent_version_id: Option<VersionId>,
    /// Why the version exists.
    pub kind: VersionKind,
    /// Full document snapshot.
    pub data: WireframeData,
    /// Free-text annotation.
    pub change_description: Option<String>,
    /// When the version was recorded.
    pub created_at: DateTime<Utc>,
    /// Who made the change.
    pub created_by: Option<String>,
    /// Whether this version is the head of its branch.
    pub is_current: bool,
}

/// Optimistic-concurrency expectation on a branch head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadGuard {
    /// Head the caller observed; `None` means "the branch was empty".
    pub expected_head: Option<VersionId>,
}

impl HeadGuard {
    pub fn new(expected_head: Option<VersionId>) -> Self {
        Self { expected_head }
    }

    /// Whether `actual` satisfies the guard.
    pub fn matches(&self, actual: Option<&VersionId>) -> bool {
        self.expected_head.as_ref() == actual
    }
}

/// A version as handed to the store. The store assigns the number and the
/// head flag atomically.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub id: VersionId,
    pub document_id: String,
    pub branch_name: String,
    pub parent_version_id: Option<VersionId>,
    pub kind: VersionKind,
    pub data: WireframeData,
    pub change_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    /// Reject the insert if the branch head moved.
    pub guard: Option<HeadGuard>,
}

impl NewVersion {
    /// Start a new version on the default branch.
    pub fn new(document_id: impl Into<String>, data: WireframeData) -> Self {
        Self {
            id: new_version_id(),
            document_id: document_id.into(),
            branch_name: DEFAULT_BRANCH.to_string(),
            parent_version_id: None,
            kind: VersionKind::Updated,
            data,
            change_description: None,
            created_at: Utc::now(),
            created_by: None,
            guard: None,
        }
    }

    /// Set the branch for this version.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch_name = branch.into();
        self
    }

    /// Set the parent version.
    pub fn with_parent(mut self, parent: Option<VersionId>) -> Self {
        self.parent_version_id = parent;
        self
    }

    /// Set why the version is being created.
    pub fn with_kind(mut self, kind: VersionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the change description.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.change_description = description;
        self
    }

    /// Set the author.
    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.created_by = author;
        self
    }

    /// Require the branch head to still be `expected_head` at write time.
    pub fn with_guard(mut self, guard: HeadGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Materialise the stored record once the store has picked a number.
    pub fn into_version(self, version_number: u32) -> Version {
        Version {
            id: self.id,
            document_id: self.document_id,
            branch_name: self.branch_name,
            version_number,
            parent_version_id: self.parent_version_id,
            kind: self.kind,
            data: self.data,
            change_description: self.change_description,
            created_at: self.created_at,
            created_by: self.created_by,
            is_current: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Branch: named version streams per document
// ---------------------------------------------------------------------------

/// Stored branch metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: BranchId,
    pub document_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl BranchRecord {
    pub fn new(document_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_branch_id(),
            document_id: document_id.into(),
            name: name.into(),
            description: None,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.created_by = author;
        self
    }

    /// Attach the read-time derived fields.
    pub fn into_branch(self, head_version_id: Option<VersionId>, version_count: usize) -> Branch {
        Branch {
            id: self.id,
            document_id: self.document_id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            created_by: self.created_by,
            head_version_id,
            version_count,
        }
    }
}

/// A branch as seen by callers: the stored record plus its current head and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Unique branch identifier.
    pub id: BranchId,
    /// Document the branch belongs to.
    pub document_id: String,
    /// Branch name (e.g. "main", "experiment").
    pub name: String,
    pub description: Option<String>,
    /// When the branch was registered.
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    /// Current version on this branch, if any.
    pub head_version_id: Option<VersionId>,
    /// Number of live versions on this branch.
    pub version_count: usize,
}

impl Branch {
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_BRANCH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_are_prefixed_and_unique() {
        let a = new_version_id();
        let b = new_version_id();
        assert!(a.starts_with("ver-"));
        assert_ne!(a, b);
        assert!(new_branch_id().starts_with("br-"));
    }

    #[test]
    fn test_new_version_defaults_to_main() {
        let draft = NewVersion::new("doc-1", json!({"title": "A"}));
        assert_eq!(draft.branch_name, DEFAULT_BRANCH);
        assert!(draft.parent_version_id.is_none());

        let version = draft.into_version(1);
        assert_eq!(version.version_number, 1);
        assert!(version.is_current);
    }

    #[test]
    fn test_head_guard_matches() {
        let guard = HeadGuard::new(Some("ver-a".into()));
        assert!(guard.matches(Some(&"ver-a".to_string())));
        assert!(!guard.matches(None));
        assert!(HeadGuard::new(None).matches(None));
    }

    #[test]
    fn test_version_kind_serializes_snake_case() {
        let value = serde_json::to_value(VersionKind::Reverted).unwrap();
        assert_eq!(value, json!("reverted"));
    }
}
