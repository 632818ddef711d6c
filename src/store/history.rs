use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{VcsError, VcsResult};
use crate::model::version::{
    Branch, BranchId, BranchRecord, NewVersion, Version, VersionId, DEFAULT_BRANCH,
};

// ---------------------------------------------------------------------------
// HistoryStore trait: interface for version and branch persistence
// ---------------------------------------------------------------------------

/// Trait for storage backends holding versions and branches.
///
/// `insert_version` is the only write path for versions and must be atomic:
/// numbering, the head flip and the insert happen as one step, or not at all.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert a version as the new head of its branch.
    ///
    /// The number is `1 + max(existing numbers)` for the `(document, branch)`
    /// pair. Every other version of the pair loses `is_current`. An unknown
    /// branch name is registered, together with the default branch when the
    /// document has none yet, and a version on the default branch updates
    /// the document's latest-version pointer. A guard that does not match the
    /// current head rejects the write with `ConcurrentModification`.
    async fn insert_version(&self, draft: NewVersion) -> VcsResult<Version>;

    /// Get a version by ID.
    async fn get_version(&self, version_id: &str) -> VcsResult<Option<Version>>;

    /// Highest version number on a branch, 0 when the branch is empty.
    async fn latest_version_number(&self, document_id: &str, branch: &str) -> VcsResult<u32>;

    /// The head of a branch.
    async fn current_version(&self, document_id: &str, branch: &str)
        -> VcsResult<Option<Version>>;

    /// Denormalised pointer to the head of the document's default branch.
    async fn document_latest(&self, document_id: &str) -> VcsResult<Option<VersionId>>;

    /// All versions of a document in creation order.
    async fn list_versions(&self, document_id: &str) -> VcsResult<Vec<Version>>;

    /// Versions of one branch ordered by version number.
    async fn list_branch_versions(&self, document_id: &str, branch: &str)
        -> VcsResult<Vec<Version>>;

    /// Remove a version. If it was the head, the highest remaining version on
    /// its branch becomes current. Returns the removed version.
    async fn delete_version(&self, version_id: &str) -> VcsResult<Option<Version>>;

    /// Register a branch; `DuplicateBranch` if the name is taken for the document.
    async fn insert_branch(&self, record: BranchRecord) -> VcsResult<Branch>;

    /// Get a branch by ID.
    async fn get_branch(&self, branch_id: &str) -> VcsResult<Option<Branch>>;

    /// Get a branch by document and name.
    async fn find_branch(&self, document_id: &str, name: &str) -> VcsResult<Option<Branch>>;

    /// Branches of a document: the default branch first, then by creation
    /// time and name.
    async fn list_branches(&self, document_id: &str) -> VcsResult<Vec<Branch>>;

    /// Unregister a branch. Its versions stay addressable by ID but none of
    /// them remains current.
    async fn remove_branch(&self, branch_id: &str) -> VcsResult<Option<Branch>>;

    /// Unregister a branch only while it has no head. The check and the
    /// removal happen as one step. Returns whether the branch was removed.
    async fn remove_branch_if_empty(&self, branch_id: &str) -> VcsResult<bool>;

    /// Total number of version records.
    async fn version_count(&self) -> VcsResult<usize>;
}

// ---------------------------------------------------------------------------
// InMemoryHistoryStore: arena of versions behind a single lock
// ---------------------------------------------------------------------------

/// Default branch first, then creation time, then name.
pub(crate) fn sort_branches(branches: &mut [Branch]) {
    branches.sort_by(|a, b| {
        b.is_default()
            .cmp(&a.is_default())
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.name.cmp(&b.name))
    });
}

type BranchKey = (String, String);

fn branch_key(document_id: &str, branch: &str) -> BranchKey {
    (document_id.to_string(), branch.to_string())
}

#[derive(Default)]
struct HistoryState {
    versions: HashMap<VersionId, Version>,
    /// Creation order across all documents.
    order: Vec<VersionId>,
    /// Versions per branch, in number order.
    branch_versions: HashMap<BranchKey, Vec<VersionId>>,
    heads: HashMap<BranchKey, VersionId>,
    branches: HashMap<BranchId, BranchRecord>,
    branch_names: HashMap<BranchKey, BranchId>,
    document_latest: HashMap<String, VersionId>,
}

impl HistoryState {
    fn describe(&self, record: &BranchRecord) -> Branch {
        let key = branch_key(&record.document_id, &record.name);
        let head = self.heads.get(&key).cloned();
        let count = self.branch_versions.get(&key).map_or(0, Vec::len);
        record.clone().into_branch(head, count)
    }

    fn max_number(&self, key: &BranchKey) -> u32 {
        self.branch_versions
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.versions.get(id))
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
    }
}

/// In-memory history store. A single `RwLock` guards all indexes so every
/// write is atomic with respect to concurrent callers.
pub struct InMemoryHistoryStore {
    state: RwLock<HistoryState>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HistoryState::default()),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn insert_version(&self, draft: NewVersion) -> VcsResult<Version> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let key = branch_key(&draft.document_id, &draft.branch_name);
        let actual_head = state.heads.get(&key).cloned();

        if let Some(head_guard) = &draft.guard {
            if !head_guard.matches(actual_head.as_ref()) {
                return Err(VcsError::ConcurrentModification {
                    document_id: draft.document_id.clone(),
                    branch: draft.branch_name.clone(),
                    expected: head_guard.expected_head.clone(),
                    actual: actual_head,
                });
            }
        }

        // Verify parent version exists if specified
        if let Some(parent) = &draft.parent_version_id {
            if !state.versions.contains_key(parent) {
                return Err(VcsError::VersionNotFound(parent.clone()));
            }
        }

        let number = state.max_number(&key) + 1;
        let author = draft.created_by.clone();
        let version = draft.into_version(number);

        if let Some(previous) = actual_head {
            if let Some(previous) = state.versions.get_mut(&previous) {
                previous.is_current = false;
            }
        }

        // The default branch exists once the document has any version.
        for name in [DEFAULT_BRANCH, version.branch_name.as_str()] {
            let registered = branch_key(&version.document_id, name);
            if !state.branch_names.contains_key(&registered) {
                let record =
                    BranchRecord::new(&version.document_id, name).with_author(author.clone());
                state.branch_names.insert(registered, record.id.clone());
                state.branches.insert(record.id.clone(), record);
            }
        }

        if version.branch_name == DEFAULT_BRANCH {
            state
                .document_latest
                .insert(version.document_id.clone(), version.id.clone());
        }

        state.heads.insert(key.clone(), version.id.clone());
        state
            .branch_versions
            .entry(key)
            .or_default()
            .push(version.id.clone());
        state.order.push(version.id.clone());
        state.versions.insert(version.id.clone(), version.clone());

        Ok(version)
    }

    async fn get_version(&self, version_id: &str) -> VcsResult<Option<Version>> {
        let state = self.state.read().await;
        Ok(state.versions.get(version_id).cloned())
    }

    async fn latest_version_number(&self, document_id: &str, branch: &str) -> VcsResult<u32> {
        let state = self.state.read().await;
        Ok(state.max_number(&branch_key(document_id, branch)))
    }

    async fn current_version(
        &self,
        document_id: &str,
        branch: &str,
    ) -> VcsResult<Option<Version>> {
        let state = self.state.read().await;
        Ok(state
            .heads
            .get(&branch_key(document_id, branch))
            .and_then(|id| state.versions.get(id))
            .cloned())
    }

    async fn document_latest(&self, document_id: &str) -> VcsResult<Option<VersionId>> {
        let state = self.state.read().await;
        Ok(state.document_latest.get(document_id).cloned())
    }

    async fn list_versions(&self, document_id: &str) -> VcsResult<Vec<Version>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.versions.get(id))
            .filter(|v| v.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn list_branch_versions(
        &self,
        document_id: &str,
        branch: &str,
    ) -> VcsResult<Vec<Version>> {
        let state = self.state.read().await;
        let mut versions: Vec<Version> = state
            .branch_versions
            .get(&branch_key(document_id, branch))
            .into_iter()
            .flatten()
            .filter_map(|id| state.versions.get(id))
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn delete_version(&self, version_id: &str) -> VcsResult<Option<Version>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(removed) = state.versions.remove(version_id) else {
            return Ok(None);
        };
        let key = branch_key(&removed.document_id, &removed.branch_name);

        state.order.retain(|id| id != version_id);
        if let Some(ids) = state.branch_versions.get_mut(&key) {
            ids.retain(|id| id != version_id);
        }

        if state.heads.get(&key).map(String::as_str) == Some(version_id) {
            state.heads.remove(&key);
            let promoted = state
                .branch_versions
                .get(&key)
                .into_iter()
                .flatten()
                .filter_map(|id| state.versions.get(id))
                .max_by_key(|v| v.version_number)
                .map(|v| v.id.clone());
            if let Some(promoted) = promoted {
                if let Some(version) = state.versions.get_mut(&promoted) {
                    version.is_current = true;
                }
                state.heads.insert(key.clone(), promoted);
            }
        }

        if state.document_latest.get(&removed.document_id).map(String::as_str) == Some(version_id)
        {
            let main_key = branch_key(&removed.document_id, DEFAULT_BRANCH);
            match state.heads.get(&main_key).cloned() {
                Some(head) => {
                    state.document_latest.insert(removed.document_id.clone(), head);
                }
                None => {
                    state.document_latest.remove(&removed.document_id);
                }
            }
        }

        Ok(Some(removed))
    }

    async fn insert_branch(&self, record: BranchRecord) -> VcsResult<Branch> {
        let mut state = self.state.write().await;
        let key = branch_key(&record.document_id, &record.name);

        if state.branch_names.contains_key(&key) {
            return Err(VcsError::DuplicateBranch {
                document_id: record.document_id,
                name: record.name,
            });
        }

        state.branch_names.insert(key, record.id.clone());
        state.branches.insert(record.id.clone(), record.clone());
        Ok(state.describe(&record))
    }

    async fn get_branch(&self, branch_id: &str) -> VcsResult<Option<Branch>> {
        let state = self.state.read().await;
        Ok(state.branches.get(branch_id).map(|r| state.describe(r)))
    }

    async fn find_branch(&self, document_id: &str, name: &str) -> VcsResult<Option<Branch>> {
        let state = self.state.read().await;
        Ok(state
            .branch_names
            .get(&branch_key(document_id, name))
            .and_then(|id| state.branches.get(id))
            .map(|r| state.describe(r)))
    }

    async fn list_branches(&self, document_id: &str) -> VcsResult<Vec<Branch>> {
        let state = self.state.read().await;
        let mut branches: Vec<Branch> = state
            .branches
            .values()
            .filter(|r| r.document_id == document_id)
            .map(|r| state.describe(r))
            .collect();
        sort_branches(&mut branches);
        Ok(branches)
    }

    async fn remove_branch(&self, branch_id: &str) -> VcsResult<Option<Branch>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(record) = state.branches.get(branch_id).cloned() else {
            return Ok(None);
        };
        let described = state.describe(&record);
        let key = branch_key(&record.document_id, &record.name);

        state.branches.remove(branch_id);
        state.branch_names.remove(&key);
        if let Some(head) = state.heads.remove(&key) {
            if let Some(version) = state.versions.get_mut(&head) {
                version.is_current = false;
            }
        }

        Ok(Some(described))
    }

    async fn remove_branch_if_empty(&self, branch_id: &str) -> VcsResult<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(record) = state.branches.get(branch_id) else {
            return Ok(false);
        };
        let key = branch_key(&record.document_id, &record.name);
        if state.heads.contains_key(&key) {
            return Ok(false);
        }

        state.branches.remove(branch_id);
        state.branch_names.remove(&key);
        Ok(true)
    }

    async fn version_count(&self) -> VcsResult<usize> {
        let state = self.state.read().await;
        Ok(state.versions.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
