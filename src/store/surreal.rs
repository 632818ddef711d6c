//! SurrealDB-backed history store.
//!
//! Snapshots are stored as JSON text so numbers and nested objects come back
//! exactly as the editor wrote them. Every version insert runs as a single
//! transaction, and a UNIQUE index on `(document_id, branch_name,
//! version_number)` rejects duplicate numbers from writers on other
//! connections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::VcsDatabase;
use crate::error::{VcsError, VcsResult};
use crate::model::version::{
    new_branch_id, Branch, BranchRecord, NewVersion, Version, VersionId, VersionKind,
    DEFAULT_BRANCH,
};
use crate::store::history::{sort_branches, HistoryStore};

/// Marker thrown inside the insert transaction when the head moved.
const HEAD_MOVED: &str = "wireframe-vcs: branch head moved";
/// Fragment of SurrealDB's unique-index violation message.
const INDEX_CONFLICT: &str = "already contains";
/// Fragment of SurrealDB's optimistic transaction conflict message.
const TX_CONFLICT: &str = "can be retried";

const INSERT_VERSION: &str = "
BEGIN TRANSACTION;
LET $heads = (SELECT VALUE version_id FROM version WHERE document_id = $document_id AND branch_name = $branch_name AND is_current = true);
IF $check_head AND $heads != $expected_heads { THROW 'wireframe-vcs: branch head moved'; };
LET $numbers = (SELECT VALUE version_number FROM version WHERE document_id = $document_id AND branch_name = $branch_name);
LET $number = math::max(array::push($numbers, 0)) + 1;
UPDATE version SET is_current = false WHERE document_id = $document_id AND branch_name = $branch_name AND is_current = true;
CREATE type::thing('version', $version_id) CONTENT {
    version_id: $version_id,
    document_id: $document_id,
    branch_name: $branch_name,
    version_number: $number,
    parent_version_id: $parent_version_id,
    kind: $kind,
    data: $data,
    change_description: $change_description,
    created_at: $created_at,
    created_by: $created_by,
    is_current: true
};
LET $registered = (SELECT VALUE branch_id FROM branch WHERE document_id = $document_id AND name = $branch_name);
IF array::len($registered) = 0 {
    CREATE type::thing('branch', $branch_id) CONTENT {
        branch_id: $branch_id,
        document_id: $document_id,
        name: $branch_name,
        created_at: $created_at,
        created_by: $created_by
    };
};
LET $main = (SELECT VALUE branch_id FROM branch WHERE document_id = $document_id AND name = $default_branch);
IF $branch_name != $default_branch AND array::len($main) = 0 {
    CREATE type::thing('branch', $main_branch_id) CONTENT {
        branch_id: $main_branch_id,
        document_id: $document_id,
        name: $default_branch,
        created_at: $created_at,
        created_by: $created_by
    };
};
IF $branch_name = $default_branch {
    UPSERT type::thing('document', $document_id) CONTENT {
        document_id: $document_id,
        latest_version_id: $version_id
    };
};
COMMIT TRANSACTION;
";

const DELETE_VERSION: &str = "
BEGIN TRANSACTION;
DELETE type::thing('version', $version_id);
LET $top = math::max(array::push((SELECT VALUE version_number FROM version WHERE document_id = $document_id AND branch_name = $branch_name), 0));
IF $was_current {
    UPDATE version SET is_current = true WHERE document_id = $document_id AND branch_name = $branch_name AND version_number = $top;
};
IF $branch_name = $default_branch {
    LET $head = (SELECT VALUE version_id FROM version WHERE document_id = $document_id AND branch_name = $branch_name AND is_current = true);
    UPSERT type::thing('document', $document_id) CONTENT {
        document_id: $document_id,
        latest_version_id: $head[0]
    };
};
COMMIT TRANSACTION;
";

const REMOVE_BRANCH: &str = "
BEGIN TRANSACTION;
DELETE type::thing('branch', $branch_id);
UPDATE version SET is_current = false WHERE document_id = $document_id AND branch_name = $name AND is_current = true;
COMMIT TRANSACTION;
";

const REMOVE_EMPTY_BRANCH: &str = "
BEGIN TRANSACTION;
LET $heads = (SELECT VALUE version_id FROM version WHERE document_id = $document_id AND branch_name = $name AND is_current = true);
IF array::len($heads) = 0 {
    DELETE type::thing('branch', $branch_id);
};
COMMIT TRANSACTION;
";

const BRANCH_STATE: &str = "
SELECT VALUE version_id FROM version WHERE document_id = $document_id AND branch_name = $name AND is_current = true;
SELECT VALUE version_id FROM version WHERE document_id = $document_id AND branch_name = $name;
";

/// Record structure for storing versions in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionRecord {
    version_id: String,
    document_id: String,
    branch_name: String,
    version_number: i64,
    parent_version_id: Option<String>,
    kind: VersionKind,
    data: String,
    change_description: Option<String>,
    created_at: DateTime<Utc>,
    created_by: Option<String>,
    is_current: bool,
}

impl VersionRecord {
    fn into_version(self) -> VcsResult<Version> {
        let version_number = u32::try_from(self.version_number).map_err(|_| {
            VcsError::Storage(format!(
                "version {} has invalid number {}",
                self.version_id, self.version_number
            ))
        })?;
        Ok(Version {
            id: self.version_id,
            document_id: self.document_id,
            branch_name: self.branch_name,
            version_number,
            parent_version_id: self.parent_version_id,
            kind: self.kind,
            data: serde_json::from_str(&self.data)?,
            change_description: self.change_description,
            created_at: self.created_at,
            created_by: self.created_by,
            is_current: self.is_current,
        })
    }
}

/// Record structure for storing branches in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BranchRow {
    branch_id: String,
    document_id: String,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    created_by: Option<String>,
}

impl From<BranchRow> for BranchRecord {
    fn from(row: BranchRow) -> Self {
        BranchRecord {
            id: row.branch_id,
            document_id: row.document_id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            created_by: row.created_by,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

/// Whether a failed write lost a race with another writer.
fn is_write_conflict(message: &str) -> bool {
    [HEAD_MOVED, INDEX_CONFLICT, TX_CONFLICT]
        .iter()
        .any(|marker| message.contains(marker))
}

fn storage(context: &str) -> impl Fn(surrealdb::Error) -> VcsError + '_ {
    move |e| VcsError::Storage(format!("{}: {}", context, e))
}

/// SurrealDB-backed history store.
#[derive(Clone)]
pub struct SurrealHistoryStore {
    db: Arc<VcsDatabase>,
}

impl SurrealHistoryStore {
    /// Create a new SurrealDB history store.
    pub fn new(db: Arc<VcsDatabase>) -> Self {
        Self { db }
    }

    async fn fetch_versions(
        &self,
        sql: &'static str,
        bindings: Vec<(&'static str, String)>,
    ) -> VcsResult<Vec<Version>> {
        let mut query = self.db.inner().query(sql);
        for binding in bindings {
            query = query.bind(binding);
        }
        let mut response = query.await.map_err(storage("Failed to query versions"))?;
        let records: Vec<VersionRecord> = response
            .take(0)
            .map_err(storage("Failed to parse versions"))?;
        records.into_iter().map(VersionRecord::into_version).collect()
    }

    async fn fetch_branches(
        &self,
        sql: &'static str,
        bindings: Vec<(&'static str, String)>,
    ) -> VcsResult<Vec<BranchRecord>> {
        let mut query = self.db.inner().query(sql);
        for binding in bindings {
            query = query.bind(binding);
        }
        let mut response = query.await.map_err(storage("Failed to query branches"))?;
        let rows: Vec<BranchRow> = response
            .take(0)
            .map_err(storage("Failed to parse branches"))?;
        Ok(rows.into_iter().map(BranchRecord::from).collect())
    }

    async fn current_head_id(&self, document_id: &str, branch: &str) -> VcsResult<Option<VersionId>> {
        Ok(self
            .current_version(document_id, branch)
            .await?
            .map(|v| v.id))
    }

    async fn describe(&self, record: BranchRecord) -> VcsResult<Branch> {
        let mut response = self
            .db
            .inner()
            .query(BRANCH_STATE)
            .bind(("document_id", record.document_id.clone()))
            .bind(("name", record.name.clone()))
            .await
            .map_err(storage("Failed to read branch state"))?;
        let heads: Vec<String> = response
            .take(0)
            .map_err(storage("Failed to parse branch head"))?;
        let members: Vec<String> = response
            .take(1)
            .map_err(storage("Failed to parse branch versions"))?;
        Ok(record.into_branch(heads.into_iter().next(), members.len()))
    }
}

#[async_trait]
impl HistoryStore for SurrealHistoryStore {
    async fn insert_version(&self, draft: NewVersion) -> VcsResult<Version> {
        // Verify parent version exists if specified
        if let Some(parent) = &draft.parent_version_id {
            if self.get_version(parent).await?.is_none() {
                return Err(VcsError::VersionNotFound(parent.clone()));
            }
        }

        let (check_head, expected_heads) = match &draft.guard {
            Some(guard) => (true, guard.expected_head.iter().cloned().collect::<Vec<_>>()),
            None => (false, Vec::new()),
        };
        let data = serde_json::to_string(&draft.data)?;

        let response = self
            .db
            .inner()
            .query(INSERT_VERSION)
            .bind(("default_branch", DEFAULT_BRANCH))
            .bind(("check_head", check_head))
            .bind(("expected_heads", expected_heads))
            .bind(("version_id", draft.id.clone()))
            .bind(("branch_id", new_branch_id()))
            .bind(("main_branch_id", new_branch_id()))
            .bind(("document_id", draft.document_id.clone()))
            .bind(("branch_name", draft.branch_name.clone()))
            .bind(("parent_version_id", draft.parent_version_id.clone()))
            .bind(("kind", draft.kind))
            .bind(("data", data))
            .bind(("change_description", draft.change_description.clone()))
            .bind(("created_at", draft.created_at))
            .bind(("created_by", draft.created_by.clone()))
            .await;

        // A conflict can surface either as a statement error or as a failed
        // commit of the whole query.
        let message = match response {
            Ok(mut response) => {
                let mut errors: Vec<(usize, String)> = response
                    .take_errors()
                    .into_iter()
                    .map(|(i, e)| (i, e.to_string()))
                    .collect();
                if errors.is_empty() {
                    return self.get_version(&draft.id).await?.ok_or_else(|| {
                        VcsError::Storage(format!("Version {} vanished after insert", draft.id))
                    });
                }
                errors.sort();
                errors
                    .into_iter()
                    .map(|(_, e)| e)
                    .collect::<Vec<_>>()
                    .join("; ")
            }
            Err(e) => e.to_string(),
        };

        if is_write_conflict(&message) {
            let actual = self
                .current_head_id(&draft.document_id, &draft.branch_name)
                .await?;
            return Err(VcsError::ConcurrentModification {
                document_id: draft.document_id,
                branch: draft.branch_name,
                expected: draft.guard.and_then(|g| g.expected_head),
                actual,
            });
        }
        Err(VcsError::Storage(format!("Failed to record version: {}", message)))
    }

    async fn get_version(&self, version_id: &str) -> VcsResult<Option<Version>> {
        let versions = self
            .fetch_versions(
                "SELECT * OMIT id FROM version WHERE version_id = $version_id LIMIT 1",
                vec![("version_id", version_id.to_string())],
            )
            .await?;
        Ok(versions.into_iter().next())
    }

    async fn latest_version_number(&self, document_id: &str, branch: &str) -> VcsResult<u32> {
        Ok(self
            .list_branch_versions(document_id, branch)
            .await?
            .last()
            .map_or(0, |v| v.version_number))
    }

    async fn current_version(
        &self,
        document_id: &str,
        branch: &str,
    ) -> VcsResult<Option<Version>> {
        let versions = self
            .fetch_versions(
                "SELECT * OMIT id FROM version WHERE document_id = $document_id AND branch_name = $branch_name AND is_current = true",
                vec![
                    ("document_id", document_id.to_string()),
                    ("branch_name", branch.to_string()),
                ],
            )
            .await?;
        Ok(versions.into_iter().next())
    }

    async fn document_latest(&self, document_id: &str) -> VcsResult<Option<VersionId>> {
        let mut response = self
            .db
            .inner()
            .query("SELECT VALUE latest_version_id FROM type::thing('document', $document_id)")
            .bind(("document_id", document_id.to_string()))
            .await
            .map_err(storage("Failed to get document"))?;
        let latest: Vec<Option<String>> = response
            .take(0)
            .map_err(storage("Failed to parse document"))?;
        Ok(latest.into_iter().flatten().next())
    }

    async fn list_versions(&self, document_id: &str) -> VcsResult<Vec<Version>> {
        let mut versions = self
            .fetch_versions(
                "SELECT * OMIT id FROM version WHERE document_id = $document_id",
                vec![("document_id", document_id.to_string())],
            )
            .await?;
        versions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.version_number.cmp(&b.version_number))
        });
        Ok(versions)
    }

    async fn list_branch_versions(
        &self,
        document_id: &str,
        branch: &str,
    ) -> VcsResult<Vec<Version>> {
        let mut versions = self
            .fetch_versions(
                "SELECT * OMIT id FROM version WHERE document_id = $document_id AND branch_name = $branch_name",
                vec![
                    ("document_id", document_id.to_string()),
                    ("branch_name", branch.to_string()),
                ],
            )
            .await?;
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn delete_version(&self, version_id: &str) -> VcsResult<Option<Version>> {
        let Some(version) = self.get_version(version_id).await? else {
            return Ok(None);
        };

        self.db
            .inner()
            .query(DELETE_VERSION)
            .bind(("default_branch", DEFAULT_BRANCH))
            .bind(("version_id", version.id.clone()))
            .bind(("document_id", version.document_id.clone()))
            .bind(("branch_name", version.branch_name.clone()))
            .bind(("was_current", version.is_current))
            .await
            .map_err(storage("Failed to delete version"))?
            .check()
            .map_err(storage("Failed to delete version"))?;

        Ok(Some(version))
    }

    async fn insert_branch(&self, record: BranchRecord) -> VcsResult<Branch> {
        if self.find_branch(&record.document_id, &record.name).await?.is_some() {
            return Err(VcsError::DuplicateBranch {
                document_id: record.document_id,
                name: record.name,
            });
        }

        let row = BranchRow {
            branch_id: record.id.clone(),
            document_id: record.document_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            created_at: record.created_at,
            created_by: record.created_by.clone(),
        };

        let result = self
            .db
            .inner()
            .query("CREATE type::thing('branch', $branch_id) CONTENT $row")
            .bind(("branch_id", record.id.clone()))
            .bind(("row", row))
            .await
            .map_err(storage("Failed to create branch"))?
            .check();

        if let Err(err) = result {
            if err.to_string().contains(INDEX_CONFLICT) {
                return Err(VcsError::DuplicateBranch {
                    document_id: record.document_id,
                    name: record.name,
                });
            }
            return Err(VcsError::Storage(format!("Failed to create branch: {}", err)));
        }

        self.describe(record).await
    }

    async fn get_branch(&self, branch_id: &str) -> VcsResult<Option<Branch>> {
        let records = self
            .fetch_branches(
                "SELECT * OMIT id FROM branch WHERE branch_id = $branch_id LIMIT 1",
                vec![("branch_id", branch_id.to_string())],
            )
            .await?;
        match records.into_iter().next() {
            Some(record) => Ok(Some(self.describe(record).await?)),
            None => Ok(None),
        }
    }

    async fn find_branch(&self, document_id: &str, name: &str) -> VcsResult<Option<Branch>> {
        let records = self
            .fetch_branches(
                "SELECT * OMIT id FROM branch WHERE document_id = $document_id AND name = $name LIMIT 1",
                vec![
                    ("document_id", document_id.to_string()),
                    ("name", name.to_string()),
                ],
            )
            .await?;
        match records.into_iter().next() {
            Some(record) => Ok(Some(self.describe(record).await?)),
            None => Ok(None),
        }
    }

    async fn list_branches(&self, document_id: &str) -> VcsResult<Vec<Branch>> {
        let records = self
            .fetch_branches(
                "SELECT * OMIT id FROM branch WHERE document_id = $document_id",
                vec![("document_id", document_id.to_string())],
            )
            .await?;

        let mut branches = Vec::with_capacity(records.len());
        for record in records {
            branches.push(self.describe(record).await?);
        }
        sort_branches(&mut branches);
        Ok(branches)
    }

    async fn remove_branch(&self, branch_id: &str) -> VcsResult<Option<Branch>> {
        let Some(branch) = self.get_branch(branch_id).await? else {
            return Ok(None);
        };

        self.db
            .inner()
            .query(REMOVE_BRANCH)
            .bind(("branch_id", branch.id.clone()))
            .bind(("document_id", branch.document_id.clone()))
            .bind(("name", branch.name.clone()))
            .await
            .map_err(storage("Failed to delete branch"))?
            .check()
            .map_err(storage("Failed to delete branch"))?;

        Ok(Some(branch))
    }

    async fn remove_branch_if_empty(&self, branch_id: &str) -> VcsResult<bool> {
        let Some(branch) = self.get_branch(branch_id).await? else {
            return Ok(false);
        };

        self.db
            .inner()
            .query(REMOVE_EMPTY_BRANCH)
            .bind(("branch_id", branch.id.clone()))
            .bind(("document_id", branch.document_id.clone()))
            .bind(("name", branch.name.clone()))
            .await
            .map_err(storage("Failed to delete branch"))?
            .check()
            .map_err(storage("Failed to delete branch"))?;

        Ok(self.get_branch(branch_id).await?.is_none())
    }

    async fn version_count(&self) -> VcsResult<usize> {
        let mut response = self
            .db
            .inner()
            .query("SELECT count() FROM version GROUP ALL")
            .await
            .map_err(storage("Failed to count versions"))?;
        let rows: Vec<CountRow> = response
            .take(0)
            .map_err(storage("Failed to parse version count"))?;
        Ok(rows.first().map_or(0, |r| r.count.max(0) as usize))
    }
}
