use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use crate::error::VcsResult;
use crate::model::version::{Version, DEFAULT_BRANCH};

use super::VersionControl;

/// Everything the editor's history panel needs in one read.
#[derive(Debug, Clone, Serialize)]
pub struct VersionHistory {
    /// All versions of the document in creation order.
    pub versions: Vec<Version>,
    /// Head of `main`.
    pub current: Option<Version>,
    /// Registered branch names, `main` first.
    pub branches: Vec<String>,
}

impl VersionControl {
    /// Full history of a document. An unknown document yields an empty history.
    pub async fn get_version_history(&self, document_id: &str) -> VcsResult<VersionHistory> {
        let (versions, current, branches) = futures::try_join!(
            self.store.list_versions(document_id),
            self.store.current_version(document_id, DEFAULT_BRANCH),
            self.store.list_branches(document_id),
        )?;
        debug!(document_id, versions = versions.len(), "history loaded");

        Ok(VersionHistory {
            versions,
            current,
            branches: branches.into_iter().map(|b| b.name).collect(),
        })
    }

    /// The chain from `version_id` back to its root, newest first.
    ///
    /// Stops early at a parent that has since been deleted.
    pub async fn ancestry(&self, version_id: &str) -> VcsResult<Vec<Version>> {
        let mut chain = vec![self.get_version(version_id).await?];
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(version_id.to_string());

        while let Some(parent_id) = chain.last().and_then(|v| v.parent_version_id.clone()) {
            if !seen.insert(parent_id.clone()) {
                break;
            }
            match self.store.get_version(&parent_id).await? {
                Some(parent) => chain.push(parent),
                None => break,
            }
        }

        Ok(chain)
    }

    /// The version that was head of `branch` at `at`: the highest-numbered
    /// version created no later than `at`.
    pub async fn version_at(
        &self,
        document_id: &str,
        branch: &str,
        at: DateTime<Utc>,
    ) -> VcsResult<Option<Version>> {
        let versions = self.store.list_branch_versions(document_id, branch).await?;
        Ok(versions
            .into_iter()
            .filter(|v| v.created_at <= at)
            .max_by_key(|v| v.version_number))
    }
}
