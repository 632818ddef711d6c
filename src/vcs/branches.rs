use tracing::info;
use validator::Validate;

use crate::error::{VcsError, VcsResult};
use crate::model::version::{Branch, BranchRecord};

use super::{require_document_id, validate_branch_name, VersionControl};

/// Metadata for a new branch.
#[derive(Debug, Clone, Default, Validate)]
pub struct BranchOptions {
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub created_by: Option<String>,
}

impl VersionControl {
    /// Register a branch without creating any version on it.
    ///
    /// Callers seed it with `create_version(.., on_branch(name))`, or use
    /// [`VersionControl::create_branch`] to fork from an existing version.
    #[tracing::instrument(skip(self, options))]
    pub async fn create_branch_record(
        &self,
        document_id: &str,
        name: &str,
        options: BranchOptions,
    ) -> VcsResult<Branch> {
        require_document_id(document_id)?;
        validate_branch_name(name).map_err(|e| VcsError::Validation(e.to_string()))?;
        options.validate()?;

        let record = BranchRecord::new(document_id, name)
            .with_description(options.description)
            .with_author(options.created_by);
        let branch = self.store.insert_branch(record).await?;
        info!(branch_id = %branch.id, "branch created");
        Ok(branch)
    }

    /// All branches of a document, default branch first.
    pub async fn get_branches(&self, document_id: &str) -> VcsResult<Vec<Branch>> {
        self.store.list_branches(document_id).await
    }

    /// Get a branch by ID.
    pub async fn get_branch(&self, branch_id: &str) -> VcsResult<Branch> {
        self.store
            .get_branch(branch_id)
            .await?
            .ok_or_else(|| VcsError::BranchNotFound(branch_id.to_string()))
    }

    /// Get a branch by document and name.
    pub async fn find_branch(&self, document_id: &str, name: &str) -> VcsResult<Option<Branch>> {
        self.store.find_branch(document_id, name).await
    }

    /// Unregister a branch. Versions on it stay addressable by ID and other
    /// branches are untouched.
    #[tracing::instrument(skip(self))]
    pub async fn delete_branch(&self, branch_id: &str) -> VcsResult<Branch> {
        let branch = self.get_branch(branch_id).await?;
        if branch.is_default() {
            return Err(VcsError::CannotDeleteDefaultBranch(branch.name));
        }

        let removed = self
            .store
            .remove_branch(branch_id)
            .await?
            .ok_or_else(|| VcsError::BranchNotFound(branch_id.to_string()))?;
        info!(
            document_id = %removed.document_id,
            name = %removed.name,
            versions = removed.version_count,
            "branch deleted"
        );
        Ok(removed)
    }
}
