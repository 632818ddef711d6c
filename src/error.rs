use thiserror::Error;

use crate::model::version::VersionId;

/// Central error type for version-control operations.
#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Version not found: {0}")]
    VersionNotFound(VersionId),

    #[error("Source version not found: {0}")]
    SourceVersionNotFound(VersionId),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Branch '{name}' already exists for document {document_id}")]
    DuplicateBranch { document_id: String, name: String },

    #[error("The default branch '{0}' cannot be deleted")]
    CannotDeleteDefaultBranch(String),

    #[error(
        "Branch '{branch}' of document {document_id} moved: expected head {expected:?}, found {actual:?}"
    )]
    ConcurrentModification {
        document_id: String,
        branch: String,
        expected: Option<VersionId>,
        actual: Option<VersionId>,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    /// True for the "referenced id does not exist" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VcsError::VersionNotFound(_)
                | VcsError::SourceVersionNotFound(_)
                | VcsError::BranchNotFound(_)
        )
    }

    /// True when the caller can re-run the whole operation against fresh state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VcsError::ConcurrentModification { .. })
    }
}

impl From<validator::ValidationErrors> for VcsError {
    fn from(errors: validator::ValidationErrors) -> Self {
        VcsError::Validation(errors.to_string())
    }
}

/// Convenience type alias for version-control results.
pub type VcsResult<T> = Result<T, VcsError>;
