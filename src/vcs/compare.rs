use serde::Serialize;
use tracing::debug;

use crate::diff::{self, Change};
use crate::error::VcsResult;

use super::VersionControl;

/// Result of comparing two versions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub changes: Vec<Change>,
    pub summary: String,
}

impl VersionControl {
    /// Structural diff from `version_id1` to `version_id2`.
    ///
    /// The versions may belong to different branches or even documents.
    pub async fn compare_versions(
        &self,
        version_id1: &str,
        version_id2: &str,
    ) -> VcsResult<Comparison> {
        let (old, new) = futures::try_join!(
            self.get_version(version_id1),
            self.get_version(version_id2)
        )?;

        let changes = diff::diff_with(&old.data, &new.data, &self.diff_options);
        let summary = diff::summarize(&changes);
        debug!(
            from = version_id1,
            to = version_id2,
            changes = changes.len(),
            "versions compared"
        );

        Ok(Comparison { changes, summary })
    }
}
