pub mod config;
pub mod db;
pub mod diff;
pub mod error;
pub mod model;
pub mod store;
pub mod telemetry;
pub mod vcs;

pub use config::{load_config, AppConfig, DiffConfig, LoggingConfig, StorageBackend, StorageConfig};
pub use db::{DatabaseConfig, DatabaseEndpoint, VcsDatabase};
pub use diff::{diff, diff_with, summarize, ArrayStrategy, Change, ChangeKind, DiffOptions};
pub use error::{VcsError, VcsResult};
pub use model::*;
pub use vcs::{BranchOptions, Comparison, CreateVersionOptions, VersionControl, VersionHistory};
