use crate::db::DatabaseConfig;
use crate::diff::DiffOptions;
use crate::error::{VcsError, VcsResult};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub diff: DiffConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Surreal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SurrealDB endpoint; `memory` runs an embedded in-memory engine.
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: "memory".to_string(),
            namespace: "wireframe".to_string(),
            database: "versions".to_string(),
            username: None,
            password: None,
        }
    }
}

impl StorageConfig {
    /// Connection settings for the SurrealDB backend.
    pub fn database_config(&self) -> VcsResult<DatabaseConfig> {
        let mut config = if self.url == "memory" {
            DatabaseConfig::memory()
        } else {
            let username = self.username.clone().ok_or_else(|| {
                VcsError::Config("storage.username is required for a remote url".to_string())
            })?;
            let password = self.password.clone().ok_or_else(|| {
                VcsError::Config("storage.password is required for a remote url".to_string())
            })?;
            DatabaseConfig::remote(&self.url, username, password)
        };
        config.namespace = self.namespace.clone();
        config.database = self.database.clone();
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "wireframe_vcs=info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Match array elements by this field instead of by position.
    pub array_key: Option<String>,
}

impl DiffConfig {
    pub fn options(&self) -> DiffOptions {
        match &self.array_key {
            Some(key) => DiffOptions::keyed(key.clone()),
            None => DiffOptions::default(),
        }
    }
}

/// Load configuration from `wireframe-vcs.toml` (optional), `WIREFRAME_VCS__*`
/// environment variables, then an explicit file.
pub fn load_config(path: Option<&Path>) -> VcsResult<AppConfig> {
    let mut builder = Config::builder()
        .add_source(File::with_name("wireframe-vcs").required(false))
        .add_source(Environment::with_prefix("WIREFRAME_VCS").separator("__"));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .build()
        .map_err(|err| VcsError::Config(err.to_string()))?;

    let parsed: AppConfig = config
        .try_deserialize()
        .map_err(|err| VcsError::Config(err.to_string()))?;

    if parsed.storage.backend == StorageBackend::Surreal {
        parsed.storage.database_config()?;
    }

    Ok(parsed)
}
