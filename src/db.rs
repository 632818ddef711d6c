use anyhow::Result;
use std::sync::Arc;
use surrealdb::engine::any::{connect, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

/// A wrapper around a SurrealDB connection holding the version-control tables.
#[derive(Clone)]
pub struct VcsDatabase {
    db: Arc<Surreal<Any>>,
}

impl VcsDatabase {
    /// Create a new in-memory database instance.
    pub async fn new_memory(namespace: &str, database: &str) -> Result<Self> {
        let db = connect("memory").await?;
        db.use_ns(namespace).use_db(database).await?;

        let db = Arc::new(db);
        Self::init_schema(&db).await?;

        Ok(Self { db })
    }

    /// Create a new database instance connecting to a SurrealDB server.
    pub async fn new_remote(
        url: &str,
        namespace: &str,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let db = connect(url).await?;

        // Sign in as root
        db.signin(Root {
            username,
            password,
        })
        .await?;

        db.use_ns(namespace).use_db(database).await?;

        let db = Arc::new(db);
        Self::init_schema(&db).await?;

        Ok(Self { db })
    }

    /// Initialize tables and the indexes backing the hot lookups:
    /// `(document_id, branch_name, version_number)` and
    /// `(document_id, branch_name, is_current)`.
    async fn init_schema(db: &Surreal<Any>) -> Result<()> {
        db.query(
            "DEFINE TABLE IF NOT EXISTS version SCHEMALESS;
             DEFINE TABLE IF NOT EXISTS branch SCHEMALESS;
             DEFINE TABLE IF NOT EXISTS document SCHEMALESS;
             DEFINE INDEX IF NOT EXISTS version_id ON version FIELDS version_id UNIQUE;
             DEFINE INDEX IF NOT EXISTS version_sequence ON version FIELDS document_id, branch_name, version_number UNIQUE;
             DEFINE INDEX IF NOT EXISTS version_current ON version FIELDS document_id, branch_name, is_current;
             DEFINE INDEX IF NOT EXISTS branch_id ON branch FIELDS branch_id UNIQUE;
             DEFINE INDEX IF NOT EXISTS branch_name ON branch FIELDS document_id, name UNIQUE;",
        )
        .await?
        .check()?;

        Ok(())
    }

    /// Get a reference to the underlying SurrealDB instance.
    pub fn inner(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Check if the database is connected.
    pub async fn health(&self) -> Result<bool> {
        let _ = self.db.version().await?;
        Ok(true)
    }
}

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub endpoint: DatabaseEndpoint,
    pub namespace: String,
    pub database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            endpoint: DatabaseEndpoint::Memory,
            namespace: "wireframe".to_string(),
            database: "versions".to_string(),
        }
    }
}

/// Database endpoint types.
#[derive(Debug, Clone)]
pub enum DatabaseEndpoint {
    /// In-memory database (for testing).
    Memory,
    /// Remote SurrealDB server.
    Remote {
        url: String,
        username: String,
        password: String,
    },
}

impl DatabaseConfig {
    /// Create a new configuration for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a new configuration for a remote SurrealDB server.
    pub fn remote(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: DatabaseEndpoint::Remote {
                url: url.into(),
                username: username.into(),
                password: password.into(),
            },
            ..Default::default()
        }
    }

    /// Connect to the database with this configuration.
    pub async fn connect(&self) -> Result<VcsDatabase> {
        match &self.endpoint {
            DatabaseEndpoint::Memory => {
                VcsDatabase::new_memory(&self.namespace, &self.database).await
            }
            DatabaseEndpoint::Remote {
                url,
                username,
                password,
            } => {
                VcsDatabase::new_remote(url, &self.namespace, &self.database, username, password)
                    .await
            }
        }
    }
}
