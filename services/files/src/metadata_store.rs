use crate::config::DatabaseConfig;
use crate::content_type::DEFAULT_CONTENT_TYPE;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Stored file metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    /// Primary key assigned by the database
    pub id: i64,
    /// Original client-supplied filename
    pub filename: String,
    /// Key of the object holding the content
    pub object_key: String,
    /// MIME type recorded at upload
    pub content_type: Option<String>,
    /// Content size in bytes
    pub size: i64,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    /// Content type to present to clients
    pub fn effective_content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// A record about to be inserted; the id is assigned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewFileRecord {
    pub filename: String,
    pub object_key: String,
    pub content_type: Option<String>,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

/// Pagination for listing files; records are always ordered by id ascending
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQuery {
    /// Maximum number of results
    pub limit: Option<i64>,
    /// Offset for pagination
    pub offset: Option<i64>,
}

/// Errors reported by the metadata store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataStoreError {
    #[error("Duplicate object key: {0}")]
    DuplicateKey(String),

    #[error("Metadata store unavailable: {0}")]
    Unavailable(String),

    #[error("Metadata query failed: {0}")]
    Query(String),
}

/// Durable index of file records. Each call is atomic on its own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record and return it with its assigned id
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, MetadataStoreError>;

    /// Get a record by id
    async fn get(&self, id: i64) -> Result<Option<FileRecord>, MetadataStoreError>;

    /// List records ordered by id ascending
    async fn list(&self, query: &FileQuery) -> Result<Vec<FileRecord>, MetadataStoreError>;

    /// Delete a record by id, returning whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool, MetadataStoreError>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<(), MetadataStoreError>;
}

/// Metadata store for file indexing in SQLite
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("Invalid database URL: {}", config.url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        info!(url = %config.url, "Connected to SQLite database");

        Ok(Self { pool })
    }

    /// Create a private in-memory store with the schema applied
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // Every connection to :memory: is a separate database, so keep exactly
        // one alive for the lifetime of the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    #[instrument(skip(self, record), fields(object_key = %record.object_key))]
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, MetadataStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO files (filename, object_key, content_type, size, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.filename)
        .bind(&record.object_key)
        .bind(&record.content_type)
        .bind(record.size)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let id = result.last_insert_rowid();

        debug!(id, object_key = %record.object_key, "File metadata inserted");

        Ok(FileRecord {
            id,
            filename: record.filename,
            object_key: record.object_key,
            content_type: record.content_type,
            size: record.size,
            created_at: record.created_at,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<FileRecord>, MetadataStoreError> {
        sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, filename, object_key, content_type, size, created_at
            FROM files
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &FileQuery) -> Result<Vec<FileRecord>, MetadataStoreError> {
        // SQLite treats a negative LIMIT as "no limit"
        sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, filename, object_key, content_type, size, created_at
            FROM files
            ORDER BY id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(query.limit.unwrap_or(-1))
        .bind(query.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<bool, MetadataStoreError> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), MetadataStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn map_sqlx_error(err: sqlx::Error) -> MetadataStoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            MetadataStoreError::DuplicateKey(db.message().to_string())
        }
        sqlx::Error::Database(db) if is_busy_or_locked(db.code().as_deref()) => {
            MetadataStoreError::Unavailable(db.message().to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => MetadataStoreError::Unavailable(err.to_string()),
        _ => MetadataStoreError::Query(err.to_string()),
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes
fn is_busy_or_locked(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}
