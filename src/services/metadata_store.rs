//! src/services/metadata_store.rs
//!
//! Relational metadata for projects and artifacts, backed by SQLite.
//! Every lookup reports a missing row as `MetadataError::RowNotFound`; all
//! other driver errors are passed through untouched so the repository can
//! decide what they mean.

use crate::models::{artifact::ArtifactRow, project::ProjectRow};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{str::FromStr, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("row not found")]
    RowNotFound,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

impl MetadataError {
    /// True if the error is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, MetadataError::Sqlx(sqlx::Error::Database(db_err)) if db_err.is_unique_violation())
    }

    /// True if the store could not be reached at all, as opposed to rejecting
    /// the statement.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            MetadataError::Sqlx(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            )
        )
    }
}

/// Map the driver's "no row" signal onto ours.
fn not_found(err: sqlx::Error) -> MetadataError {
    match err {
        sqlx::Error::RowNotFound => MetadataError::RowNotFound,
        other => MetadataError::Sqlx(other),
    }
}

/// Row-level access to project and artifact metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Insert the project, or replace name/description if the id exists.
    async fn upsert_project(&self, row: &ProjectRow) -> MetadataResult<()>;

    async fn find_project_by_id(&self, id: Uuid) -> MetadataResult<ProjectRow>;

    async fn find_project_by_name(&self, name: &str) -> MetadataResult<ProjectRow>;

    async fn list_projects(&self) -> MetadataResult<Vec<ProjectRow>>;

    /// Delete a project row. Artifact rows go with it via the foreign key.
    async fn delete_project_by_id(&self, id: Uuid) -> MetadataResult<()>;

    async fn insert_artifact_row(&self, row: &ArtifactRow) -> MetadataResult<()>;

    async fn find_artifact_row(
        &self,
        project_id: Uuid,
        content_id: &str,
    ) -> MetadataResult<ArtifactRow>;

    async fn list_artifact_rows(&self, project_id: Uuid) -> MetadataResult<Vec<ArtifactRow>>;

    /// Delete an artifact row by its storage key.
    async fn delete_artifact_row(&self, storage_key: &str) -> MetadataResult<()>;

    /// Storage keys of every artifact row, across all projects.
    async fn list_storage_keys(&self) -> MetadataResult<Vec<String>>;

    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite implementation of [`MetadataStore`].
#[derive(Clone, Debug)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`, creating the file if needed.
    ///
    /// Foreign keys are switched on for every connection; cascading artifact
    /// deletion depends on it.
    pub async fn connect(database_url: &str, max_connections: u32) -> MetadataResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    /// Like [`connect`](Self::connect), retrying with a fixed delay.
    ///
    /// Only meant for process startup. Returns the last error once `attempts`
    /// is exhausted.
    pub async fn connect_with_retry(
        database_url: &str,
        max_connections: u32,
        attempts: u32,
        delay: Duration,
    ) -> MetadataResult<Self> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            info!(attempt, attempts, "connecting to metadata store");
            match Self::connect(database_url, max_connections).await {
                Ok(store) => {
                    info!("connected to metadata store");
                    return Ok(store);
                }
                Err(err) if attempt < attempts => {
                    warn!(attempt, error = %err, "metadata store connection failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> MetadataResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn upsert_project(&self, row: &ProjectRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.description)
        .bind(row.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(project_id = %row.id, "upserted project row");
        Ok(())
    }

    async fn find_project_by_id(&self, id: Uuid) -> MetadataResult<ProjectRow> {
        sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, description, created_at FROM projects WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(not_found)
    }

    async fn find_project_by_name(&self, name: &str) -> MetadataResult<ProjectRow> {
        sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, description, created_at FROM projects WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found)
    }

    async fn list_projects(&self) -> MetadataResult<Vec<ProjectRow>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, description, created_at FROM projects ORDER BY created_at, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_project_by_id(&self, id: Uuid) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::RowNotFound);
        }
        Ok(())
    }

    async fn insert_artifact_row(&self, row: &ArtifactRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO artifacts (id, project_id, content_id, size_bytes, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.project_id)
        .bind(&row.content_id)
        .bind(row.size_bytes)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        debug!(storage_key = %row.id, content_id = %row.content_id, "inserted artifact row");
        Ok(())
    }

    async fn find_artifact_row(
        &self,
        project_id: Uuid,
        content_id: &str,
    ) -> MetadataResult<ArtifactRow> {
        sqlx::query_as::<_, ArtifactRow>(
            "SELECT id, project_id, content_id, size_bytes, created_at
             FROM artifacts WHERE project_id = ? AND content_id = ?",
        )
        .bind(project_id.to_string())
        .bind(content_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found)
    }

    async fn list_artifact_rows(&self, project_id: Uuid) -> MetadataResult<Vec<ArtifactRow>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT id, project_id, content_id, size_bytes, created_at
             FROM artifacts WHERE project_id = ? ORDER BY created_at, content_id",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_artifact_row(&self, storage_key: &str) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM artifacts WHERE id = ?")
            .bind(storage_key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::RowNotFound);
        }
        Ok(())
    }

    async fn list_storage_keys(&self) -> MetadataResult<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>("SELECT id FROM artifacts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
