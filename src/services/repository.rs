//! src/services/repository.rs
//!
//! Repository: coordinates project/artifact metadata (the source of truth
//! for existence) with payloads in the object store. There is no shared
//! transaction between the two, so every operation has a fixed ordering:
//!
//! - artifact create: metadata row first, then payload;
//! - artifact delete: metadata row first, then payload;
//! - project delete: collect payload keys, delete the row (cascading artifact
//!   rows), then delete payloads best-effort.
//!
//! A failure between the two steps leaves a dangling reference. Nothing here
//! repairs it; `services::reconcile` can find it later.

use crate::models::{
    ModelError,
    artifact::{Artifact, ArtifactRow},
    project::{Project, ProjectRow},
};
use crate::services::{
    metadata_store::{MetadataError, MetadataStore},
    object_store::{ObjectStore, ObjectStoreError, PRESIGN_TTL},
};
use futures::future::try_join_all;
use std::{future::Future, path::Path, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("operation exceeded its deadline")]
    DeadlineExceeded,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Metadata(MetadataError),
    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
}

pub type RepoResult<T> = Result<T, RepoError>;

impl From<MetadataError> for RepoError {
    /// Normalize "no such row" and constraint violations; pass the rest on.
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::RowNotFound => RepoError::NotFound,
            err if err.is_unique_violation() => RepoError::AlreadyExists,
            MetadataError::Sqlx(sqlx::Error::Database(db_err))
                if db_err.is_foreign_key_violation() =>
            {
                RepoError::NotFound
            }
            other => RepoError::Metadata(other),
        }
    }
}

impl RepoError {
    /// True when a store could not answer, rather than answering "no".
    pub fn is_store_unavailable(&self) -> bool {
        match self {
            RepoError::DeadlineExceeded => true,
            RepoError::Metadata(err) => err.is_unavailable(),
            RepoError::ObjectStore(err) => err.is_unavailable(),
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct Repository {
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    deadline: Option<Duration>,
}

impl Repository {
    pub fn new(metadata: Arc<dyn MetadataStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            metadata,
            objects,
            deadline: None,
        }
    }

    /// Bound every operation by `deadline`. On expiry the in-flight store call
    /// is dropped and `DeadlineExceeded` returned.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    async fn bounded<T>(&self, op: impl Future<Output = RepoResult<T>>) -> RepoResult<T> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, op)
                .await
                .map_err(|_| RepoError::DeadlineExceeded)?,
            None => op.await,
        }
    }

    /// Join a project row with its artifact rows (second, separate query).
    async fn load_project(&self, row: ProjectRow) -> RepoResult<Project> {
        let id = crate::models::parse_uuid("project", &row.id)?;
        let artifacts = self.metadata.list_artifact_rows(id).await?;
        Ok(Project::from_rows(row, &artifacts)?)
    }

    /// Insert `project`, or replace the stored row with the same id.
    ///
    /// Name collisions are not checked up front; the store's unique index
    /// turns them into `AlreadyExists`.
    pub async fn create_or_update_project(&self, project: &Project) -> RepoResult<()> {
        self.bounded(async {
            self.metadata.upsert_project(&project.to_row()).await?;
            debug!(project_id = %project.id, name = %project.name, "saved project");
            Ok(())
        })
        .await
    }

    pub async fn project(&self, id: Uuid) -> RepoResult<Project> {
        self.bounded(async {
            let row = self.metadata.find_project_by_id(id).await?;
            self.load_project(row).await
        })
        .await
    }

    /// Whether a project row exists. Loads no artifacts.
    pub async fn project_exists(&self, id: Uuid) -> RepoResult<bool> {
        self.bounded(async {
            match self.metadata.find_project_by_id(id).await {
                Ok(_) => Ok(true),
                Err(MetadataError::RowNotFound) => Ok(false),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    pub async fn project_by_name(&self, name: &str) -> RepoResult<Project> {
        self.bounded(async {
            let row = self.metadata.find_project_by_name(name).await?;
            self.load_project(row).await
        })
        .await
    }

    pub async fn projects(&self) -> RepoResult<Vec<Project>> {
        self.bounded(async {
            let rows = self.metadata.list_projects().await?;
            try_join_all(rows.into_iter().map(|row| self.load_project(row))).await
        })
        .await
    }

    /// Delete a project, its artifact rows and (best-effort) their payloads.
    ///
    /// Payload delete failures are logged and leave orphaned objects behind;
    /// they do not fail the call once the metadata is gone.
    pub async fn delete_project(&self, id: Uuid) -> RepoResult<()> {
        self.bounded(async {
            let storage_keys: Vec<String> = self
                .metadata
                .list_artifact_rows(id)
                .await?
                .into_iter()
                .map(|row| row.id)
                .collect();

            self.metadata.delete_project_by_id(id).await?;
            info!(project_id = %id, artifacts = storage_keys.len(), "deleted project");

            for key in &storage_keys {
                if let Err(err) = self.objects.delete_payload(key).await {
                    warn!(
                        project_id = %id,
                        storage_key = %key,
                        error = %err,
                        "payload left orphaned after project delete"
                    );
                }
            }
            Ok(())
        })
        .await
    }

    /// Register an artifact and copy its staged payload into the object store.
    ///
    /// The row is inserted before the payload is written, so a duplicate
    /// (project, content id) is rejected before anything touches the object
    /// store. If the payload write then fails, the row stays behind pointing
    /// at nothing.
    pub async fn create_artifact(
        &self,
        project_id: Uuid,
        content_id: &str,
        local_path: &Path,
        size: u64,
    ) -> RepoResult<()> {
        self.bounded(async {
            self.metadata.find_project_by_id(project_id).await?;

            let row = ArtifactRow::fresh(project_id, content_id, size);
            self.metadata.insert_artifact_row(&row).await?;

            if let Err(err) = self.objects.put_payload(&row.id, local_path, size).await {
                warn!(
                    project_id = %project_id,
                    content_id,
                    storage_key = %row.id,
                    error = %err,
                    "payload write failed after metadata insert; artifact row is dangling"
                );
                return Err(err.into());
            }

            info!(project_id = %project_id, content_id, size, "created artifact");
            Ok(())
        })
        .await
    }

    /// Look up an artifact and attach a fresh presigned download URL.
    ///
    /// The payload itself is not checked.
    pub async fn artifact(&self, project_id: Uuid, content_id: &str) -> RepoResult<Artifact> {
        self.bounded(async {
            let row = self.metadata.find_artifact_row(project_id, content_id).await?;
            let mut artifact = Artifact::from_row(&row)?;
            let url = self.objects.presign_get(&row.id, PRESIGN_TTL).await?;
            artifact.access_url = Some(url);
            Ok(artifact)
        })
        .await
    }

    /// Whether a metadata row exists. Never returns `NotFound`.
    pub async fn artifact_exists(&self, project_id: Uuid, content_id: &str) -> RepoResult<bool> {
        self.bounded(async {
            match self.metadata.find_artifact_row(project_id, content_id).await {
                Ok(_) => Ok(true),
                Err(MetadataError::RowNotFound) => Ok(false),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    /// Delete the artifact row, then its payload.
    ///
    /// If the payload delete fails the error is returned, but the row is
    /// already gone and the payload is orphaned.
    pub async fn delete_artifact(&self, project_id: Uuid, content_id: &str) -> RepoResult<()> {
        self.bounded(async {
            let row = self.metadata.find_artifact_row(project_id, content_id).await?;
            self.metadata.delete_artifact_row(&row.id).await?;

            if let Err(err) = self.objects.delete_payload(&row.id).await {
                warn!(
                    project_id = %project_id,
                    content_id,
                    storage_key = %row.id,
                    error = %err,
                    "payload delete failed after metadata delete; payload is orphaned"
                );
                return Err(err.into());
            }

            info!(project_id = %project_id, content_id, "deleted artifact");
            Ok(())
        })
        .await
    }
}
