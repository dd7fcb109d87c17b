//! Application layer: input validation and the domain-level error vocabulary
//! on top of [`Repository`].

use crate::{
    models::{artifact::Artifact, project::Project},
    services::repository::{RepoError, Repository},
};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const MAX_PROJECT_NAME_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("project not found")]
    ProjectNotFound,
    #[error("project already exists")]
    ProjectAlreadyExists,
    #[error("artifact not found")]
    ArtifactNotFound,
    #[error("artifact already exists")]
    ArtifactAlreadyExists,
    #[error("invalid project name `{0}`")]
    InvalidProjectName(String),
    #[error("storage unavailable")]
    StoreUnavailable(#[source] RepoError),
    #[error("internal error")]
    Internal(#[source] RepoError),
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;

/// Map a repository error into the sentinel that fits the operation.
fn classify(
    err: RepoError,
    not_found: ApplicationError,
    already_exists: ApplicationError,
) -> ApplicationError {
    match err {
        RepoError::NotFound => not_found,
        RepoError::AlreadyExists => already_exists,
        err if err.is_store_unavailable() => ApplicationError::StoreUnavailable(err),
        err => ApplicationError::Internal(err),
    }
}

fn project_error(err: RepoError) -> ApplicationError {
    classify(
        err,
        ApplicationError::ProjectNotFound,
        ApplicationError::ProjectAlreadyExists,
    )
}

fn artifact_error(err: RepoError) -> ApplicationError {
    classify(
        err,
        ApplicationError::ArtifactNotFound,
        ApplicationError::ArtifactAlreadyExists,
    )
}

/// Project names are 1 to 100 characters from `[A-Za-z0-9._-]`, excluding
/// the path segments `.` and `..`.
pub fn is_valid_project_name(name: &str) -> bool {
    let len = name.chars().count();
    if len == 0 || len > MAX_PROJECT_NAME_CHARS {
        return false;
    }
    if name == "." || name == ".." {
        return false;
    }
    name.chars()
        .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'))
}

#[derive(Clone)]
pub struct Application {
    repository: Repository,
}

impl Application {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub async fn projects(&self) -> ApplicationResult<Vec<Project>> {
        self.repository.projects().await.map_err(project_error)
    }

    pub async fn project(&self, id: Uuid) -> ApplicationResult<Project> {
        self.repository.project(id).await.map_err(project_error)
    }

    pub async fn project_by_name(&self, name: &str) -> ApplicationResult<Project> {
        self.repository
            .project_by_name(name)
            .await
            .map_err(project_error)
    }

    pub async fn project_exists(&self, name: &str) -> ApplicationResult<bool> {
        match self.repository.project_by_name(name).await {
            Ok(_) => Ok(true),
            Err(RepoError::NotFound) => Ok(false),
            Err(err) => Err(project_error(err)),
        }
    }

    /// Validate `name` and store a brand-new project.
    pub async fn project_create(
        &self,
        name: &str,
        description: &str,
    ) -> ApplicationResult<Project> {
        if !is_valid_project_name(name) {
            return Err(ApplicationError::InvalidProjectName(name.to_string()));
        }

        let project = Project::new(name, description);
        self.repository
            .create_or_update_project(&project)
            .await
            .map_err(project_error)?;
        debug!(project_id = %project.id, name, "project created");
        Ok(project)
    }

    pub async fn project_delete(&self, id: Uuid) -> ApplicationResult<()> {
        self.repository
            .delete_project(id)
            .await
            .map_err(project_error)
    }

    async fn ensure_project(&self, project_id: Uuid) -> ApplicationResult<()> {
        match self.repository.project_exists(project_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ApplicationError::ProjectNotFound),
            Err(err) => Err(project_error(err)),
        }
    }

    pub async fn project_artifact(
        &self,
        project_id: Uuid,
        content_id: &str,
    ) -> ApplicationResult<Artifact> {
        self.ensure_project(project_id).await?;
        self.repository
            .artifact(project_id, content_id)
            .await
            .map_err(artifact_error)
    }

    pub async fn project_artifact_exists(
        &self,
        project_id: Uuid,
        content_id: &str,
    ) -> ApplicationResult<bool> {
        self.ensure_project(project_id).await?;
        self.repository
            .artifact_exists(project_id, content_id)
            .await
            .map_err(artifact_error)
    }

    /// Register an artifact from a staged file.
    ///
    /// The existence pre-check only short-circuits the common duplicate case;
    /// two racing creators are separated by the store's unique index and the
    /// loser gets the same `ArtifactAlreadyExists`.
    pub async fn project_artifact_create(
        &self,
        project_id: Uuid,
        content_id: &str,
        local_path: &Path,
        size: u64,
    ) -> ApplicationResult<()> {
        if self.project_artifact_exists(project_id, content_id).await? {
            return Err(ApplicationError::ArtifactAlreadyExists);
        }

        match self
            .repository
            .create_artifact(project_id, content_id, local_path, size)
            .await
        {
            Ok(()) => Ok(()),
            // The project vanished between the pre-check and the insert.
            Err(RepoError::NotFound) => Err(ApplicationError::ProjectNotFound),
            Err(err) => Err(artifact_error(err)),
        }
    }

    pub async fn project_artifact_delete(
        &self,
        project_id: Uuid,
        content_id: &str,
    ) -> ApplicationResult<()> {
        self.ensure_project(project_id).await?;
        self.repository
            .delete_artifact(project_id, content_id)
            .await
            .map_err(artifact_error)
    }
}
