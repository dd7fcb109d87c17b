//! Defines routes for all project and artifact operations.
//!
//! ## Structure
//! - **Project-level endpoints**
//!   - `GET    /api/projects`: list projects (id, name, description)
//!   - `POST   /api/project`: create project from `{name, description}`
//!   - `HEAD   /api/project/{name}`: existence check (`x-artifact-exists`)
//!   - `GET    /api/project/{id}`: project with its artifacts
//!   - `DELETE /api/project/{id}`: delete project, artifacts and payloads
//!
//! - **Artifact-level endpoints**
//!   - `POST   /api/project/{name}/artifacts`: multipart upload (`id`, `file`)
//!   - `GET    /api/project/{name}/artifacts`: list content ids
//!   - `GET    /api/project/{name}/artifact/{artifact_id}`: metadata + download URL
//!   - `HEAD   /api/project/{name}/artifact/{artifact_id}`: existence check
//!   - `DELETE /api/project/{name}/artifact/{artifact_id}`: delete artifact
//!
//! - **Payloads**
//!   - `GET    /objects/{key}`: signed download (filesystem backend)
//!
//! The single-project path takes a name for `HEAD` and an id otherwise.

use crate::handlers::{
    AppState,
    artifact_handlers::{
        artifact_exists, delete_artifact, get_artifact, list_artifacts, upload_artifact,
    },
    health_handlers::{healthz, readyz},
    object_handlers::get_object,
    project_handlers::{create_project, delete_project, get_project, list_projects, project_exists},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for every endpoint.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Project-level routes
        .route("/api/projects", get(list_projects))
        .route("/api/project", post(create_project))
        .route(
            "/api/project/{project}",
            get(get_project).head(project_exists).delete(delete_project),
        )
        // Artifact-level routes; uploads are streamed to disk, so no body cap
        .route(
            "/api/project/{project}/artifacts",
            post(upload_artifact)
                .get(list_artifacts)
                .layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/api/project/{project}/artifact/{artifact_id}",
            get(get_artifact)
                .head(artifact_exists)
                .delete(delete_artifact),
        )
        // Signed payload downloads
        .route("/objects/{key}", get(get_object))
}
