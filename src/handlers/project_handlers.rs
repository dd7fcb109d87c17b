//! HTTP handlers for project operations.

use super::{AppState, EXISTS_HEADER, exists_value};
use crate::{
    errors::AppError,
    models::project::{ExtendedProject, ProjectSummary},
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

/// Body of `POST /api/project`.
#[derive(Debug, Deserialize)]
pub struct CreateProjectReq {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

fn parse_project_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request(format!("invalid project id `{raw}`")))
}

/// `GET /api/projects`
pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectSummary>>, AppError> {
    let projects = state.application.projects().await?;
    Ok(Json(projects.iter().map(|p| p.to_summary()).collect()))
}

/// `POST /api/project`
pub async fn create_project(
    State(state): State<AppState>,
    body: Result<Json<CreateProjectReq>, JsonRejection>,
) -> Result<Json<ExtendedProject>, AppError> {
    let Json(req) = body.map_err(|rej| AppError::bad_request(rej.body_text()))?;
    if req.name.is_empty() {
        return Err(AppError::bad_request("project name must not be empty"));
    }

    let project = state
        .application
        .project_create(&req.name, &req.description)
        .await?;
    Ok(Json(project.to_extended()))
}

/// `HEAD /api/project/{name}`
pub async fn project_exists(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let exists = state.application.project_exists(&name).await?;
    Ok((StatusCode::OK, [(EXISTS_HEADER, exists_value(exists))]))
}

/// `GET /api/project/{id}`
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExtendedProject>, AppError> {
    let id = parse_project_id(&id)?;
    let project = state.application.project(id).await?;
    Ok(Json(project.to_extended()))
}

/// `DELETE /api/project/{id}`
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_project_id(&id)?;
    state.application.project_delete(id).await?;
    Ok(StatusCode::OK)
}
