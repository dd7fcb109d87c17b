//! HTTP handlers for artifacts within a project.
//! Uploads are staged to a local file before the repository copies them into
//! the object store; the staged copy is always removed afterwards.

use super::{AppState, EXISTS_HEADER, exists_value};
use crate::{errors::AppError, models::artifact::ArtifactView};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::path::{Path as FsPath, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

/// Write one multipart field to `dest`, returning the byte count.
async fn stage_field(
    field: &mut axum::extract::multipart::Field<'_>,
    dest: &FsPath,
) -> Result<u64, AppError> {
    let mut file = fs::File::create(dest)
        .await
        .map_err(|e| AppError::internal(format!("staging upload: {e}")))?;
    let mut written = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::internal(format!("staging upload: {e}")))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| AppError::internal(format!("staging upload: {e}")))?;
    Ok(written)
}

/// Read the `id` and `file` fields, staging the file under `staged`.
async fn read_upload(
    multipart: &mut Multipart,
    staged: &FsPath,
) -> Result<(String, u64), AppError> {
    let mut content_id = None;
    let mut size = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(e.body_text()))?;
                content_id = Some(value);
            }
            Some("file") => size = Some(stage_field(&mut field, staged).await?),
            _ => {}
        }
    }

    let content_id = content_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("id is empty"))?;
    let size = size.ok_or_else(|| AppError::bad_request("file is missing"))?;
    Ok((content_id, size))
}

/// `POST /api/project/{name}/artifacts`
///
/// Multipart form with an `id` text field (the content id) and a `file` part.
pub async fn upload_artifact(
    State(state): State<AppState>,
    Path(name): Path<String>,
    mut multipart: Multipart,
) -> Result<StatusCode, AppError> {
    let project = state.application.project_by_name(&name).await?;

    fs::create_dir_all(state.upload_dir.as_path())
        .await
        .map_err(|e| AppError::internal(format!("creating upload dir: {e}")))?;
    let staged: PathBuf = state.upload_dir.join(format!("upload-{}", Uuid::new_v4()));

    let result = async {
        let (content_id, size) = read_upload(&mut multipart, &staged).await?;
        debug!(project = %name, content_id = %content_id, size, "received artifact upload");
        state
            .application
            .project_artifact_create(project.id, &content_id, &staged, size)
            .await?;
        Ok::<_, AppError>(())
    }
    .await;

    // best-effort cleanup; the file may never have been created
    let _ = fs::remove_file(&staged).await;

    result.map(|_| StatusCode::OK)
}

/// `GET /api/project/{name}/artifacts`, the content ids of every artifact.
pub async fn list_artifacts(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let project = state.application.project_by_name(&name).await?;
    Ok(Json(
        project
            .artifacts
            .into_iter()
            .map(|a| a.content_id)
            .collect(),
    ))
}

/// `GET /api/project/{name}/artifact/{artifact_id}`, with a download link.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path((name, artifact_id)): Path<(String, String)>,
) -> Result<Json<ArtifactView>, AppError> {
    let project = state.application.project_by_name(&name).await?;
    let artifact = state
        .application
        .project_artifact(project.id, &artifact_id)
        .await?;
    Ok(Json(artifact.to_view()))
}

/// `HEAD /api/project/{name}/artifact/{artifact_id}`
pub async fn artifact_exists(
    State(state): State<AppState>,
    Path((name, artifact_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let project = state.application.project_by_name(&name).await?;
    let exists = state
        .application
        .project_artifact_exists(project.id, &artifact_id)
        .await?;
    Ok((StatusCode::OK, [(EXISTS_HEADER, exists_value(exists))]))
}

/// `DELETE /api/project/{name}/artifact/{artifact_id}`
pub async fn delete_artifact(
    State(state): State<AppState>,
    Path((name, artifact_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let project = state.application.project_by_name(&name).await?;
    state
        .application
        .project_artifact_delete(project.id, &artifact_id)
        .await?;
    Ok(StatusCode::OK)
}
