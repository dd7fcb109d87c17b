use crate::services::application::ApplicationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ApplicationError> for AppError {
    fn from(err: ApplicationError) -> Self {
        match &err {
            ApplicationError::ProjectNotFound | ApplicationError::ArtifactNotFound => {
                AppError::not_found(err.to_string())
            }
            ApplicationError::ProjectAlreadyExists | ApplicationError::ArtifactAlreadyExists => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            ApplicationError::InvalidProjectName(_) => AppError::bad_request(err.to_string()),
            ApplicationError::StoreUnavailable(source) => {
                tracing::warn!(error = %source, "store unavailable");
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            ApplicationError::Internal(source) => {
                tracing::error!(error = %source, "internal error");
                AppError::internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::repository::RepoError;

    #[test]
    fn sentinels_map_to_http_statuses() {
        let cases = [
            (ApplicationError::ProjectNotFound, StatusCode::NOT_FOUND),
            (ApplicationError::ArtifactAlreadyExists, StatusCode::CONFLICT),
            (
                ApplicationError::InvalidProjectName("..".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApplicationError::StoreUnavailable(RepoError::DeadlineExceeded),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = AppError::from(ApplicationError::Internal(RepoError::ObjectStore(
            crate::services::object_store::ObjectStoreError::Config("secret path".into()),
        )));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal error");
    }
}
