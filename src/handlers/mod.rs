pub mod artifact_handlers;
pub mod health_handlers;
pub mod object_handlers;
pub mod project_handlers;

use crate::services::{application::Application, object_store::FilesystemStore};
use axum::http::{HeaderName, HeaderValue};
use std::{path::PathBuf, sync::Arc};

/// Response header carrying the answer of existence checks.
pub const EXISTS_HEADER: HeaderName = HeaderName::from_static("x-artifact-exists");

fn exists_value(exists: bool) -> HeaderValue {
    HeaderValue::from_static(if exists { "true" } else { "false" })
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub application: Application,
    /// Set when payloads live on local disk and `/objects/{key}` serves them.
    pub filesystem: Option<Arc<FilesystemStore>>,
    pub upload_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(
        application: Application,
        filesystem: Option<Arc<FilesystemStore>>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            application,
            filesystem,
            upload_dir: Arc::new(upload_dir.into()),
        }
    }
}
