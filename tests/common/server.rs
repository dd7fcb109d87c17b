//! Test environment wiring real stores in a temporary directory.

use super::storage::FaultyStore;
use artifact_repo::handlers::AppState;
use artifact_repo::routes::routes::routes;
use artifact_repo::services::application::Application;
use artifact_repo::services::metadata_store::{MetadataStore, SqliteMetadataStore};
use artifact_repo::services::object_store::{FilesystemStore, ObjectStore, UrlSigner};
use artifact_repo::services::repository::Repository;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const TEST_BASE_URL: &str = "http://localhost:3000";

/// Everything a test needs, backed by SQLite and a filesystem store.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestEnv {
    pub application: Application,
    pub repository: Repository,
    pub metadata: Arc<SqliteMetadataStore>,
    pub filesystem: Arc<FilesystemStore>,
    pub faulty: Arc<FaultyStore>,
    pub router: axum::Router,
    temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestEnv {
    pub async fn new() -> Self {
        Self::with_deadline(None).await
    }

    pub async fn with_deadline(deadline: Option<Duration>) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let db_url = format!("sqlite://{}", temp_dir.path().join("meta.db").display());
        let metadata = Arc::new(
            SqliteMetadataStore::connect(&db_url, 5)
                .await
                .expect("Failed to connect metadata store"),
        );
        metadata.migrate().await.expect("Failed to migrate");

        let signer = UrlSigner::new(b"test-secret", TEST_BASE_URL).expect("Failed to build signer");
        let filesystem = Arc::new(
            FilesystemStore::new(temp_dir.path().join("objects"), signer)
                .await
                .expect("Failed to create filesystem store"),
        );
        let faulty = FaultyStore::new(filesystem.clone());

        let metadata_dyn: Arc<dyn MetadataStore> = metadata.clone();
        let objects_dyn: Arc<dyn ObjectStore> = faulty.clone();
        let repository = Repository::new(metadata_dyn, objects_dyn).with_deadline(deadline);
        let application = Application::new(repository.clone());

        let state = AppState::new(
            application.clone(),
            Some(filesystem.clone()),
            temp_dir.path().join("uploads"),
        );
        let router = routes().with_state(state);

        Self {
            application,
            repository,
            metadata,
            filesystem,
            faulty,
            router,
            temp_dir,
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.temp_dir.path().join("uploads")
    }
}
