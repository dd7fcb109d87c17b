//! Payload storage keyed by opaque storage keys.
//!
//! The repository only ever needs four things from an object store: put a
//! staged local file, delete, presign a download URL, and (for
//! reconciliation) list what is there. Two backends implement it: a local
//! filesystem store that signs its own URLs and an S3-compatible store.

pub mod filesystem;
pub mod s3;
pub mod signing;

pub use filesystem::FilesystemStore;
pub use s3::{S3Settings, S3Store};
pub use signing::{SignatureError, UrlSigner};

use async_trait::async_trait;
use std::{io, path::Path, path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;

/// Lifetime of every presigned download URL handed out by the repository.
pub const PRESIGN_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("S3 error: {0}")]
    S3(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The backend could not be reached at all (connect failure, timeout).
    #[error("object store unreachable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ObjectStoreError {
    /// True when the backend failed to answer, as opposed to answering with
    /// an error about the request itself.
    pub fn is_unavailable(&self) -> bool {
        match self {
            ObjectStoreError::Unavailable(_) => true,
            ObjectStoreError::Io(err) => err.kind() != io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Object store capability used by the repository.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Copy the file at `local_path` into the store under `key`.
    ///
    /// Failures are returned as-is; there is no retry.
    async fn put_payload(&self, key: &str, local_path: &Path, size: u64)
    -> ObjectStoreResult<()>;

    /// Remove the object under `key`. Removing a missing object succeeds.
    async fn delete_payload(&self, key: &str) -> ObjectStoreResult<()>;

    /// URL granting unauthenticated GET access to `key` for `ttl`.
    ///
    /// The object does not have to exist when the URL is issued.
    async fn presign_get(&self, key: &str, ttl: Duration) -> ObjectStoreResult<String>;

    /// Every key currently stored.
    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>>;

    async fn health_check(&self) -> ObjectStoreResult<()>;
}

/// Which backend to build, and how.
#[derive(Clone)]
pub enum StorageConfig {
    Filesystem {
        path: PathBuf,
        public_base_url: String,
        signing_secret: String,
    },
    S3(S3Settings),
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageConfig::Filesystem {
                path,
                public_base_url,
                ..
            } => f
                .debug_struct("Filesystem")
                .field("path", path)
                .field("public_base_url", public_base_url)
                .finish_non_exhaustive(),
            StorageConfig::S3(settings) => f.debug_tuple("S3").field(settings).finish(),
        }
    }
}

/// Handles produced from a [`StorageConfig`].
///
/// The filesystem backend is returned twice: as the trait object the
/// repository uses, and concretely so the HTTP layer can serve its signed
/// URLs.
pub struct BuiltStore {
    pub store: Arc<dyn ObjectStore>,
    pub filesystem: Option<Arc<FilesystemStore>>,
}

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> ObjectStoreResult<BuiltStore> {
    match config {
        StorageConfig::Filesystem {
            path,
            public_base_url,
            signing_secret,
        } => {
            let signer = UrlSigner::new(signing_secret.as_bytes(), public_base_url)?;
            let backend = Arc::new(FilesystemStore::new(path, signer).await?);
            Ok(BuiltStore {
                store: backend.clone(),
                filesystem: Some(backend),
            })
        }
        StorageConfig::S3(settings) => {
            let backend = S3Store::new(settings)?;
            Ok(BuiltStore {
                store: Arc::new(backend),
                filesystem: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_config_filesystem_exposes_concrete_backend() {
        let temp = tempfile::tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("objects"),
            public_base_url: "http://localhost:3000".into(),
            signing_secret: "secret".into(),
        };

        let built = from_config(&config).await.unwrap();
        assert!(built.filesystem.is_some());
        built.store.health_check().await.unwrap();
        assert!(temp.path().join("objects").is_dir());
    }

    #[tokio::test]
    async fn from_config_rejects_empty_signing_secret() {
        let temp = tempfile::tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("objects"),
            public_base_url: "http://localhost:3000".into(),
            signing_secret: String::new(),
        };

        match from_config(&config).await {
            Err(ObjectStoreError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn from_config_s3_builds_without_network() {
        let config = StorageConfig::S3(S3Settings {
            bucket: "artifacts".into(),
            endpoint: Some("minio:9000".into()),
            region: "us-east-1".into(),
            access_key_id: "minioadmin".into(),
            secret_access_key: "minioadmin".into(),
            force_path_style: true,
        });

        let built = from_config(&config).await.unwrap();
        assert!(built.filesystem.is_none());
    }

    #[test]
    fn transport_and_disk_failures_count_as_unavailable() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(ObjectStoreError::Unavailable(Box::new(refused)).is_unavailable());
        assert!(ObjectStoreError::Io(io::Error::other("disk gone")).is_unavailable());

        assert!(!ObjectStoreError::Io(io::Error::from(io::ErrorKind::NotFound)).is_unavailable());
        assert!(!ObjectStoreError::NotFound("k".into()).is_unavailable());
        assert!(!ObjectStoreError::InvalidKey("../k".into()).is_unavailable());
        assert!(!ObjectStoreError::Config("bad".into()).is_unavailable());
        assert!(!ObjectStoreError::S3("AccessDenied".into()).is_unavailable());
    }
}
