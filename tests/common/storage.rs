//! Fault-injecting object store wrapper.

use artifact_repo::services::object_store::{ObjectStore, ObjectStoreError, ObjectStoreResult};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Delegates to a real store unless told to fail or stall.
#[allow(dead_code)]
pub struct FaultyStore {
    inner: Arc<dyn ObjectStore>,
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Extra latency added to every put, in milliseconds.
    pub put_delay_ms: AtomicUsize,
    pub puts: AtomicUsize,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_put: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            put_delay_ms: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        })
    }

    fn injected() -> ObjectStoreError {
        ObjectStoreError::Unavailable(Box::new(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "injected failure",
        )))
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn put_payload(&self, key: &str, local_path: &Path, size: u64) -> ObjectStoreResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let delay = self.put_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.put_payload(key, local_path, size).await
    }

    async fn delete_payload(&self, key: &str) -> ObjectStoreResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.delete_payload(key).await
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> ObjectStoreResult<String> {
        self.inner.presign_get(key, ttl).await
    }

    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>> {
        self.inner.list_keys().await
    }

    async fn health_check(&self) -> ObjectStoreResult<()> {
        self.inner.health_check().await
    }
}
