//! Local-disk object store.
//!
//! Payloads are sharded beneath `base_path/{shard}/{shard}/{key}` using the
//! first two bytes of MD5(key), written through a temporary file, fsynced
//! and renamed into place. Download URLs are signed by a [`UrlSigner`] and
//! served by the HTTP layer.

use super::{ObjectStore, ObjectStoreError, ObjectStoreResult, UrlSigner};
use async_trait::async_trait;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_KEY_LEN: usize = 1024;
const TMP_PREFIX: &str = ".tmp-";

#[derive(Debug)]
pub struct FilesystemStore {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl FilesystemStore {
    /// Create the store, making sure `base_path` exists.
    pub async fn new(base_path: impl Into<PathBuf>, signer: UrlSigner) -> ObjectStoreResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path, signer })
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Reject keys that could escape the base directory.
    fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_KEY_LEN
            || key.starts_with(TMP_PREFIX)
            || key.contains('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Two-level shard directory names for a key (00–ff each).
    fn shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Open a stored payload for reading, with its length.
    pub async fn open(&self, key: &str) -> ObjectStoreResult<(File, u64)> {
        Self::ensure_key_safe(key)?;
        let path = self.object_path(key);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    async fn write_payload(&self, key: &str, local_path: &Path) -> ObjectStoreResult<u64> {
        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ObjectStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let mut source = File::open(local_path).await?;
        let tmp_path = parent.join(format!("{TMP_PREFIX}{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let copied = async {
            let copied = tokio::io::copy(&mut source, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, io::Error>(copied)
        }
        .await;
        let copied = match copied {
            Ok(copied) => copied,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        };
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }
        Ok(copied)
    }

    /// Remove empty shard directories up to (not including) the base path.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    async fn read_dir_paths(dir: &Path) -> io::Result<Vec<(PathBuf, bool)>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            out.push((entry.path(), is_dir));
        }
        Ok(out)
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn put_payload(
        &self,
        key: &str,
        local_path: &Path,
        size: u64,
    ) -> ObjectStoreResult<()> {
        Self::ensure_key_safe(key)?;
        let copied = self.write_payload(key, local_path).await?;
        debug!(key, size, copied, "stored payload on disk");
        Ok(())
    }

    async fn delete_payload(&self, key: &str) -> ObjectStoreResult<()> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", file_path.display());
                return Ok(());
            }
            Err(err) => return Err(ObjectStoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> ObjectStoreResult<String> {
        Self::ensure_key_safe(key)?;
        Ok(self.signer.presigned_url(key, ttl))
    }

    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for (shard_a, is_dir) in Self::read_dir_paths(&self.base_path).await? {
            if !is_dir {
                continue;
            }
            for (shard_b, is_dir) in Self::read_dir_paths(&shard_a).await? {
                if !is_dir {
                    continue;
                }
                for (path, is_dir) in Self::read_dir_paths(&shard_b).await? {
                    let name = path.file_name().and_then(|n| n.to_str());
                    match name {
                        Some(name) if !is_dir && !name.starts_with(TMP_PREFIX) => {
                            keys.push(name.to_string())
                        }
                        _ => {}
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Write, read back and delete a probe file under the base path.
    async fn health_check(&self) -> ObjectStoreResult<()> {
        let probe = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let read = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;
        if read? != b"readyz" {
            return Err(ObjectStoreError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "probe file content mismatch",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn store() -> (FilesystemStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let signer = UrlSigner::new(b"secret", "http://localhost:3000").unwrap();
        let store = FilesystemStore::new(dir.path().join("objects"), signer)
            .await
            .unwrap();
        (store, dir)
    }

    async fn staged(dir: &tempfile::TempDir, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(format!("staged-{}", Uuid::new_v4()));
        fs::write(&path, bytes).await.unwrap();
        path
    }

    #[tokio::test]
    async fn put_then_open_returns_the_payload() {
        let (store, dir) = store().await;
        let src = staged(&dir, &[7u8; 750]).await;

        store.put_payload("k1", &src, 750).await.unwrap();

        let (mut file, len) = store.open("k1").await.unwrap();
        assert_eq!(len, 750);
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, vec![7u8; 750]);
        assert!(src.exists(), "staged file belongs to the caller");
    }

    #[tokio::test]
    async fn put_from_missing_source_fails_without_leaving_an_object() {
        let (store, dir) = store().await;
        let err = store
            .put_payload("k1", &dir.path().join("missing"), 10)
            .await
            .unwrap_err();

        assert!(matches!(err, ObjectStoreError::Io(_)));
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_payload_and_prunes_shards() {
        let (store, dir) = store().await;
        let src = staged(&dir, b"payload").await;
        store.put_payload("k1", &src, 7).await.unwrap();

        store.delete_payload("k1").await.unwrap();

        assert!(matches!(
            store.open("k1").await,
            Err(ObjectStoreError::NotFound(_))
        ));
        let (a, _) = FilesystemStore::shards("k1");
        assert!(!dir.path().join("objects").join(a).exists());
    }

    #[tokio::test]
    async fn deleting_a_missing_payload_succeeds() {
        let (store, _dir) = store().await;
        store.delete_payload("never-written").await.unwrap();
    }

    #[tokio::test]
    async fn presign_does_not_require_the_object() {
        let (store, _dir) = store().await;
        let url = store
            .presign_get("not-there", Duration::from_secs(600))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:3000/objects/not-there?"));
    }

    #[tokio::test]
    async fn list_keys_skips_temp_files() {
        let (store, dir) = store().await;
        for key in ["b", "a"] {
            let src = staged(&dir, key.as_bytes()).await;
            store.put_payload(key, &src, 1).await.unwrap();
        }
        let parent = store.object_path("a").parent().unwrap().to_path_buf();
        fs::write(parent.join(".tmp-leftover"), b"x").await.unwrap();

        assert_eq!(store.list_keys().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let (store, dir) = store().await;
        let src = staged(&dir, b"x").await;
        for key in ["", "../escape", "a/b", ".tmp-x", "a\\b"] {
            assert!(matches!(
                store.put_payload(key, &src, 1).await,
                Err(ObjectStoreError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn health_check_leaves_no_probe_behind() {
        let (store, dir) = store().await;
        store.health_check().await.unwrap();

        let mut entries = fs::read_dir(dir.path().join("objects")).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
