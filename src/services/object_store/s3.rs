//! S3-compatible object store using the AWS SDK.

use super::{ObjectStore, ObjectStoreError, ObjectStoreResult};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region},
    error::SdkError,
    presigning::PresigningConfig,
    primitives::ByteStream,
};
use std::{path::Path, time::Duration};
use tracing::instrument;

const PAYLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// Connection settings for an S3-compatible endpoint.
#[derive(Clone)]
pub struct S3Settings {
    pub bucket: String,
    /// Custom endpoint (MinIO and friends). `None` means AWS.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Use `endpoint/bucket/key` addressing instead of virtual hosts.
    pub force_path_style: bool,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .finish_non_exhaustive()
    }
}

/// Requests that never got a response become `Unavailable`; everything the
/// service actually answered stays an `S3` error.
fn map_sdk_error<E>(err: SdkError<E>) -> ObjectStoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            ObjectStoreError::Unavailable(Box::new(err))
        }
        err => ObjectStoreError::S3(Box::new(err)),
    }
}

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// Build a client from settings. Performs no network I/O.
    pub fn new(settings: &S3Settings) -> ObjectStoreResult<Self> {
        if settings.bucket.is_empty() {
            return Err(ObjectStoreError::Config(
                "s3 bucket name must not be empty".to_string(),
            ));
        }
        if settings.access_key_id.is_empty() || settings.secret_access_key.is_empty() {
            return Err(ObjectStoreError::Config(
                "s3 requires both access_key_id and secret_access_key".to_string(),
            ));
        }

        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "artifact-repo-config",
        );
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(settings.force_path_style);

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(normalize_endpoint(endpoint));
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
        })
    }
}

/// Bare `host:port` endpoints are treated as plain HTTP.
fn normalize_endpoint(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self, local_path), fields(backend = "s3"))]
    async fn put_payload(
        &self,
        key: &str,
        local_path: &Path,
        size: u64,
    ) -> ObjectStoreResult<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|err| ObjectStoreError::S3(Box::new(err)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(PAYLOAD_CONTENT_TYPE)
            .content_length(i64::try_from(size).unwrap_or(i64::MAX))
            .body(body)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete_payload(&self, key: &str) -> ObjectStoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn presign_get(&self, key: &str, ttl: Duration) -> ObjectStoreResult<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|err| ObjectStoreError::Config(err.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_disposition(format!("attachment; filename=\"{key}\""))
            .presigned(presigning)
            .await
            .map_err(map_sdk_error)?;

        Ok(request.uri().to_string())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(map_sdk_error)?;
            for obj in output.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(str::to_string);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(keys)
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> ObjectStoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> S3Settings {
        S3Settings {
            bucket: "artifacts".into(),
            endpoint: Some("minio:9000".into()),
            region: "us-east-1".into(),
            access_key_id: "minioadmin".into(),
            secret_access_key: "minioadmin".into(),
            force_path_style: true,
        }
    }

    #[test]
    fn new_requires_complete_credentials() {
        let mut incomplete = settings();
        incomplete.secret_access_key.clear();
        assert!(matches!(
            S3Store::new(&incomplete),
            Err(ObjectStoreError::Config(_))
        ));
    }

    #[test]
    fn new_requires_a_bucket() {
        let mut no_bucket = settings();
        no_bucket.bucket.clear();
        assert!(matches!(
            S3Store::new(&no_bucket),
            Err(ObjectStoreError::Config(_))
        ));
    }

    #[test]
    fn endpoints_without_scheme_default_to_http() {
        assert_eq!(normalize_endpoint("minio:9000"), "http://minio:9000");
        assert_eq!(
            normalize_endpoint("https://s3.example.com"),
            "https://s3.example.com"
        );
    }

    #[tokio::test]
    async fn presign_is_offline_and_scoped_to_the_key() {
        let store = S3Store::new(&settings()).unwrap();
        let url = store
            .presign_get("3f1c-key", Duration::from_secs(600))
            .await
            .unwrap();

        assert!(url.starts_with("http://minio:9000/artifacts/3f1c-key?"));
        assert!(url.contains("X-Amz-Expires=600"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("response-content-disposition="));
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let mut unreachable = settings();
        unreachable.endpoint = Some("127.0.0.1:1".into());
        let store = S3Store::new(&unreachable).unwrap();

        let err = store.health_check().await.unwrap_err();
        assert!(
            matches!(err, ObjectStoreError::Unavailable(_)),
            "unexpected error: {err:?}"
        );
        assert!(err.is_unavailable());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", settings());
        assert!(!rendered.contains("minioadmin"));
    }
}
