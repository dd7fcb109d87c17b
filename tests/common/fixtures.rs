//! Payload and request fixtures.

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Deterministic payload of `len` bytes.
#[allow(dead_code)]
pub fn test_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Write `bytes` to a fresh file under `dir`, as an upload would be staged.
#[allow(dead_code)]
pub async fn stage(dir: &Path, bytes: &[u8]) -> PathBuf {
    let path = dir.join(format!("staged-{}", Uuid::new_v4()));
    tokio::fs::write(&path, bytes)
        .await
        .expect("Failed to write staged payload");
    path
}

/// A multipart/form-data body with an `id` field and a `file` part.
/// Returns the content type header value and the encoded body.
#[allow(dead_code)]
pub fn multipart_body(id: &str, payload: &[u8]) -> (String, Vec<u8>) {
    let boundary = "artifact-repo-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Disposition: form-data; name=\"id\"\r\n\r\n{id}\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{id}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

/// Path and query of a presigned URL, suitable for an in-process request.
#[allow(dead_code)]
pub fn path_of(url: &str) -> String {
    let start = url.find("/objects/").expect("not a presigned object URL");
    url[start..].to_string()
}
