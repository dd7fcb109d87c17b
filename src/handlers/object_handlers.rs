//! Serves payloads of the filesystem backend behind signed URLs.
//! Streams object bodies to avoid buffering in memory. Error bodies use the
//! S3 XML shape so clients handle both backends' links the same way.

use super::AppState;
use crate::services::object_store::{ObjectStoreError, SignatureError};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

/// Query string of a presigned download URL.
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// `GET /objects/{key}?expires=..&signature=..`
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<SignedQuery>,
) -> Response {
    let Some(store) = state.filesystem.as_ref() else {
        return xml_error(StatusCode::NOT_FOUND, "NoSuchKey", "object serving disabled", &key);
    };

    let (Some(expires), Some(signature)) = (q.expires, q.signature.as_deref()) else {
        return xml_error(
            StatusCode::FORBIDDEN,
            "AccessDenied",
            "missing signature",
            &key,
        );
    };
    match store
        .signer()
        .verify(&key, expires, signature, Utc::now().timestamp())
    {
        Ok(()) => {}
        Err(SignatureError::Expired) => {
            return xml_error(
                StatusCode::FORBIDDEN,
                "AccessDenied",
                "Request has expired",
                &key,
            );
        }
        Err(SignatureError::Invalid) => {
            return xml_error(
                StatusCode::FORBIDDEN,
                "SignatureDoesNotMatch",
                "signature does not match",
                &key,
            );
        }
    }

    let (file, len) = match store.open(&key).await {
        Ok(opened) => opened,
        Err(ObjectStoreError::NotFound(_) | ObjectStoreError::InvalidKey(_)) => {
            return xml_error(
                StatusCode::NOT_FOUND,
                "NoSuchKey",
                "The specified key does not exist.",
                &key,
            );
        }
        Err(err) => {
            tracing::error!(key = %key, error = %err, "failed to open payload");
            return xml_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
                "internal error",
                &key,
            );
        }
    };

    let stream = ReaderStream::new(file);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    set_payload_headers(response.headers_mut(), &key, len);
    response
}

fn set_payload_headers(headers: &mut HeaderMap, key: &str, len: u64) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{key}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}

fn xml_error(status: StatusCode, code: &str, message: &str, key: &str) -> Response {
    let xml = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<Error><Code>{}</Code><Message>{}</Message><Key>{}</Key></Error>"#
        ),
        code,
        xml_escape(message),
        xml_escape(key)
    );
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"))],
        xml,
    )
        .into_response()
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
