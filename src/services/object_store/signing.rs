//! HMAC-SHA256 signed download URLs for the filesystem backend.
//!
//! A URL has the shape `{base}/objects/{key}?expires={unix}&signature={hex}`
//! where the signature covers `GET\n{key}\n{expires}`.

use super::{ObjectStoreError, ObjectStoreResult};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Path prefix the transport serves signed objects under.
pub const OBJECTS_PATH: &str = "/objects";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signed URL has expired")]
    Expired,
    #[error("signature does not match")]
    Invalid,
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    public_base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: &[u8], public_base_url: &str) -> ObjectStoreResult<Self> {
        if secret.is_empty() {
            return Err(ObjectStoreError::Config(
                "signing secret must not be empty".to_string(),
            ));
        }
        let lower = public_base_url.to_ascii_lowercase();
        if !lower.starts_with("http://") && !lower.starts_with("https://") {
            return Err(ObjectStoreError::Config(format!(
                "public base url `{public_base_url}` must be absolute http(s)"
            )));
        }

        Ok(Self {
            secret: secret.to_vec(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(format!("GET\n{key}\n{expires}").as_bytes());
        mac
    }

    /// Hex signature for `key` expiring at unix time `expires`.
    pub fn sign(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    /// Absolute URL for `key`, valid for `ttl` from now.
    pub fn presigned_url(&self, key: &str, ttl: Duration) -> String {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        format!(
            "{}{}/{}?expires={}&signature={}",
            self.public_base_url,
            OBJECTS_PATH,
            key,
            expires,
            self.sign(key, expires)
        )
    }

    /// Check a signature presented at unix time `now`.
    pub fn verify(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        let bytes = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
        self.mac(key, expires)
            .verify_slice(&bytes)
            .map_err(|_| SignatureError::Invalid)?;
        if now > expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}
