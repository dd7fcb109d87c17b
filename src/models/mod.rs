//! Core data models for the project/artifact repository.
//!
//! Domain values (`Project`, `Artifact`) are kept separate from their
//! persistence rows (`sqlx::FromRow`) and from their JSON wire shapes, with
//! pure conversions between them.

pub mod artifact;
pub mod project;

use thiserror::Error;

/// Failures converting stored rows back into domain values.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("stored identifier `{value}` is not a valid {kind} id")]
    InvalidIdentifier { kind: &'static str, value: String },
}

pub(crate) fn parse_uuid(kind: &'static str, value: &str) -> Result<uuid::Uuid, ModelError> {
    uuid::Uuid::parse_str(value).map_err(|_| ModelError::InvalidIdentifier {
        kind,
        value: value.to_string(),
    })
}
