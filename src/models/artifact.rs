//! Represents an artifact (content-addressed payload) owned by a project.

use super::{ModelError, parse_uuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single artifact within a project.
///
/// The `content_id` is what callers address the artifact by; the payload
/// itself lives in the object store under `storage_key`.
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    /// Object-store key. Generated at creation, never shown to callers.
    pub storage_key: Uuid,

    /// Caller-chosen identifier, expected to be a hash of the payload.
    pub content_id: String,

    /// Size in bytes as declared at upload time.
    pub size: u64,

    /// Presigned download URL. Only set on single-artifact reads.
    pub access_url: Option<String>,
}

/// Row in the `artifacts` table. `id` is the storage key.
#[derive(Clone, Debug, FromRow)]
pub struct ArtifactRow {
    pub id: String,
    pub project_id: String,
    pub content_id: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// Artifact as returned over the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ArtifactView {
    pub id: String,
    pub location: Option<String>,
    pub size: u64,
}

impl ArtifactRow {
    /// A new row with a freshly generated storage key.
    pub fn fresh(project_id: Uuid, content_id: &str, size: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            content_id: content_id.to_string(),
            size_bytes: i64::try_from(size).unwrap_or(i64::MAX),
            created_at: Utc::now(),
        }
    }
}

impl Artifact {
    pub fn from_row(row: &ArtifactRow) -> Result<Self, ModelError> {
        Ok(Self {
            storage_key: parse_uuid("artifact", &row.id)?,
            content_id: row.content_id.clone(),
            size: row.size_bytes.max(0) as u64,
            access_url: None,
        })
    }

    pub fn to_view(&self) -> ArtifactView {
        ArtifactView {
            id: self.content_id.clone(),
            location: self.access_url.clone(),
            size: self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_rows_get_distinct_storage_keys() {
        let project_id = Uuid::new_v4();
        let a = ArtifactRow::fresh(project_id, "abc123", 750);
        let b = ArtifactRow::fresh(project_id, "abc123", 750);

        assert_ne!(a.id, b.id);
        assert_eq!(a.project_id, project_id.to_string());
        assert_eq!(a.size_bytes, 750);
    }

    #[test]
    fn from_row_keeps_the_storage_key() {
        let project_id = Uuid::new_v4();
        let row = ArtifactRow::fresh(project_id, "abc123", 750);
        let artifact = Artifact::from_row(&row).unwrap();

        assert_eq!(artifact.storage_key.to_string(), row.id);
        assert_eq!(artifact.size, 750);
        assert_eq!(artifact.access_url, None);
        assert_eq!(artifact.content_id, "abc123");
    }

    #[test]
    fn view_exposes_content_id_not_storage_key() {
        let mut artifact = Artifact::from_row(&ArtifactRow::fresh(Uuid::new_v4(), "abc", 3)).unwrap();
        artifact.access_url = Some("http://localhost/objects/x".into());

        let view = artifact.to_view();
        assert_eq!(view.id, "abc");
        assert_eq!(view.location.as_deref(), Some("http://localhost/objects/x"));
        assert_eq!(view.size, 3);
    }

    #[test]
    fn negative_stored_size_reads_as_zero() {
        let mut row = ArtifactRow::fresh(Uuid::new_v4(), "abc", 0);
        row.size_bytes = -5;
        assert_eq!(Artifact::from_row(&row).unwrap().size, 0);
    }
}
