//! Represents a project, a named ownership boundary for artifacts.

use super::{
    ModelError,
    artifact::{Artifact, ArtifactRow, ArtifactView},
    parse_uuid,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A project and the artifacts it owns.
///
/// `artifacts` is only populated when the project was loaded through the
/// repository; a freshly created project owns nothing yet.
#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    /// Random identifier assigned at creation. Never changes.
    pub id: Uuid,

    /// System-wide unique name.
    pub name: String,

    /// Free text.
    pub description: String,

    pub created_at: DateTime<Utc>,

    pub artifacts: Vec<Artifact>,
}

/// Row in the `projects` table.
#[derive(Clone, Debug, FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Project as listed over the wire, without artifacts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Project as returned by single-project reads, artifacts included.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExtendedProject {
    pub id: String,
    pub name: String,
    pub description: String,
    pub artifacts: Vec<ArtifactView>,
}

impl Project {
    /// Build a new project with a fresh identifier and the current time.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            created_at: Utc::now(),
            artifacts: Vec::new(),
        }
    }

    /// Assemble a project from its row and the rows of the artifacts it owns.
    pub fn from_rows(row: ProjectRow, artifacts: &[ArtifactRow]) -> Result<Self, ModelError> {
        let id = parse_uuid("project", &row.id)?;
        let artifacts = artifacts
            .iter()
            .map(Artifact::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            artifacts,
        })
    }

    pub fn to_row(&self) -> ProjectRow {
        ProjectRow {
            id: self.id.to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
        }
    }

    pub fn to_summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id.to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }

    pub fn to_extended(&self) -> ExtendedProject {
        ExtendedProject {
            id: self.id.to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            artifacts: self.artifacts.iter().map(Artifact::to_view).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact_row(project_id: &str, content_id: &str) -> ArtifactRow {
        ArtifactRow {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            content_id: content_id.to_string(),
            size_bytes: 12,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn row_conversion_keeps_identity() {
        let project = Project::new("demo", "a demo project");
        let row = project.to_row();
        let artifacts = vec![artifact_row(&row.id, "abc"), artifact_row(&row.id, "def")];

        let loaded = Project::from_rows(row, &artifacts).unwrap();
        assert_eq!(loaded.id, project.id);
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.description, "a demo project");
        assert_eq!(loaded.artifacts.len(), 2);
        assert_eq!(loaded.artifacts[0].content_id, "abc");
    }

    #[test]
    fn malformed_stored_id_is_rejected() {
        let mut row = Project::new("demo", "").to_row();
        row.id = "not-a-uuid".into();

        match Project::from_rows(row, &[]) {
            Err(ModelError::InvalidIdentifier { kind, value }) => {
                assert_eq!(kind, "project");
                assert_eq!(value, "not-a-uuid");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn malformed_artifact_id_fails_the_whole_project() {
        let row = Project::new("demo", "").to_row();
        let mut bad = artifact_row(&row.id, "abc");
        bad.id = "garbage".into();

        assert!(matches!(
            Project::from_rows(row, &[bad]),
            Err(ModelError::InvalidIdentifier { kind: "artifact", .. })
        ));
    }

    #[test]
    fn extended_view_lists_artifacts_without_links() {
        let row = Project::new("demo", "desc").to_row();
        let project = Project::from_rows(row.clone(), &[artifact_row(&row.id, "abc")]).unwrap();

        let view = project.to_extended();
        assert_eq!(view.id, row.id);
        assert_eq!(view.artifacts.len(), 1);
        assert_eq!(view.artifacts[0].id, "abc");
        assert_eq!(view.artifacts[0].location, None);
        assert_eq!(project.to_summary().name, "demo");
    }
}
