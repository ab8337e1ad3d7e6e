use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The atomic unit of change: one logged modification of one example at
/// one dataset version. A dataset's current state is derived entirely from
/// these rows; there is no separately stored "current" row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dataset_example_revisions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub dataset_example_id: i32,
    pub dataset_version_id: i32,
    pub input: Json,
    pub output: Json,
    pub metadata: Json,
    pub revision_kind: String,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::dataset_examples::Entity",
        from = "Column::DatasetExampleId",
        to = "super::dataset_examples::Column::Id"
    )]
    DatasetExamples,
    #[sea_orm(
        belongs_to = "super::dataset_versions::Entity",
        from = "Column::DatasetVersionId",
        to = "super::dataset_versions::Column::Id"
    )]
    DatasetVersions,
}

impl Related<super::dataset_examples::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DatasetExamples.def()
    }
}

impl Related<super::dataset_versions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DatasetVersions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevisionKind {
    Create,
    Patch,
    Delete,
}

impl RevisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionKind::Create => "CREATE",
            RevisionKind::Patch => "PATCH",
            RevisionKind::Delete => "DELETE",
        }
    }

    /// A DELETE revision is a tombstone and carries no payload.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, RevisionKind::Delete)
    }
}

impl From<RevisionKind> for String {
    fn from(kind: RevisionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl From<String> for RevisionKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "PATCH" => RevisionKind::Patch,
            "DELETE" => RevisionKind::Delete,
            _ => RevisionKind::Create,
        }
    }
}

impl Model {
    pub fn get_revision_kind(&self) -> RevisionKind {
        RevisionKind::from(self.revision_kind.clone())
    }
}
