use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stable identity for one example. Content lives entirely in the revision
/// log; examples are never physically removed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dataset_examples")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub dataset_id: i32,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::datasets::Entity",
        from = "Column::DatasetId",
        to = "super::datasets::Column::Id"
    )]
    Datasets,
    #[sea_orm(has_many = "super::dataset_example_revisions::Entity")]
    DatasetExampleRevisions,
}

impl Related<super::datasets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Datasets.def()
    }
}

impl Related<super::dataset_example_revisions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DatasetExampleRevisions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
