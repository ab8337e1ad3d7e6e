use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "datasets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub description: Option<String>,
    pub metadata: Json,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::dataset_versions::Entity")]
    DatasetVersions,
    #[sea_orm(has_many = "super::dataset_examples::Entity")]
    DatasetExamples,
}

impl Related<super::dataset_versions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DatasetVersions.def()
    }
}

impl Related<super::dataset_examples::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DatasetExamples.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
