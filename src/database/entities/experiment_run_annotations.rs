use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A named evaluation result attached to an experiment run. Exactly one
/// row exists per (experiment_run_id, name); later writes overwrite it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "experiment_run_annotations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub experiment_run_id: i32,
    pub name: String,
    pub annotator_kind: String,
    pub label: Option<String>,
    pub score: Option<f64>,
    pub explanation: Option<String>,
    pub error: Option<String>,
    pub metadata: Json,
    pub trace_id: Option<String>,
    pub start_time: ChronoDateTimeUtc,
    pub end_time: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
