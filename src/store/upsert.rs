//! Conflict-aware upsert: one logical "insert, or update the existing row
//! on a key collision" mapped onto the active backend's native conflict
//! clause. Used to attach named evaluation results to run records exactly
//! once per (run, name) pair.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{IntoIden, OnConflict};
use sea_orm::*;
use serde_json::Value;

use crate::database::entities::experiment_run_annotations as annotations;
use crate::error::{Error, Result};

/// Storage dialects with a supported merge statement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    Postgres,
}

impl SqlDialect {
    pub fn try_from_backend(backend: DatabaseBackend) -> Result<Self> {
        match backend {
            DatabaseBackend::Sqlite => Ok(SqlDialect::Sqlite),
            DatabaseBackend::Postgres => Ok(SqlDialect::Postgres),
            other => Err(Error::InvalidState(format!(
                "unsupported backend for upsert: {other:?}"
            ))),
        }
    }

    /// Map the logical insert-or-update onto the backend's statement
    /// shape. The constraint columns identify the row; on collision the
    /// update columns are overwritten and the key columns are left alone.
    pub fn insert_or_update<T, K, U>(&self, constraint: K, update: U) -> OnConflict
    where
        T: IntoIden,
        K: IntoIterator<Item = T>,
        U: IntoIterator<Item = T>,
    {
        match self {
            // Both render as `ON CONFLICT (..) DO UPDATE SET ..`.
            SqlDialect::Sqlite | SqlDialect::Postgres => OnConflict::columns(constraint)
                .update_columns(update)
                .to_owned(),
        }
    }
}

/// A named evaluation result to attach to an experiment run.
#[derive(Debug, Clone)]
pub struct EvaluationUpsert {
    pub experiment_run_id: i32,
    pub name: String,
    pub annotator_kind: String,
    pub label: Option<String>,
    pub score: Option<f64>,
    pub explanation: Option<String>,
    pub error: Option<String>,
    pub metadata: Value,
    pub trace_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Insert the evaluation, or overwrite the existing one for the same
/// (experiment_run_id, name) key. Returns the stored row; atomic with
/// respect to concurrent callers racing on the same key because it is a
/// single merge statement.
pub async fn upsert_experiment_evaluation(
    db: &DatabaseConnection,
    eval: EvaluationUpsert,
) -> Result<annotations::Model> {
    let dialect = SqlDialect::try_from_backend(db.get_database_backend())?;
    let on_conflict = dialect.insert_or_update(
        [
            annotations::Column::ExperimentRunId,
            annotations::Column::Name,
        ],
        [
            annotations::Column::AnnotatorKind,
            annotations::Column::Label,
            annotations::Column::Score,
            annotations::Column::Explanation,
            annotations::Column::Error,
            annotations::Column::Metadata,
            annotations::Column::TraceId,
            annotations::Column::StartTime,
            annotations::Column::EndTime,
        ],
    );

    let row = annotations::ActiveModel {
        experiment_run_id: Set(eval.experiment_run_id),
        name: Set(eval.name),
        annotator_kind: Set(eval.annotator_kind),
        label: Set(eval.label),
        score: Set(eval.score),
        explanation: Set(eval.explanation),
        error: Set(eval.error),
        metadata: Set(eval.metadata),
        trace_id: Set(eval.trace_id),
        start_time: Set(eval.start_time),
        end_time: Set(eval.end_time),
        ..Default::default()
    };
    annotations::Entity::insert(row)
        .on_conflict(on_conflict)
        .exec_with_returning(db)
        .await
        .map_err(Into::into)
}
