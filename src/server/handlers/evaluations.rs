use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::database::entities::experiment_run_annotations as annotations;
use crate::error::Error;
use crate::server::app::AppState;
use crate::store::upsert::{upsert_experiment_evaluation, EvaluationUpsert};

#[derive(Debug, Deserialize)]
pub struct UpsertEvaluationRequest {
    pub experiment_run_id: i32,
    pub name: String,
    pub annotator_kind: String,
    pub result: Option<EvaluationResult>,
    pub error: Option<String>,
    pub metadata: Option<Value>,
    pub trace_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub label: Option<String>,
    pub score: Option<f64>,
    pub explanation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EvaluationResponse {
    pub id: i32,
    pub experiment_run_id: i32,
    pub name: String,
    pub annotator_kind: String,
    pub error: Option<String>,
    pub result: EvaluationResult,
    pub metadata: Value,
    pub start_time: String,
    pub end_time: String,
}

impl From<annotations::Model> for EvaluationResponse {
    fn from(row: annotations::Model) -> Self {
        Self {
            id: row.id,
            experiment_run_id: row.experiment_run_id,
            name: row.name,
            annotator_kind: row.annotator_kind,
            error: row.error,
            result: EvaluationResult {
                label: row.label,
                score: row.score,
                explanation: row.explanation,
            },
            metadata: row.metadata,
            start_time: row.start_time.to_rfc3339(),
            end_time: row.end_time.to_rfc3339(),
        }
    }
}

/// Attach a named evaluation result to an experiment run. Repeated calls
/// with the same (run, name) pair overwrite the stored result instead of
/// duplicating it.
pub async fn upsert_evaluation(
    State(state): State<AppState>,
    Json(payload): Json<UpsertEvaluationRequest>,
) -> Result<Json<EvaluationResponse>, Error> {
    let result = payload.result.unwrap_or(EvaluationResult {
        label: None,
        score: None,
        explanation: None,
    });
    let row = upsert_experiment_evaluation(
        &state.db,
        EvaluationUpsert {
            experiment_run_id: payload.experiment_run_id,
            name: payload.name,
            annotator_kind: payload.annotator_kind,
            label: result.label,
            score: result.score,
            explanation: result.explanation,
            error: payload.error,
            metadata: payload.metadata.unwrap_or_else(|| json!({})),
            trace_id: payload.trace_id,
            start_time: payload.start_time,
            end_time: payload.end_time,
        },
    )
    .await?;
    Ok(Json(row.into()))
}
