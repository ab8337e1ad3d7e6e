//! The ingestion pipeline: synchronous validation, a bounded admission
//! queue, and the single background worker that turns admitted uploads
//! into new dataset versions.
//!
//! A successful submission acknowledges admission, not durability: the
//! worker applies jobs after the caller has already been answered, and
//! worker-side failures are logged rather than reported back. That
//! fire-and-forget contract is deliberate and load-bearing for upload
//! latency.

use std::collections::BTreeSet;

use chrono::Utc;
use sea_orm::*;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::database::entities::{datasets, RevisionKind};
use crate::decode::{
    decode_upload, keys::validate_role_keys, ContentEncoding, ContentType, Record, RecordIter,
};
use crate::error::{Error, Result};
use crate::store::revision_log;
use crate::store::revision_log::{NewRevision, RevisionPayload};

/// What an upload does to the named dataset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DatasetAction {
    /// Create a new dataset; the name must not be taken.
    Create,
    /// Append new examples to an existing dataset.
    Append,
}

impl DatasetAction {
    /// Absent or empty means `create`, matching the upload form default.
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value {
            None | Some("") | Some("create") => Ok(DatasetAction::Create),
            Some("append") => Ok(DatasetAction::Append),
            Some(other) => Err(Error::Malformed(format!("invalid dataset action: {other}"))),
        }
    }
}

/// An upload that passed form-level parsing and is ready for validation.
pub struct UploadRequest {
    pub action: DatasetAction,
    pub name: String,
    pub description: Option<String>,
    pub input_keys: BTreeSet<String>,
    pub output_keys: BTreeSet<String>,
    pub metadata_keys: BTreeSet<String>,
    pub content_type: ContentType,
    pub content_encoding: ContentEncoding,
    pub bytes: Vec<u8>,
}

/// A validated ingestion job: the write intent plus the still-lazy record
/// sequence. Dropping an unadmitted job releases the decoder and
/// everything it holds.
#[derive(Debug)]
pub struct IngestionJob {
    pub action: DatasetAction,
    pub name: String,
    pub description: Option<String>,
    pub input_keys: BTreeSet<String>,
    pub output_keys: BTreeSet<String>,
    pub metadata_keys: BTreeSet<String>,
    pub records: RecordIter,
}

/// RECEIVED -> VALIDATED: decoder selection, decompression, header parse,
/// role-key checks, and the name-uniqueness check for `create`. Nothing is
/// enqueued if any of this fails. Decoding runs on a blocking thread so
/// the request task stays responsive.
pub async fn validate_upload(
    db: &DatabaseConnection,
    request: UploadRequest,
) -> Result<IngestionJob> {
    if request.name.is_empty() {
        return Err(Error::Malformed("dataset name must not be empty".to_string()));
    }
    if request.action == DatasetAction::Create {
        let taken = datasets::Entity::find()
            .filter(datasets::Column::Name.eq(request.name.as_str()))
            .one(db)
            .await?
            .is_some();
        if taken {
            return Err(Error::Conflict(format!(
                "dataset already exists: name={}",
                request.name
            )));
        }
    }

    let UploadRequest {
        action,
        name,
        description,
        input_keys,
        output_keys,
        metadata_keys,
        content_type,
        content_encoding,
        bytes,
    } = request;
    let decoded = tokio::task::spawn_blocking(move || {
        decode_upload(bytes, content_type, content_encoding)
    })
    .await
    .map_err(|e| Error::InvalidState(format!("decode task failed: {e}")))??;

    validate_role_keys(&decoded.columns, &input_keys, &output_keys, &metadata_keys)?;

    Ok(IngestionJob {
        action,
        name,
        description,
        input_keys,
        output_keys,
        metadata_keys,
        records: decoded.records,
    })
}

/// Handle for submitting jobs to the admission queue.
#[derive(Clone)]
pub struct IngestionQueue {
    tx: mpsc::Sender<IngestionJob>,
}

/// Build the fixed-capacity admission queue. The receiver end goes to the
/// single worker task.
pub fn ingestion_channel(capacity: usize) -> (IngestionQueue, mpsc::Receiver<IngestionJob>) {
    let (tx, rx) = mpsc::channel(capacity);
    (IngestionQueue { tx }, rx)
}

impl IngestionQueue {
    /// VALIDATED -> ENQUEUED. Never blocks: a full queue rejects with
    /// `Capacity` immediately, dropping the job and with it the open
    /// decode resources.
    pub fn submit(&self, job: IngestionJob) -> Result<()> {
        self.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => {
                drop(job);
                Error::Capacity
            }
            TrySendError::Closed(_) => {
                Error::InvalidState("ingestion worker is not running".to_string())
            }
        })
    }
}

/// Spawn the single long-lived worker that drains the queue in submission
/// order, one job at a time. Serializing all writers here is what makes
/// "allocate next version, then append its revisions" race-free.
pub fn spawn_ingestion_worker(
    db: DatabaseConnection,
    mut rx: mpsc::Receiver<IngestionJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let dataset_name = job.name.clone();
            let action = job.action;
            match apply_ingestion(&db, job).await {
                Ok(outcome) => {
                    info!(
                        dataset = %dataset_name,
                        dataset_id = outcome.dataset_id,
                        version_id = outcome.version_id,
                        rows = outcome.row_count,
                        "applied ingestion job"
                    );
                }
                // The caller was answered at admission time; all we can do
                // here is leave enough context for operational recovery.
                Err(e) => {
                    error!(
                        dataset = %dataset_name,
                        ?action,
                        error = %e,
                        "ingestion job failed after admission"
                    );
                }
            }
        }
    })
}

#[derive(Debug)]
pub struct IngestionOutcome {
    pub dataset_id: i32,
    pub version_id: i32,
    pub row_count: usize,
}

/// ENQUEUED -> APPLIED: one new dataset version plus one CREATE revision
/// per decoded record, committed as a single transaction. Nothing of a
/// failed job is visible in any snapshot.
pub async fn apply_ingestion(
    db: &DatabaseConnection,
    job: IngestionJob,
) -> Result<IngestionOutcome> {
    let IngestionJob {
        action,
        name,
        description,
        input_keys,
        output_keys,
        metadata_keys,
        records,
    } = job;

    // Drain the lazy decoder off the async runtime; this is the CPU-bound
    // half of ingestion.
    let rows: Vec<Record> = tokio::task::spawn_blocking(move || records.collect::<Result<_>>())
        .await
        .map_err(|e| Error::InvalidState(format!("decode task failed: {e}")))??;
    let row_count = rows.len();

    let txn = db.begin().await?;
    let now = Utc::now();

    let dataset = match action {
        DatasetAction::Create => {
            let dataset = datasets::ActiveModel {
                name: Set(name.clone()),
                description: Set(description.clone()),
                metadata: Set(json!({})),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            datasets::Entity::insert(dataset).exec_with_returning(&txn).await?
        }
        DatasetAction::Append => datasets::Entity::find()
            .filter(datasets::Column::Name.eq(name.as_str()))
            .one(&txn)
            .await?
            .ok_or_else(|| Error::NotFound(format!("dataset does not exist: name={name}")))?,
    };

    let version = revision_log::create_version(&txn, dataset.id, description).await?;

    let mut revisions = Vec::with_capacity(rows.len());
    for row in &rows {
        let example = revision_log::create_example(&txn, dataset.id).await?;
        revisions.push(NewRevision {
            example_id: example.id,
            kind: RevisionKind::Create,
            payload: split_record(row, &input_keys, &output_keys, &metadata_keys),
        });
    }
    revision_log::append_batch(&txn, dataset.id, version.id, revisions).await?;

    let mut touched: datasets::ActiveModel = dataset.clone().into();
    touched.updated_at = Set(now);
    touched.update(&txn).await?;

    txn.commit().await?;

    Ok(IngestionOutcome {
        dataset_id: dataset.id,
        version_id: version.id,
        row_count,
    })
}

/// Split one decoded record into the three payload documents by role.
/// Keys a record does not carry become explicit nulls.
fn split_record(
    row: &Record,
    input_keys: &BTreeSet<String>,
    output_keys: &BTreeSet<String>,
    metadata_keys: &BTreeSet<String>,
) -> RevisionPayload {
    let pick = |keys: &BTreeSet<String>| -> Value {
        Value::Object(
            keys.iter()
                .map(|key| (key.clone(), row.get(key).cloned().unwrap_or(Value::Null)))
                .collect(),
        )
    };
    RevisionPayload {
        input: pick(input_keys),
        output: pick(output_keys),
        metadata: pick(metadata_keys),
    }
}
