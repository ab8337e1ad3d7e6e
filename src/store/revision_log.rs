//! The append-only revision log: version allocation, example identity, and
//! revision appends. The log is the source of truth for dataset content;
//! nothing here ever updates a revision row in place.

use chrono::Utc;
use sea_orm::*;
use serde_json::{json, Value};
use tracing::debug;

use crate::database::entities::{
    dataset_example_revisions, dataset_examples, dataset_versions, datasets, RevisionKind,
};
use crate::error::{Error, Result};

/// Payload fields of one revision. Tombstones carry no payload.
#[derive(Debug, Clone)]
pub struct RevisionPayload {
    pub input: Value,
    pub output: Value,
    pub metadata: Value,
}

impl RevisionPayload {
    pub fn empty() -> Self {
        Self {
            input: json!({}),
            output: json!({}),
            metadata: json!({}),
        }
    }
}

/// One pending revision for a batched append.
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub example_id: i32,
    pub kind: RevisionKind,
    pub payload: RevisionPayload,
}

/// Allocate the next version of a dataset. Version ids come from the
/// autoincrement key, so they are strictly monotonic per dataset and
/// never reused.
pub async fn create_version<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i32,
    description: Option<String>,
) -> Result<dataset_versions::Model> {
    let dataset = datasets::Entity::find_by_id(dataset_id)
        .one(conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("dataset {dataset_id} does not exist")))?;

    let version = dataset_versions::ActiveModel {
        dataset_id: Set(dataset.id),
        description: Set(description),
        metadata: Set(json!({})),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let version = dataset_versions::Entity::insert(version)
        .exec_with_returning(conn)
        .await?;

    debug!(dataset_id, version_id = version.id, "allocated dataset version");
    Ok(version)
}

/// Mint a stable example identity. Content is attached separately through
/// CREATE revisions.
pub async fn create_example<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i32,
) -> Result<dataset_examples::Model> {
    let example = dataset_examples::ActiveModel {
        dataset_id: Set(dataset_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    dataset_examples::Entity::insert(example)
        .exec_with_returning(conn)
        .await
        .map_err(Into::into)
}

pub async fn latest_version_id<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i32,
) -> Result<Option<i32>> {
    let latest = dataset_versions::Entity::find()
        .filter(dataset_versions::Column::DatasetId.eq(dataset_id))
        .order_by_desc(dataset_versions::Column::Id)
        .one(conn)
        .await?;
    Ok(latest.map(|v| v.id))
}

/// Append one revision row. `version_id` must be the most recently
/// allocated version of the dataset; PATCH and DELETE must reference an
/// example that already has a revision. Violations are `InvalidState`,
/// never a partial write.
pub async fn append_revision<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i32,
    version_id: i32,
    example_id: i32,
    kind: RevisionKind,
    payload: RevisionPayload,
) -> Result<dataset_example_revisions::Model> {
    check_version_is_latest(conn, dataset_id, version_id).await?;
    check_example_reference(conn, dataset_id, example_id, kind).await?;

    let payload = if kind.is_tombstone() {
        RevisionPayload::empty()
    } else {
        payload
    };
    let revision = dataset_example_revisions::ActiveModel {
        dataset_example_id: Set(example_id),
        dataset_version_id: Set(version_id),
        input: Set(payload.input),
        output: Set(payload.output),
        metadata: Set(payload.metadata),
        revision_kind: Set(kind.into()),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    dataset_example_revisions::Entity::insert(revision)
        .exec_with_returning(conn)
        .await
        .map_err(Into::into)
}

/// Batched append inside an existing transaction. The latest-version guard
/// runs once; example references are checked per revision.
pub async fn append_batch<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i32,
    version_id: i32,
    revisions: Vec<NewRevision>,
) -> Result<()> {
    if revisions.is_empty() {
        return Ok(());
    }
    check_version_is_latest(conn, dataset_id, version_id).await?;

    let now = Utc::now();
    let mut rows = Vec::with_capacity(revisions.len());
    for revision in revisions {
        check_example_reference(conn, dataset_id, revision.example_id, revision.kind).await?;
        let payload = if revision.kind.is_tombstone() {
            RevisionPayload::empty()
        } else {
            revision.payload
        };
        rows.push(dataset_example_revisions::ActiveModel {
            dataset_example_id: Set(revision.example_id),
            dataset_version_id: Set(version_id),
            input: Set(payload.input),
            output: Set(payload.output),
            metadata: Set(payload.metadata),
            revision_kind: Set(revision.kind.into()),
            created_at: Set(now),
            ..Default::default()
        });
    }
    dataset_example_revisions::Entity::insert_many(rows)
        .exec(conn)
        .await?;
    Ok(())
}

/// Batched append as a single atomic unit: either every revision for the
/// version is durable or none is.
pub async fn append_revisions(
    db: &DatabaseConnection,
    dataset_id: i32,
    version_id: i32,
    revisions: Vec<NewRevision>,
) -> Result<()> {
    let txn = db.begin().await?;
    append_batch(&txn, dataset_id, version_id, revisions).await?;
    txn.commit().await?;
    Ok(())
}

/// Guard against out-of-order writers: appends are only accepted against
/// the most recently allocated version of the dataset.
async fn check_version_is_latest<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i32,
    version_id: i32,
) -> Result<()> {
    match latest_version_id(conn, dataset_id).await? {
        Some(latest) if latest == version_id => Ok(()),
        Some(latest) => Err(Error::InvalidState(format!(
            "version {version_id} is stale for dataset {dataset_id}: latest is {latest}"
        ))),
        None => Err(Error::InvalidState(format!(
            "dataset {dataset_id} has no versions; version {version_id} was not allocated here"
        ))),
    }
}

async fn check_example_reference<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i32,
    example_id: i32,
    kind: RevisionKind,
) -> Result<()> {
    let example = dataset_examples::Entity::find_by_id(example_id)
        .one(conn)
        .await?
        .filter(|example| example.dataset_id == dataset_id)
        .ok_or_else(|| {
            Error::InvalidState(format!(
                "example {example_id} does not belong to dataset {dataset_id}"
            ))
        })?;

    if matches!(kind, RevisionKind::Patch | RevisionKind::Delete) {
        let prior = dataset_example_revisions::Entity::find()
            .filter(dataset_example_revisions::Column::DatasetExampleId.eq(example.id))
            .count(conn)
            .await?;
        if prior == 0 {
            return Err(Error::InvalidState(format!(
                "{} revision references example {example_id} with no prior revision",
                kind.as_str()
            )));
        }
    }
    Ok(())
}
