//! Snapshot reconstruction: the point-in-time, deletion-filtered view of a
//! dataset, computed from the revision log in a single grouped scan.

use sea_orm::sea_query::{Alias, Asterisk, Condition, Expr, JoinType, Order, Query, SelectStatement};
use sea_orm::*;
use serde_json::Value;

use crate::database::entities::{
    dataset_example_revisions as revisions, dataset_examples, dataset_versions, datasets,
    RevisionKind,
};
use crate::decode::Record;
use crate::error::{Error, Result};
use crate::store::revision_log::latest_version_id;

/// One surviving example of a snapshot. `example_index` is dense,
/// zero-based, assigned by ascending example id at read time; it is a
/// presentation artifact and is never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedExample {
    pub example_id: i32,
    pub example_index: usize,
    pub record: Record,
}

#[derive(Debug, FromQueryResult)]
struct SnapshotRow {
    dataset_example_id: i32,
    input: Value,
    output: Value,
    metadata: Value,
}

/// Reconstruct the visible example set of a dataset as of a version
/// ceiling (latest when `as_of_version` is `None`).
///
/// `NotFound` when the dataset does not exist, and when an explicit
/// version does not exist or belongs to another dataset; an unknown
/// version never silently falls back to latest.
pub async fn get_snapshot<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i32,
    as_of_version: Option<i32>,
) -> Result<Vec<MaterializedExample>> {
    let ceiling = match resolve_ceiling(conn, dataset_id, as_of_version).await? {
        Some(ceiling) => ceiling,
        None => return Ok(Vec::new()),
    };

    let statement = conn
        .get_database_backend()
        .build(&visible_revisions_query(dataset_id, ceiling));
    let rows = SnapshotRow::find_by_statement(statement).all(conn).await?;

    let mut examples = Vec::with_capacity(rows.len());
    for (example_index, row) in rows.into_iter().enumerate() {
        examples.push(MaterializedExample {
            example_id: row.dataset_example_id,
            example_index,
            record: merge_payload(row.metadata, row.input, row.output),
        });
    }
    Ok(examples)
}

/// Number of currently-visible examples (snapshot cardinality at latest).
pub async fn example_count<C: ConnectionTrait>(conn: &C, dataset_id: i32) -> Result<u64> {
    let ceiling = match resolve_ceiling(conn, dataset_id, None).await? {
        Some(ceiling) => ceiling,
        None => return Ok(0),
    };
    let count_query = Query::select()
        .expr(Expr::col(Asterisk).count())
        .from_subquery(visible_revisions_query(dataset_id, ceiling), Alias::new("snapshot"))
        .to_owned();
    let statement = conn.get_database_backend().build(&count_query);
    let row = conn
        .query_one(statement)
        .await?
        .ok_or_else(|| Error::InvalidState("count query returned no row".to_string()))?;
    let count: i64 = row.try_get_by_index(0)?;
    Ok(count as u64)
}

/// Validate the requested ceiling. `Ok(None)` means the dataset exists but
/// has no versions yet, i.e. every snapshot of it is empty.
async fn resolve_ceiling<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i32,
    as_of_version: Option<i32>,
) -> Result<Option<i32>> {
    let dataset = datasets::Entity::find_by_id(dataset_id)
        .one(conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("dataset {dataset_id} does not exist")))?;

    match as_of_version {
        Some(version_id) => {
            let version = dataset_versions::Entity::find_by_id(version_id)
                .one(conn)
                .await?
                .filter(|version| version.dataset_id == dataset.id)
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "dataset version {version_id} does not exist for dataset {dataset_id}"
                    ))
                })?;
            Ok(Some(version.id))
        }
        None => latest_version_id(conn, dataset_id).await,
    }
}

/// The single-pass "latest qualifying revision per example" query: group
/// revisions by example, take the greatest version at or below the
/// ceiling, join back to revision content, and drop tombstones. Ordered by
/// example id so the dense index is reproducible on every read.
fn visible_revisions_query(dataset_id: i32, ceiling: i32) -> SelectStatement {
    let latest = Alias::new("latest");
    let example_id = Alias::new("example_id");
    let version_id = Alias::new("version_id");

    let per_example_max = Query::select()
        .expr_as(
            Expr::col((revisions::Entity, revisions::Column::DatasetExampleId)),
            example_id.clone(),
        )
        .expr_as(
            Expr::col((revisions::Entity, revisions::Column::DatasetVersionId)).max(),
            version_id.clone(),
        )
        .from(revisions::Entity)
        .inner_join(
            dataset_examples::Entity,
            Expr::col((dataset_examples::Entity, dataset_examples::Column::Id))
                .equals((revisions::Entity, revisions::Column::DatasetExampleId)),
        )
        .and_where(
            Expr::col((dataset_examples::Entity, dataset_examples::Column::DatasetId))
                .eq(dataset_id),
        )
        .and_where(
            Expr::col((revisions::Entity, revisions::Column::DatasetVersionId)).lte(ceiling),
        )
        .group_by_col((revisions::Entity, revisions::Column::DatasetExampleId))
        .to_owned();

    Query::select()
        .columns([
            (revisions::Entity, revisions::Column::DatasetExampleId),
            (revisions::Entity, revisions::Column::Input),
            (revisions::Entity, revisions::Column::Output),
            (revisions::Entity, revisions::Column::Metadata),
        ])
        .from(revisions::Entity)
        .join_subquery(
            JoinType::InnerJoin,
            per_example_max,
            latest.clone(),
            Condition::all()
                .add(
                    Expr::col((revisions::Entity, revisions::Column::DatasetExampleId))
                        .equals((latest.clone(), example_id)),
                )
                .add(
                    Expr::col((revisions::Entity, revisions::Column::DatasetVersionId))
                        .equals((latest, version_id)),
                ),
        )
        .and_where(
            Expr::col((revisions::Entity, revisions::Column::RevisionKind))
                .ne(RevisionKind::Delete.as_str()),
        )
        .order_by(
            (revisions::Entity, revisions::Column::DatasetExampleId),
            Order::Asc,
        )
        .to_owned()
}

/// Merge the payload documents into one flat record. Later fields win on
/// key collision: metadata, then input, then output.
fn merge_payload(metadata: Value, input: Value, output: Value) -> Record {
    let mut record = Record::new();
    for value in [metadata, input, output] {
        if let Value::Object(fields) = value {
            record.extend(fields);
        }
    }
    record
}

/// Serialize a snapshot as CSV: a leading `__example_index__` column, then
/// the union of record fields in sorted order.
pub fn write_snapshot_csv(examples: &[MaterializedExample]) -> Result<Vec<u8>> {
    let mut columns = std::collections::BTreeSet::new();
    for example in examples {
        columns.extend(example.record.keys().cloned());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec!["__example_index__".to_string()];
    header.extend(columns.iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| Error::InvalidState(format!("failed to serialize snapshot CSV: {e}")))?;

    for example in examples {
        let mut row = vec![example.example_index.to_string()];
        for column in &columns {
            row.push(match example.record.get(column) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
            });
        }
        writer
            .write_record(&row)
            .map_err(|e| Error::InvalidState(format!("failed to serialize snapshot CSV: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::InvalidState(format!("failed to serialize snapshot CSV: {e}")))
}
