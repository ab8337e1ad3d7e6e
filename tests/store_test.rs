//! Revision log, snapshot reconstruction, and upsert semantics.

use anyhow::Result;
use chrono::Utc;
use datashed::database::entities::*;
use datashed::database::setup_database;
use datashed::store::revision_log::{
    append_revision, append_revisions, create_example, create_version, NewRevision,
    RevisionPayload,
};
use datashed::store::snapshot::{example_count, get_snapshot};
use datashed::store::upsert::{upsert_experiment_evaluation, EvaluationUpsert};
use datashed::Error;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde_json::json;
use tempfile::NamedTempFile;

async fn setup_test_db() -> Result<(DatabaseConnection, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let db_url = format!("sqlite://{}?mode=rwc", temp_file.path().display());

    let db = Database::connect(&db_url).await?;
    setup_database(&db).await?;

    Ok((db, temp_file))
}

async fn create_dataset(db: &DatabaseConnection, name: &str) -> Result<datasets::Model> {
    let now = Utc::now();
    let dataset = datasets::ActiveModel {
        name: Set(name.to_string()),
        description: Set(None),
        metadata: Set(json!({})),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(dataset.insert(db).await?)
}

fn qa_payload(q: &str, a: &str) -> RevisionPayload {
    RevisionPayload {
        input: json!({ "q": q }),
        output: json!({ "a": a }),
        metadata: json!({}),
    }
}

#[tokio::test]
async fn test_version_ids_are_monotonic_per_dataset() -> Result<()> {
    let (db, _temp_file) = setup_test_db().await?;
    let left = create_dataset(&db, "left").await?;
    let right = create_dataset(&db, "right").await?;

    let l1 = create_version(&db, left.id, None).await?;
    let r1 = create_version(&db, right.id, None).await?;
    let l2 = create_version(&db, left.id, None).await?;

    assert!(l2.id > l1.id);
    assert!(r1.id > l1.id);
    assert_eq!(l1.dataset_id, left.id);
    assert_eq!(r1.dataset_id, right.id);
    Ok(())
}

#[tokio::test]
async fn test_create_version_for_unknown_dataset_is_not_found() -> Result<()> {
    let (db, _temp_file) = setup_test_db().await?;
    let err = create_version(&db, 999, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_snapshot_reflects_patches_and_tombstones() -> Result<()> {
    let (db, _temp_file) = setup_test_db().await?;
    let dataset = create_dataset(&db, "qa").await?;

    // v1: three examples
    let v1 = create_version(&db, dataset.id, None).await?;
    let mut example_ids = Vec::new();
    let txn = db.begin().await?;
    for (q, a) in [("q1", "a1"), ("q2", "a2"), ("q3", "a3")] {
        let example = create_example(&txn, dataset.id).await?;
        append_revision(
            &txn,
            dataset.id,
            v1.id,
            example.id,
            RevisionKind::Create,
            qa_payload(q, a),
        )
        .await?;
        example_ids.push(example.id);
    }
    txn.commit().await?;

    // v2: patch the second example
    let v2 = create_version(&db, dataset.id, None).await?;
    append_revision(
        &db,
        dataset.id,
        v2.id,
        example_ids[1],
        RevisionKind::Patch,
        qa_payload("q2", "a2-fixed"),
    )
    .await?;

    // v3: delete the first example
    let v3 = create_version(&db, dataset.id, None).await?;
    append_revision(
        &db,
        dataset.id,
        v3.id,
        example_ids[0],
        RevisionKind::Delete,
        RevisionPayload::empty(),
    )
    .await?;

    let at_v1 = get_snapshot(&db, dataset.id, Some(v1.id)).await?;
    assert_eq!(at_v1.len(), 3);
    assert_eq!(at_v1[1].record["a"], "a2");

    let at_v2 = get_snapshot(&db, dataset.id, Some(v2.id)).await?;
    assert_eq!(at_v2.len(), 3);
    assert_eq!(at_v2[1].record["a"], "a2-fixed");

    // Deleted at v3: absent from v3 onward, still present before.
    let at_v3 = get_snapshot(&db, dataset.id, Some(v3.id)).await?;
    assert_eq!(at_v3.len(), 2);
    assert!(at_v3.iter().all(|e| e.example_id != example_ids[0]));

    let latest = get_snapshot(&db, dataset.id, None).await?;
    assert_eq!(latest, at_v3);

    // example_index stays dense and zero-based after the delete.
    let indexes: Vec<_> = at_v3.iter().map(|e| e.example_index).collect();
    assert_eq!(indexes, vec![0, 1]);

    assert_eq!(example_count(&db, dataset.id).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_snapshot_is_idempotent() -> Result<()> {
    let (db, _temp_file) = setup_test_db().await?;
    let dataset = create_dataset(&db, "stable").await?;
    let v1 = create_version(&db, dataset.id, None).await?;
    let txn = db.begin().await?;
    for (q, a) in [("x", "1"), ("y", "2")] {
        let example = create_example(&txn, dataset.id).await?;
        append_revision(
            &txn,
            dataset.id,
            v1.id,
            example.id,
            RevisionKind::Create,
            qa_payload(q, a),
        )
        .await?;
    }
    txn.commit().await?;

    let first = get_snapshot(&db, dataset.id, Some(v1.id)).await?;
    let second = get_snapshot(&db, dataset.id, Some(v1.id)).await?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_snapshot_rejects_unknown_or_foreign_version() -> Result<()> {
    let (db, _temp_file) = setup_test_db().await?;
    let mine = create_dataset(&db, "mine").await?;
    let other = create_dataset(&db, "other").await?;
    create_version(&db, mine.id, None).await?;
    let other_version = create_version(&db, other.id, None).await?;

    let err = get_snapshot(&db, mine.id, Some(9999)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // A version of another dataset never falls back to latest.
    let err = get_snapshot(&db, mine.id, Some(other_version.id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = get_snapshot(&db, 424242, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_append_against_stale_version_is_invalid_state() -> Result<()> {
    let (db, _temp_file) = setup_test_db().await?;
    let dataset = create_dataset(&db, "stale").await?;

    let v1 = create_version(&db, dataset.id, None).await?;
    let example = create_example(&db, dataset.id).await?;
    append_revision(
        &db,
        dataset.id,
        v1.id,
        example.id,
        RevisionKind::Create,
        qa_payload("q", "a"),
    )
    .await?;

    // v2 supersedes v1; a writer still holding v1 must be rejected.
    create_version(&db, dataset.id, None).await?;
    let err = append_revision(
        &db,
        dataset.id,
        v1.id,
        example.id,
        RevisionKind::Patch,
        qa_payload("q", "a2"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    Ok(())
}

#[tokio::test]
async fn test_patch_without_prior_revision_is_invalid_state() -> Result<()> {
    let (db, _temp_file) = setup_test_db().await?;
    let dataset = create_dataset(&db, "orphan").await?;
    let v1 = create_version(&db, dataset.id, None).await?;
    let example = create_example(&db, dataset.id).await?;

    let err = append_revision(
        &db,
        dataset.id,
        v1.id,
        example.id,
        RevisionKind::Patch,
        qa_payload("q", "a"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    Ok(())
}

#[tokio::test]
async fn test_batched_append_is_all_or_nothing() -> Result<()> {
    let (db, _temp_file) = setup_test_db().await?;
    let dataset = create_dataset(&db, "atomic").await?;
    let v1 = create_version(&db, dataset.id, None).await?;
    let good = create_example(&db, dataset.id).await?;

    // Second revision references an example that never existed, so the
    // whole batch must roll back.
    let err = append_revisions(
        &db,
        dataset.id,
        v1.id,
        vec![
            NewRevision {
                example_id: good.id,
                kind: RevisionKind::Create,
                payload: qa_payload("q", "a"),
            },
            NewRevision {
                example_id: 987654,
                kind: RevisionKind::Create,
                payload: qa_payload("q2", "a2"),
            },
        ],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    let snapshot = get_snapshot(&db, dataset.id, None).await?;
    assert!(snapshot.is_empty());

    let revisions = dataset_example_revisions::Entity::find().all(&db).await?;
    assert!(revisions.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_delete_revision_stores_no_payload() -> Result<()> {
    let (db, _temp_file) = setup_test_db().await?;
    let dataset = create_dataset(&db, "tombstone").await?;
    let v1 = create_version(&db, dataset.id, None).await?;
    let example = create_example(&db, dataset.id).await?;
    append_revision(
        &db,
        dataset.id,
        v1.id,
        example.id,
        RevisionKind::Create,
        qa_payload("q", "a"),
    )
    .await?;

    let v2 = create_version(&db, dataset.id, None).await?;
    let tombstone = append_revision(
        &db,
        dataset.id,
        v2.id,
        example.id,
        RevisionKind::Delete,
        // Payload on a DELETE is discarded.
        qa_payload("ignored", "ignored"),
    )
    .await?;

    assert_eq!(tombstone.input, json!({}));
    assert_eq!(tombstone.output, json!({}));
    assert_eq!(tombstone.get_revision_kind(), RevisionKind::Delete);
    Ok(())
}

#[tokio::test]
async fn test_upsert_keeps_one_row_with_last_value() -> Result<()> {
    let (db, _temp_file) = setup_test_db().await?;

    let base = EvaluationUpsert {
        experiment_run_id: 7,
        name: "accuracy".to_string(),
        annotator_kind: "LLM".to_string(),
        label: Some("good".to_string()),
        score: Some(0.4),
        explanation: None,
        error: None,
        metadata: json!({}),
        trace_id: None,
        start_time: Utc::now(),
        end_time: Utc::now(),
    };
    let first = upsert_experiment_evaluation(&db, base.clone()).await?;
    assert_eq!(first.score, Some(0.4));

    let second = upsert_experiment_evaluation(
        &db,
        EvaluationUpsert {
            score: Some(0.9),
            label: Some("great".to_string()),
            ..base.clone()
        },
    )
    .await?;
    assert_eq!(second.score, Some(0.9));
    assert_eq!(second.id, first.id);

    let rows = experiment_run_annotations::Entity::find().all(&db).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].score, Some(0.9));
    assert_eq!(rows[0].label, Some("great".to_string()));

    // A different evaluation name on the same run is a separate row.
    upsert_experiment_evaluation(
        &db,
        EvaluationUpsert {
            name: "latency".to_string(),
            ..base
        },
    )
    .await?;
    let rows = experiment_run_annotations::Entity::find().all(&db).await?;
    assert_eq!(rows.len(), 2);
    Ok(())
}
