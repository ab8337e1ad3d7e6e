use std::collections::BTreeSet;
use std::io::Write;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use flate2::write::GzEncoder;
use flate2::Compression;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::entities::datasets;
use crate::decode::{ContentEncoding, ContentType};
use crate::error::Error;
use crate::server::app::AppState;
use crate::store::ingest::{validate_upload, DatasetAction, UploadRequest};
use crate::store::snapshot::{example_count, get_snapshot, write_snapshot_csv};

#[derive(Debug, Deserialize)]
pub struct ListDatasetsQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct DatasetResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub metadata: Value,
    pub created_at: String,
    pub updated_at: String,
}

impl From<datasets::Model> for DatasetResponse {
    fn from(dataset: datasets::Model) -> Self {
        Self {
            id: dataset.id,
            name: dataset.name,
            description: dataset.description,
            metadata: dataset.metadata,
            created_at: dataset.created_at.to_rfc3339(),
            updated_at: dataset.updated_at.to_rfc3339(),
        }
    }
}

pub async fn list_datasets(
    State(state): State<AppState>,
    Query(query): Query<ListDatasetsQuery>,
) -> Result<Json<Vec<DatasetResponse>>, Error> {
    let rows = datasets::Entity::find()
        .order_by_desc(datasets::Column::Id)
        .limit(query.limit.unwrap_or(10))
        .all(&state.db)
        .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Serialize)]
pub struct DatasetDetailResponse {
    #[serde(flatten)]
    pub dataset: DatasetResponse,
    pub example_count: u64,
}

/// Point read: dataset metadata plus the number of currently-visible
/// examples at the latest version.
pub async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<DatasetDetailResponse>, Error> {
    let dataset = datasets::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("dataset {id} does not exist")))?;
    let example_count = example_count(&state.db, dataset.id).await?;
    Ok(Json(DatasetDetailResponse {
        dataset: dataset.into(),
        example_count,
    }))
}

/// Upload intake: multipart form with `name`, optional `description` and
/// `action`, repeated `input_keys[]` / `output_keys[]` / `metadata_keys[]`
/// fields, and a `file` part whose own content type and content-encoding
/// declare the format. A 200 means the job was admitted to the queue, not
/// that it has been durably applied.
pub async fn upload_dataset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<StatusCode, Error> {
    let mut name = None;
    let mut description = None;
    let mut action = None;
    let mut input_keys = BTreeSet::new();
    let mut output_keys = BTreeSet::new();
    let mut metadata_keys = BTreeSet::new();
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Malformed(format!("malformed multipart form: {e}")))?
    {
        let read_text = |e: axum::extract::multipart::MultipartError| {
            Error::Malformed(format!("malformed multipart form: {e}"))
        };
        match field.name().unwrap_or_default() {
            "name" => name = Some(field.text().await.map_err(read_text)?),
            "description" => description = Some(field.text().await.map_err(read_text)?),
            "action" => action = Some(field.text().await.map_err(read_text)?),
            "input_keys[]" => {
                input_keys.insert(field.text().await.map_err(read_text)?);
            }
            "output_keys[]" => {
                output_keys.insert(field.text().await.map_err(read_text)?);
            }
            "metadata_keys[]" => {
                metadata_keys.insert(field.text().await.map_err(read_text)?);
            }
            "file" => {
                let content_type = field.content_type().map(str::to_string);
                let content_encoding = field
                    .headers()
                    .get(header::CONTENT_ENCODING)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(read_text)?.to_vec();
                file = Some(UploadedFile {
                    content_type,
                    content_encoding,
                    file_name,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let name = name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Malformed("dataset name must not be empty".to_string()))?;
    let file = file.ok_or_else(|| Error::Malformed("missing file in form data".to_string()))?;
    let content_type = ContentType::parse(
        file.content_type
            .as_deref()
            .ok_or_else(|| Error::Malformed("missing file content type".to_string()))?,
    )?;
    let content_encoding = ContentEncoding::parse(file.content_encoding.as_deref())?;

    let request = UploadRequest {
        action: DatasetAction::parse(action.as_deref())?,
        name,
        description: description.or(file.file_name),
        input_keys,
        output_keys,
        metadata_keys,
        content_type,
        content_encoding,
        bytes: file.bytes,
    };
    let job = validate_upload(&state.db, request).await?;
    state.ingest.submit(job)?;
    Ok(StatusCode::OK)
}

struct UploadedFile {
    content_type: Option<String>,
    content_encoding: Option<String>,
    file_name: Option<String>,
    bytes: Vec<u8>,
}

/// Export the latest snapshot as a gzip CSV attachment.
pub async fn download_dataset_csv(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, Error> {
    download_csv(&state.db, id, None).await
}

/// Export a point-in-time snapshot as a gzip CSV attachment.
pub async fn download_dataset_csv_at_version(
    State(state): State<AppState>,
    Path((id, version_id)): Path<(i32, i32)>,
) -> Result<Response, Error> {
    download_csv(&state.db, id, Some(version_id)).await
}

async fn download_csv(
    db: &DatabaseConnection,
    dataset_id: i32,
    as_of_version: Option<i32>,
) -> Result<Response, Error> {
    let dataset = datasets::Entity::find()
        .filter(datasets::Column::Id.eq(dataset_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("dataset {dataset_id} does not exist")))?;

    let examples = get_snapshot(db, dataset_id, as_of_version).await?;
    if examples.is_empty() {
        return Err(Error::NotFound(format!(
            "dataset has no examples: name={}",
            dataset.name
        )));
    }

    let body = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, Error> {
        let csv = write_snapshot_csv(&examples)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&csv)
            .map_err(|e| Error::InvalidState(format!("failed to compress snapshot CSV: {e}")))?;
        encoder
            .finish()
            .map_err(|e| Error::InvalidState(format!("failed to compress snapshot CSV: {e}")))
    })
    .await
    .map_err(|e| Error::InvalidState(format!("export task failed: {e}")))??;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_ENCODING, "gzip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.csv\"", dataset.name),
            ),
        ],
        body,
    )
        .into_response())
}
