//! File handlers: upload, show, index and content download.

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use bytes::Bytes;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::{IntoParams, ToSchema};

use crate::errors::ApiError;
use crate::handlers::auth::{require_session, require_user, resolve_session};
use crate::metadata::store::{FileKind, FileRecord, NewFile, ParentRef};
use crate::metrics::FILES_CREATED_TOTAL;
use crate::AppState;

/// Records per page of `GET /files`.
pub const PAGE_SIZE: u32 = 20;

/// Standard alphabet, padding optional.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Body of `POST /files`.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub name: Option<String>,
    /// One of `folder`, `file`, `image`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// `0` (root) or a folder id.
    #[schema(value_type = Option<String>)]
    pub parent_id: Option<ParentRef>,
    pub is_public: Option<bool>,
    /// Base64 content; required unless `type` is `folder`.
    pub data: Option<String>,
}

/// Query string of `GET /files`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Parent folder id; `0` or absent for the root.
    pub parent_id: Option<String>,
    /// Zero-based page number.
    pub page: Option<String>,
}

/// Wire view of a file record.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub kind: FileKind,
    pub is_public: bool,
    #[schema(value_type = String)]
    pub parent_id: ParentRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

impl FileResponse {
    /// Build the wire view. The blob locator is only exposed on upload.
    pub fn from_record(record: FileRecord, include_local_path: bool) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            name: record.name,
            kind: record.kind,
            is_public: record.is_public,
            parent_id: record.parent_id,
            local_path: record.local_path.filter(|_| include_local_path),
        }
    }
}

/// Lenient page parsing: anything that is not a non-negative integer is 0.
fn parse_page(raw: Option<&str>) -> u64 {
    raw.and_then(|p| p.trim().parse::<u64>().ok()).unwrap_or(0)
}

/// `POST /files` -- create a folder or upload a file/image.
#[utoipa::path(
    post,
    path = "/files",
    tag = "Files",
    operation_id = "UploadFile",
    params(("X-Token" = String, Header, description = "Session token")),
    request_body = UploadRequest,
    responses(
        (status = 201, description = "Record created", body = FileResponse),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Missing or unknown token")
    )
)]
pub async fn post_upload(
    state: Arc<AppState>,
    token: Option<&str>,
    request: UploadRequest,
) -> Result<Response, ApiError> {
    let user_id = require_session(&state, token).await?;

    let Some(name) = request.name.filter(|n| !n.is_empty()) else {
        return Err(ApiError::bad_request("Missing name"));
    };
    let Some(kind) = request.kind.as_deref().and_then(FileKind::parse) else {
        return Err(ApiError::bad_request("Missing type"));
    };
    let parent_id = request.parent_id.unwrap_or_default();
    let is_public = request.is_public.unwrap_or(false);

    if let ParentRef::Folder(id) = &parent_id {
        match state.metadata.get_file(id).await? {
            None => return Err(ApiError::bad_request("Parent not found")),
            Some(parent) if parent.kind != FileKind::Folder => {
                return Err(ApiError::bad_request("Parent is not a folder"));
            }
            Some(_) => {}
        }
    }

    let mut new_file = NewFile {
        user_id,
        name,
        kind,
        is_public,
        parent_id,
        local_path: None,
    };

    if !kind.has_content() {
        let record = state.metadata.insert_file(new_file).await?;
        counter!(FILES_CREATED_TOTAL, "type" => kind.as_str()).increment(1);
        debug!("Created folder {}", record.id);
        return Ok((
            StatusCode::CREATED,
            Json(FileResponse::from_record(record, false)),
        )
            .into_response());
    }

    let Some(data) = request.data.filter(|d| !d.is_empty()) else {
        return Err(ApiError::bad_request("Missing data"));
    };
    let bytes = LENIENT_BASE64
        .decode(data.trim())
        .map_err(|_| ApiError::bad_request("Invalid data"))?;

    let blob_name = uuid::Uuid::new_v4().to_string();
    let locator = state.storage.put(&blob_name, Bytes::from(bytes)).await?;
    new_file.local_path = Some(locator.clone());

    let record = match state.metadata.insert_file(new_file).await {
        Ok(record) => record,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete(&locator).await {
                warn!("Failed to remove orphaned blob {}: {}", locator, cleanup);
            }
            return Err(e.into());
        }
    };

    counter!(FILES_CREATED_TOTAL, "type" => kind.as_str()).increment(1);
    debug!("Stored {} {} at {}", kind, record.id, locator);

    Ok((
        StatusCode::CREATED,
        Json(FileResponse::from_record(record, true)),
    )
        .into_response())
}

/// `GET /files/{id}` -- a single record's metadata.
#[utoipa::path(
    get,
    path = "/files/{id}",
    tag = "Files",
    operation_id = "GetFile",
    params(
        ("id" = String, Path, description = "File id"),
        ("X-Token" = String, Header, description = "Session token")
    ),
    responses(
        (status = 200, description = "File record", body = FileResponse),
        (status = 401, description = "Missing or unknown token"),
        (status = 404, description = "No such file")
    )
)]
pub async fn get_show(
    state: Arc<AppState>,
    token: Option<&str>,
    id: &str,
) -> Result<Response, ApiError> {
    require_user(&state, token).await?;
    let record = state
        .metadata
        .get_file(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((StatusCode::OK, Json(FileResponse::from_record(record, false))).into_response())
}

/// `GET /files` -- one page of the caller's records under a parent.
#[utoipa::path(
    get,
    path = "/files",
    tag = "Files",
    operation_id = "ListFiles",
    params(
        ListQuery,
        ("X-Token" = String, Header, description = "Session token")
    ),
    responses(
        (status = 200, description = "Page of records", body = [FileResponse]),
        (status = 401, description = "Missing or unknown token")
    )
)]
pub async fn get_index(
    state: Arc<AppState>,
    token: Option<&str>,
    query: ListQuery,
) -> Result<Response, ApiError> {
    let user = require_user(&state, token).await?;
    let parent = ParentRef::parse(query.parent_id.as_deref().unwrap_or("0"));
    let page = parse_page(query.page.as_deref());
    let skip = page.saturating_mul(u64::from(PAGE_SIZE));

    let records = state
        .metadata
        .list_files(&user.id, &parent, skip, PAGE_SIZE)
        .await?;
    let body: Vec<FileResponse> = records
        .into_iter()
        .map(|r| FileResponse::from_record(r, false))
        .collect();
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// `GET /files/{id}/data` -- raw content of a file or image.
#[utoipa::path(
    get,
    path = "/files/{id}/data",
    tag = "Files",
    operation_id = "GetFileData",
    params(
        ("id" = String, Path, description = "File id"),
        ("X-Token" = Option<String>, Header, description = "Session token, required for private files")
    ),
    responses(
        (status = 200, description = "File content", body = String, content_type = "application/octet-stream"),
        (status = 400, description = "Record is a folder"),
        (status = 404, description = "No such file, not visible to the caller, or content missing")
    )
)]
pub async fn get_file_data(
    state: Arc<AppState>,
    token: Option<&str>,
    id: &str,
) -> Result<Response, ApiError> {
    let record = state
        .metadata
        .get_file(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if !record.is_public {
        let caller = resolve_session(&state, token).await?;
        if caller.as_deref() != Some(record.user_id.as_str()) {
            return Err(ApiError::NotFound);
        }
    }

    if !record.kind.has_content() {
        return Err(ApiError::bad_request("A folder doesn't have content"));
    }

    let Some(locator) = record.local_path.as_deref() else {
        return Err(ApiError::NotFound);
    };
    let Some(object) = state.storage.get(locator).await? else {
        warn!("Blob missing for file {} at {}", record.id, locator);
        return Err(ApiError::NotFound);
    };

    let content_type = mime_guess::from_path(&record.name)
        .first_or_octet_stream()
        .to_string();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::ETAG, format!("\"{}\"", object.content_hash)),
        ],
        object.data,
    )
        .into_response())
}
