//! Media API endpoints.
//!
//! - POST /api/media/upload - Upload one file (multipart field `file`, 5 MiB max)
//! - GET /api/media/get - List every media record
//! - POST /api/media/reconcile - Retry blob deletion for the caller's `pending_delete` records

use crate::AppState;
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use chirp_core::ids::MediaId;
use chirp_core::model::MediaRecord;
use chirp_projections::ReconcileReport;
use chirp_web::{AppError, AuthenticatedUser, WebResult};
use serde::Serialize;
use tracing::info;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Name of the multipart field carrying the file.
pub const FILE_FIELD: &str = "file";

/// Response after an upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Always `true`
    pub success: bool,
    /// New record id, to reference from a post
    pub media_id: MediaId,
    /// Public URL of the blob
    pub url: String,
    /// Human-readable outcome
    pub message: &'static str,
}

/// Media listing.
#[derive(Debug, Serialize)]
pub struct MediaListResponse {
    /// Every record, newest first
    pub results: Vec<MediaRecord>,
}

struct UploadedFile {
    name: String,
    content_type: String,
    bytes: Vec<u8>,
}

async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, AppError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::validation(FILE_FIELD, "File exceeds the 5 MiB limit")
        } else {
            AppError::validation(FILE_FIELD, e.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(invalid)?;
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::validation(FILE_FIELD, "File exceeds the 5 MiB limit"));
        }
        return Ok(UploadedFile {
            name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(AppError::validation(FILE_FIELD, "No file found!"))
}

/// Store an uploaded file and record it as owned by the caller.
pub async fn upload_media(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    multipart: Multipart,
) -> WebResult<(StatusCode, Json<UploadResponse>)> {
    let file = read_file_field(multipart).await?;
    let size = file.bytes.len();
    let stored = state
        .blobs
        .upload(&file.name, &file.content_type, file.bytes)
        .await?;

    let record = MediaRecord {
        id: MediaId::new(),
        blob_id: stored.blob_id,
        original_name: file.name,
        mime_type: file.content_type,
        url: stored.url,
        owner: user_id,
        created_at: state.clock.now(),
        pending_delete: false,
    };
    if let Err(e) = state.media.insert(&record).await {
        if let Err(cleanup) = state.blobs.delete(&record.blob_id).await {
            tracing::warn!(blob_id = %record.blob_id, error = %cleanup, "Orphaned blob after failed insert");
        }
        return Err(e.into());
    }

    metrics::counter!("media.uploaded").increment(1);
    info!(media_id = %record.id, %user_id, size, mime_type = %record.mime_type, "Media uploaded");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            media_id: record.id,
            url: record.url,
            message: "Media upload is successful!",
        }),
    ))
}

/// List every media record.
pub async fn list_media(
    State(state): State<AppState>,
    AuthenticatedUser(_): AuthenticatedUser,
) -> WebResult<Json<MediaListResponse>> {
    Ok(Json(MediaListResponse {
        results: state.media.list().await?,
    }))
}

/// Retry blob deletion for the caller's records left `pending_delete`.
pub async fn reconcile_media(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> WebResult<Json<ReconcileReport>> {
    let report = state.projection.reconcile_pending(user_id).await?;
    info!(
        %user_id,
        examined = report.examined,
        removed = report.removed,
        still_pending = report.still_pending,
        "Reconciliation requested"
    );
    Ok(Json(report))
}
