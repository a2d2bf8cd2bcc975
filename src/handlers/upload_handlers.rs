//! Upload signing endpoints.
//!
//! The client posts the slash-delimited path of the file field it is about to
//! fill and the filename it wants to upload; it receives a presigned PUT URL
//! plus the `{id, name, checksum}` it must store as the field value.

use crate::{
    errors::{AppError, StorageError},
    models::{fieldable::FieldableKind, upload::PreSignedUpload},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Field path, e.g. `gallery/photo`.
    pub field: String,
    pub filename: String,
}

/// `POST /content/{content_type}/upload`
pub async fn sign_content_upload(
    State(state): State<AppState>,
    Path(content_type): Path<String>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<PreSignedUpload>, AppError> {
    sign_upload(&state, FieldableKind::ContentType, &content_type, request).await
}

/// `POST /setting/{setting_type}/upload`
pub async fn sign_setting_upload(
    State(state): State<AppState>,
    Path(setting_type): Path<String>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<PreSignedUpload>, AppError> {
    sign_upload(&state, FieldableKind::SettingType, &setting_type, request).await
}

async fn sign_upload(
    state: &AppState,
    kind: FieldableKind,
    identifier: &str,
    request: UploadRequest,
) -> Result<Json<PreSignedUpload>, AppError> {
    if request.field.trim().is_empty() || request.filename.trim().is_empty() {
        return Err(AppError::bad_request("field and filename are required"));
    }

    let fieldable = state
        .repo
        .find_fieldable(kind, identifier)
        .await?
        .ok_or_else(|| StorageError::SchemaNotFound {
            kind: kind.as_str().replace('_', " "),
            identifier: identifier.to_string(),
        })?;

    debug!(schema = %identifier, field = %request.field, "upload sign request");

    let upload = state
        .signer
        .sign_for_field_path(&request.filename, &fieldable, &request.field)
        .await?;

    Ok(Json(upload))
}
