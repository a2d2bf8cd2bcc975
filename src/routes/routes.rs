//! Routes of the upload signing API.
//!
//! - `POST /content/{content_type}/upload` -> presign an upload for a content type field
//! - `POST /setting/{setting_type}/upload` -> presign an upload for a setting type field
//! - `GET  /healthz`, `GET /readyz` -> probes
//!
//! Authorization is expected to happen in front of this router.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{sign_content_upload, sign_setting_upload},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/content/{content_type}/upload", post(sign_content_upload))
        .route("/setting/{setting_type}/upload", post(sign_setting_upload))
}
