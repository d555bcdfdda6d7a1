use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::Response;

use batchconv::{optimize_batch, LegacyFormat};

use super::form::UploadForm;
use super::ARCHIVE_DOWNLOAD_NAME;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /optimize
///
/// Synchronous conversion to WebP or JPEG; the archive is the response.
pub async fn optimize(
    State(_state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = UploadForm::from_multipart(multipart).await?;
    let format = LegacyFormat::from_field(form.field("format"));
    let files = form.files;

    let archive = tokio::task::spawn_blocking(move || optimize_batch(&files, format))
        .await
        .map_err(|e| AppError::Internal(format!("Optimize task failed: {}", e)))??;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", ARCHIVE_DOWNLOAD_NAME),
        )
        .body(Body::from(archive))
        .map_err(|e| AppError::Internal(e.to_string()))
}
