//! Asynchronous job endpoints: start, poll, download.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use futures::StreamExt;
use tokio_util::io::ReaderStream;

use batchconv::{JobSnapshot, StartedJob};

use super::form::UploadForm;
use super::ARCHIVE_DOWNLOAD_NAME;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /start
///
/// Registers a job for the uploaded files and returns its id immediately.
pub async fn start_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<StartedJob>> {
    let form = UploadForm::from_multipart(multipart).await?;
    let options = form.job_options();

    let started = state.coordinator.start_job(form.files, options)?;
    tracing::info!(job_id = %started.job_id, total = started.total, "Job started");

    Ok(Json(started))
}

/// GET /status/{job_id}
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<JobSnapshot>> {
    Ok(Json(state.coordinator.status(&job_id)?))
}

/// GET /download/{job_id}
///
/// Streams the finished archive once. The job is removed when claimed and
/// the archive file is deleted as soon as the body is finished or dropped.
pub async fn download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let claim = state.coordinator.claim_result(&job_id)?;

    let file = tokio::fs::File::open(claim.path())
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open archive: {}", e)))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to stat archive: {}", e)))?
        .len();

    // the claim rides along with the stream and releases the file on drop
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _held = &claim;
        chunk
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, length.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", ARCHIVE_DOWNLOAD_NAME),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(e.to_string()))
}
