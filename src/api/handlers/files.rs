use crate::AppState;
use crate::api::error::AppError;
use crate::services::file_store::FileRecord;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::io::ReaderStream;

async fn load_record(state: &AppState, id: &str) -> Result<FileRecord, AppError> {
    state
        .store
        .find(id)
        .await?
        .ok_or_else(|| AppError::InvalidFileReference(id.to_string()))
}

/// `attachment` disposition with a plain ASCII fallback plus the RFC 5987
/// encoded original name.
fn attachment_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file"
    } else {
        &ascii_filename
    };
    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}

#[utoipa::path(
    get,
    path = "/files/{id}",
    params(
        ("id" = String, Path, description = "File record ID")
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let record = load_record(&state, &id).await?;
    let file = state.store.open_content(&record).await?;

    tracing::info!("📎 Download of record {} ({})", record.id, record.name);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref())
        .header(header::CONTENT_LENGTH, record.size)
        .header(header::CONTENT_DISPOSITION, attachment_disposition(&record.name))
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {}", e)))
}

#[utoipa::path(
    delete,
    path = "/files/{id}",
    params(
        ("id" = String, Path, description = "File record ID")
    ),
    responses(
        (status = 204, description = "File deleted"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete(&id).await? {
        return Err(AppError::InvalidFileReference(id));
    }
    tracing::info!("🗑️ Deleted record {}", id);
    Ok(StatusCode::NO_CONTENT)
}
