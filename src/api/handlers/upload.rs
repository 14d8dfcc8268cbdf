use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::session::SessionKey;
use crate::api::response::no_cache_json;
use crate::services::chunk_writer::{BodySource, spool_to_scratch};
use crate::services::upload_service::UploadRequest;
use axum::{
    Extension,
    body::Body,
    extract::{FromRequest, Multipart, Request, State},
    http::{HeaderMap, header},
    response::Response,
};
use futures::TryStreamExt;
use http_body_util::{LengthLimitError, Limited};
use serde::Deserialize;
use std::path::Path;
use tokio_util::io::StreamReader;
use utoipa::IntoParams;

/// Chunking parameters. They may arrive in the query string or as multipart
/// text fields; multipart fields win.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadParams {
    /// Zero-based chunk index (default 0)
    pub chunk: Option<String>,
    /// Total number of chunks; 0 or 1 means a single-shot upload
    pub chunks: Option<String>,
    /// File name as chosen by the client
    pub name: Option<String>,
}

impl UploadParams {
    fn chunk_index(&self) -> u64 {
        parse_count(self.chunk.as_deref())
    }

    fn total_chunks(&self) -> u64 {
        parse_count(self.chunks.as_deref())
    }
}

fn parse_count(value: Option<&str>) -> u64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Content type of the request; bodies without one are treated as raw bytes.
fn request_content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string()
}

#[utoipa::path(
    post,
    path = "/upload",
    params(UploadParams),
    request_body(
        content = Vec<u8>,
        description = "Either a multipart form with a `file` part, or the raw chunk bytes",
        content_type = "application/octet-stream"
    ),
    responses(
        (status = 200, description = "Chunk accepted. The final chunk returns the completion result"),
        (status = 400, description = "Chunk index out of range or malformed multipart body"),
        (status = 500, description = "Temporary directory, stream or completion failure")
    ),
    tag = "upload"
)]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
    request: Request,
) -> Result<Response, AppError> {
    let budget = state.config.max_execution_time();
    match tokio::time::timeout(budget, handle_upload(&state, session, request)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(state.config.max_execution_secs)),
    }
}

async fn handle_upload(
    state: &AppState,
    session: SessionKey,
    request: Request,
) -> Result<Response, AppError> {
    let headers = request.headers();
    let content_type = request_content_type(headers);
    let content_disposition = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut params: UploadParams =
        serde_urlencoded::from_str(request.uri().query().unwrap_or_default()).unwrap_or_default();

    let body = if content_type.contains("multipart") {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        let dir = state
            .upload_service
            .workspace()
            .resolve_directory(session.0.as_deref())
            .await;
        let suffix = state.upload_service.workspace().tmp_suffix().to_string();
        read_multipart(&mut multipart, &dir, &suffix, &mut params).await?
    } else {
        // DefaultBodyLimit only guards extractors, so cap the raw stream here.
        let limited = Limited::new(request.into_body(), state.config.max_body_size);
        let stream = Body::new(limited)
            .into_data_stream()
            .map_err(std::io::Error::other);
        BodySource::raw(StreamReader::new(stream))
    };

    let upload = UploadRequest {
        chunk_index: params.chunk_index(),
        total_chunks: params.total_chunks(),
        raw_file_name: params.name.unwrap_or_default(),
        content_type,
        content_disposition,
        session_key: session.0,
        body,
    };

    let outcome = state
        .upload_service
        .receive(upload)
        .await
        .map_err(body_limit_to_payload_too_large)?;
    no_cache_json(&outcome.result)
}

/// A raw body cut off by `Limited` surfaces as an I/O error from the copy;
/// report it the same way as an oversized multipart body.
fn body_limit_to_payload_too_large(err: AppError) -> AppError {
    match err {
        AppError::Io(ref e) if exceeds_body_limit(e) => {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        }
        other => other,
    }
}

fn exceeds_body_limit(err: &std::io::Error) -> bool {
    let mut cause = err
        .get_ref()
        .map(|inner| inner as &(dyn std::error::Error + 'static));
    while let Some(e) = cause {
        if e.is::<LengthLimitError>() {
            return true;
        }
        cause = e.source();
    }
    false
}

/// Walks the multipart fields, picking up chunking parameters and spooling the
/// `file` part to a scratch file next to the upload.
async fn read_multipart(
    multipart: &mut Multipart,
    dir: &Path,
    suffix: &str,
    params: &mut UploadParams,
) -> Result<BodySource, AppError> {
    let mut scratch = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        let err_msg = e.to_string();
        if err_msg.contains("length limit exceeded") {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        } else {
            AppError::BadRequest(err_msg)
        }
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if params.name.is_none() {
                    params.name = field.file_name().map(str::to_string);
                }
                let reader = StreamReader::new(field.map_err(std::io::Error::other));
                scratch = Some(spool_to_scratch(dir, suffix, reader).await?);
            }
            "chunk" => params.chunk = Some(field_text(field).await?),
            "chunks" => params.chunks = Some(field_text(field).await?),
            "name" => params.name = Some(field_text(field).await?),
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    scratch
        .map(BodySource::Multipart)
        .ok_or_else(|| AppError::input_stream("multipart body has no `file` part"))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))
}
