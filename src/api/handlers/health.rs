use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub workspace: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let base = state.upload_service.workspace().base_dir();
    let workspace_status = match tokio::fs::metadata(base).await {
        Ok(meta) if meta.is_dir() => "available",
        // Created lazily by the first upload.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => "pending",
        _ => "unavailable",
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        workspace: workspace_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
