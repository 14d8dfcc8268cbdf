pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::completion::CompletionHandler;
use crate::services::file_store::FileRecordStore;
use crate::services::upload_service::UploadService;
use crate::services::workspace::TempWorkspace;
use axum::{
    Router,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_chunk,
        api::handlers::files::download_file,
        api::handlers::files::delete_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            services::file_store::FileRecord,
        )
    ),
    tags(
        (name = "upload", description = "Chunked upload endpoint"),
        (name = "files", description = "Stored file actions"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: UploadConfig,
    pub upload_service: Arc<UploadService>,
    pub store: Arc<dyn FileRecordStore>,
}

impl AppState {
    pub fn new(
        config: UploadConfig,
        store: Arc<dyn FileRecordStore>,
        completion: Arc<dyn CompletionHandler>,
    ) -> Self {
        let workspace = TempWorkspace::from_config(&config);
        Self {
            upload_service: Arc::new(UploadService::new(workspace, completion)),
            config,
            store,
        }
    }
}

fn cors_layer(config: &UploadConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/upload",
            post(api::handlers::upload::upload_chunk)
                .layer(axum::extract::DefaultBodyLimit::max(state.config.max_body_size))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::session::session_middleware,
                )),
        )
        .route(
            "/files/:id",
            get(api::handlers::files::download_file).delete(api::handlers::files::delete_file),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
