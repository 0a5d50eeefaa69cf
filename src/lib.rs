pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::IntakeConfig;
use crate::services::dispatcher::StorageDispatcher;
use crate::services::pipeline::UploadPipeline;
use crate::services::secret_store::SecretStore;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::upload::UploadResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "upload", description = "Gzip upload intake"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SecretStore>,
    pub dispatcher: Arc<dyn StorageDispatcher>,
    pub pipeline: Arc<UploadPipeline>,
    pub config: IntakeConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SecretStore>,
        dispatcher: Arc<dyn StorageDispatcher>,
        config: IntakeConfig,
    ) -> Self {
        let pipeline = Arc::new(UploadPipeline::new(store.clone(), &config));
        Self {
            store,
            dispatcher,
            pipeline,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/upload",
            post(api::handlers::upload::upload_file).layer(
                axum::extract::DefaultBodyLimit::max(
                    state.config.max_file_size + 10 * 1024 * 1024, // Add 10MB buffer for multipart overhead
                ),
            ),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
