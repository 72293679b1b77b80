pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod probe;
pub mod services;
pub mod utils;

use crate::config::GatewayConfig;
use crate::services::cleanup::{CleanupPolicy, CleanupScheduler};
use crate::services::conversion::ConversionService;
use crate::services::converter::DocumentConverter;
use crate::services::temp_store::TempFileStore;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::health::service_info,
        api::handlers::convert::convert_pdf,
        api::handlers::cleanup::manual_cleanup,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::health::ServiceInfo,
            api::handlers::cleanup::CleanupResponse,
            models::ConvertResponse,
            models::ConversionMetadata,
            models::ConvertForm,
        )
    ),
    tags(
        (name = "convert", description = "PDF to Markdown conversion"),
        (name = "system", description = "Health and maintenance endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub store: Arc<TempFileStore>,
    pub conversion: Arc<ConversionService>,
    pub cleanup: Arc<CleanupScheduler>,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        store: Arc<TempFileStore>,
        converter: Arc<dyn DocumentConverter>,
    ) -> Self {
        let conversion = Arc::new(ConversionService::new(
            store.clone(),
            converter,
            config.torch_device.clone(),
        ));
        let cleanup = Arc::new(CleanupScheduler::new(store.clone(), CleanupPolicy::default()));

        Self {
            config,
            store,
            conversion,
            cleanup,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::health::service_info))
        .route("/health", get(api::handlers::health::health_check))
        .route("/convert", post(api::handlers::convert::convert_pdf))
        .route("/cleanup", get(api::handlers::cleanup::manual_cleanup))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_file_size + MULTIPART_OVERHEAD,
        ))
        .with_state(state)
}
