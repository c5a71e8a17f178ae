pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::MediaConfig;
use crate::services::pipeline::{MediaPipeline, PipelineSettings};
use crate::services::probe::{MediaProber, ToolProber};
use crate::services::repository::MediaRepository;
use crate::services::resolver::{
    NoopIdentifier, SignatureIdentifier, SignatureService, TypeResolver,
};
use crate::services::storage::FileSystemRegistry;
use crate::services::store::SeaOrmStore;
use axum::{routing::get, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::media::serve_media,
        api::handlers::health::health_check,
    ),
    tags(
        (name = "media", description = "Derivative serving endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub repo: Arc<MediaRepository>,
    pub pipeline: Arc<MediaPipeline>,
    pub filesystems: Arc<FileSystemRegistry>,
    pub config: MediaConfig,
}

/// Production wiring: signature identifier and probe tools from the config.
pub fn build_state(
    db: DatabaseConnection,
    filesystems: Arc<FileSystemRegistry>,
    config: MediaConfig,
) -> AppState {
    let timeout = Duration::from_secs(config.tool_timeout_secs);
    let identifier: Box<dyn SignatureIdentifier> = match &config.signature_identifier_url {
        Some(url) => Box::new(SignatureService::new(url.clone(), timeout)),
        None => Box::new(NoopIdentifier),
    };
    let prober = Arc::new(ToolProber::new(
        config.identify_path.clone(),
        config.ffprobe_path.clone(),
        timeout,
    ));
    build_state_with(db, filesystems, config, identifier, prober)
}

/// Wiring with caller-supplied identification seams; tests stub these.
pub fn build_state_with(
    db: DatabaseConnection,
    filesystems: Arc<FileSystemRegistry>,
    config: MediaConfig,
    identifier: Box<dyn SignatureIdentifier>,
    prober: Arc<dyn MediaProber>,
) -> AppState {
    let store = Arc::new(SeaOrmStore::new(db.clone()));
    let repo = Arc::new(MediaRepository::new(store, filesystems.clone()));
    let pipeline = Arc::new(MediaPipeline::new(
        repo.clone(),
        filesystems.clone(),
        TypeResolver::new(identifier),
        prober,
        PipelineSettings {
            temp_dir: config.temp_dir.clone(),
            head_buffer_size: config.head_buffer_size,
            presign_expiry: Duration::from_secs(config.presign_expiry_secs),
        },
    ));

    AppState {
        db,
        repo,
        pipeline,
        filesystems,
        config,
    }
}

pub fn create_app(state: AppState) -> Router {
    let prefix = state.config.media_prefix.clone();

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            &format!("/{prefix}/:collection/:signature/:action"),
            get(api::handlers::media::serve_media),
        )
        .route(
            &format!("/{prefix}/:collection/:signature/:action/*paramstr"),
            get(api::handlers::media::serve_media_with_params),
        )
        .with_state(state)
}
