use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use image::{DynamicImage, Rgba, RgbaImage};
use rust_media_backend::config::MediaConfig;
use rust_media_backend::entities::prelude::*;
use rust_media_backend::infrastructure::database::run_migrations;
use rust_media_backend::services::error::MediaError;
use rust_media_backend::services::probe::{MediaProber, ProbeResult};
use rust_media_backend::services::resolver::NoopIdentifier;
use rust_media_backend::services::storage::{FileSystemRegistry, LocalFileSystem};
use rust_media_backend::services::store::{NewCollection, NewMaster, NewStorage};
use rust_media_backend::utils::hash::sha256_hex;
use rust_media_backend::{build_state_with, create_app, AppState};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, EntityTrait};
use serde_json::Value;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

async fn setup_test_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1);
    let db = Database::connect(opt).await.unwrap();
    run_migrations(&db).await.unwrap();
    db
}

/// Prober that reads dimensions with the image crate instead of spawning
/// external tools; counts invocations so tests can assert cache behavior.
struct InlineProber {
    calls: AtomicUsize,
}

impl InlineProber {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MediaProber for InlineProber {
    async fn image_metadata(&self, location: &str) -> Result<ProbeResult, MediaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = tokio::fs::read(location).await?;
        let img = image::load_from_memory(&bytes)
            .map_err(|e| MediaError::Identification(e.to_string()))?;
        Ok(ProbeResult {
            width: img.width() as i64,
            height: img.height() as i64,
            duration: 0,
            mimetype: None,
            raw: serde_json::json!({"tool": "inline"}),
        })
    }

    async fn video_metadata(&self, _location: &str) -> Result<ProbeResult, MediaError> {
        Err(MediaError::Identification("no video prober in tests".into()))
    }
}

struct TestEnv {
    state: AppState,
    prober: Arc<InlineProber>,
    source: Vec<u8>,
    _workdir: TempDir,
}

fn source_png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([10, 120, 240, 255]),
    ));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// One estate/storage/collection plus a master pointing at a PNG dropped
/// into the local backend's `incoming` bucket.
async fn setup_env() -> TestEnv {
    let workdir = TempDir::new().unwrap();
    let db = setup_test_db().await;

    let mut registry = FileSystemRegistry::new();
    registry.register(Arc::new(LocalFileSystem::new("media", workdir.path())));
    let filesystems = Arc::new(registry);

    let prober = InlineProber::new();
    let state = build_state_with(
        db,
        filesystems,
        MediaConfig::development(workdir.path()),
        Box::new(NoopIdentifier),
        prober.clone(),
    );

    let estate = state.repo.create_estate("test", None).await.unwrap();
    let storage = state
        .repo
        .create_storage(NewStorage {
            name: "main".into(),
            filebase: "local://media/store".into(),
            data_dir: "data".into(),
            video_dir: "video".into(),
            submaster_dir: "submaster".into(),
            temp_dir: "temp".into(),
        })
        .await
        .unwrap();
    let collection = state
        .repo
        .create_collection(NewCollection {
            name: "web".into(),
            estate_id: estate.id,
            storage_id: storage.id,
            signature_prefix: None,
            description: None,
            external_group: None,
        })
        .await
        .unwrap();

    let source = source_png(200, 50);
    let incoming = workdir.path().join("incoming");
    tokio::fs::create_dir_all(&incoming).await.unwrap();
    tokio::fs::write(incoming.join("img-0001.png"), &source)
        .await
        .unwrap();

    state
        .repo
        .create_master(NewMaster {
            collection_id: collection.id,
            signature: "img-0001".into(),
            urn: "local://media/incoming/img-0001.png".into(),
            parent_id: None,
        })
        .await
        .unwrap();

    TestEnv {
        state,
        prober,
        source,
        _workdir: workdir,
    }
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec(), content_type)
}

#[tokio::test]
async fn test_master_ingest_and_cache_hit() {
    let env = setup_env().await;
    let app = create_app(env.state.clone());

    // First access ingests the master and serves the canonical copy.
    let (status, body, content_type) = get(&app, "/media/web/img-0001/master").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
    assert_eq!(body, env.source);

    let master = Masters::find().one(&env.state.db).await.unwrap().unwrap();
    assert_eq!(master.status, "identified");
    assert_eq!(master.sha256, sha256_hex(&env.source));
    assert_eq!(master.mimetype.as_deref(), Some("image/png"));
    assert_eq!(master.media_type.as_deref(), Some("image"));

    let caches = Caches::find().all(&env.state.db).await.unwrap();
    assert_eq!(caches.len(), 1);
    assert_eq!(caches[0].action, "master");
    assert_eq!(caches[0].filesize, env.source.len() as i64);
    assert_eq!(caches[0].width, Some(200));
    assert_eq!(caches[0].height, Some(50));

    // Second identical request is a cache hit: identical bytes, no second
    // identification run.
    assert_eq!(env.prober.calls.load(Ordering::SeqCst), 1);
    let (status, body, _) = get(&app, "/media/web/img-0001/master").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, env.source);
    assert_eq!(env.prober.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resize_generates_and_persists_derivative() {
    let env = setup_env().await;
    let app = create_app(env.state.clone());

    let (status, body, content_type) =
        get(&app, "/media/web/img-0001/resize/size40x20/formatwebp/stretch").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/webp"));

    let img = image::load_from_memory(&body).unwrap();
    assert_eq!((img.width(), img.height()), (40, 20));

    let caches = Caches::find().all(&env.state.db).await.unwrap();
    assert_eq!(caches.len(), 2); // master + derivative
    let derived = caches.iter().find(|c| c.action == "resize").unwrap();
    assert_eq!(derived.params, "format+webp/resizetype+stretch/size+40x20");
    assert_eq!(derived.mimetype, "image/webp");
    assert_eq!((derived.width, derived.height), (Some(40), Some(20)));

    // Parameter order must not matter: same canonical key, same row count.
    let (status, body2, _) =
        get(&app, "/media/web/img-0001/resize/stretch/formatwebp/size40x20").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body2, body);
    assert_eq!(Caches::find().all(&env.state.db).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_keep_resize_fits_box() {
    let env = setup_env().await;
    let app = create_app(env.state.clone());

    // source 200x50, box 100x100 -> 100x25
    let (status, body, _) = get(&app, "/media/web/img-0001/resize/size100x100/keep").await;
    assert_eq!(status, StatusCode::OK);
    let img = image::load_from_memory(&body).unwrap();
    assert_eq!((img.width(), img.height()), (100, 25));
}

#[tokio::test]
async fn test_unknown_collection_is_not_found() {
    let env = setup_env().await;
    let app = create_app(env.state.clone());

    let (status, body, content_type) = get(&app, "/media/nowhere/img-0001/master").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    // No Accept header: the error body is HTML.
    assert!(content_type.unwrap().starts_with("text/html"));
    assert!(String::from_utf8_lossy(&body).contains("404"));

    // No partial writes happened.
    assert_eq!(Caches::find().all(&env.state.db).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_error_body_can_be_json() {
    let env = setup_env().await;
    let app = create_app(env.state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/media/nowhere/img-0001/master")
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("404"));
}

#[tokio::test]
async fn test_unknown_action_is_bad_request() {
    let env = setup_env().await;
    let app = create_app(env.state.clone());

    let (status, _, _) = get(&app, "/media/web/img-0001/explode").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_target_format_is_bad_request() {
    let env = setup_env().await;
    let app = create_app(env.state.clone());

    let (status, _, _) = get(&app, "/media/web/img-0001/resize/size10x10/formatbmp").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reingestion_keeps_content_hash() {
    let env = setup_env().await;
    let app = create_app(env.state.clone());

    let (status, _, _) = get(&app, "/media/web/img-0001/master").await;
    assert_eq!(status, StatusCode::OK);
    let first = Masters::find().one(&env.state.db).await.unwrap().unwrap();
    assert!(!first.sha256.is_empty());

    // Drop the canonical cache row so the next request has to re-ingest,
    // and swap the source bytes underneath.
    Caches::delete_many().exec(&env.state.db).await.unwrap();
    tokio::fs::write(
        env._workdir.path().join("incoming/img-0001.png"),
        source_png(30, 30),
    )
    .await
    .unwrap();

    // Fresh state: the in-memory repository caches must not mask the miss.
    let fresh = create_app(build_state_with(
        env.state.db.clone(),
        env.state.filesystems.clone(),
        env.state.config.clone(),
        Box::new(NoopIdentifier),
        InlineProber::new(),
    ));
    drop(app);

    let (status, _, _) = get(&fresh, "/media/web/img-0001/master").await;
    assert_eq!(status, StatusCode::OK);

    let second = Masters::find().one(&env.state.db).await.unwrap().unwrap();
    // Once set, the content hash never changes.
    assert_eq!(second.sha256, first.sha256);
}

#[tokio::test]
async fn test_health_check() {
    let env = setup_env().await;
    let app = create_app(env.state.clone());

    let (status, body, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}
