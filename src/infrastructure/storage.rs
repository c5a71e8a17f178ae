use crate::config::MediaConfig;
use crate::services::storage::{FileSystemRegistry, LocalFileSystem, S3FileSystem};
use aws_sdk_s3::config::Region;
use std::env;
use std::sync::Arc;
use tracing::info;

/// Builds the filesystem registry from the environment: an S3/MinIO backend
/// when `MINIO_ENDPOINT` is set, a local backend when the config names a
/// base directory.
pub async fn setup_filesystems(config: &MediaConfig) -> Arc<FileSystemRegistry> {
    let mut registry = FileSystemRegistry::new();

    if let Ok(endpoint_url) = env::var("MINIO_ENDPOINT") {
        let access_key = env::var("MINIO_ACCESS_KEY").expect("MINIO_ACCESS_KEY must be set");
        let secret_key = env::var("MINIO_SECRET_KEY").expect("MINIO_SECRET_KEY must be set");

        info!(
            "☁️  S3 filesystem: {} as s3://{}",
            endpoint_url, config.s3_backend_name
        );

        let aws_config = aws_config::from_env()
            .endpoint_url(&endpoint_url)
            .region(Region::new("us-east-1"))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(true)
            .build();
        let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

        registry.register(Arc::new(S3FileSystem::new(
            s3_client,
            &config.s3_backend_name,
        )));
    }

    if let Some(basedir) = &config.local_basedir {
        info!(
            "📁 Local filesystem: {} as local://{}",
            basedir.display(),
            config.local_backend_name
        );
        registry.register(Arc::new(LocalFileSystem::new(
            &config.local_backend_name,
            basedir.clone(),
        )));
    }

    Arc::new(registry)
}
