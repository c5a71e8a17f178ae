use crate::services::error::MediaError;
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use url::Url;

pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, Default)]
pub struct FileStat {
    pub size: i64,
    pub modified: Option<DateTime<Utc>>,
}

/// A file locator `scheme://backend/bucket/path`, where `scheme://backend`
/// selects a registered filesystem implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct Locator<'a> {
    pub backend: &'a str,
    pub bucket: &'a str,
    pub path: &'a str,
}

pub fn parse_locator(urn: &str) -> Result<Locator<'_>, MediaError> {
    let scheme_end = urn
        .find("://")
        .ok_or_else(|| MediaError::Storage(format!("invalid locator {urn}")))?;
    let rest = &urn[scheme_end + 3..];
    let host_end = rest
        .find('/')
        .ok_or_else(|| MediaError::Storage(format!("invalid locator {urn}")))?;
    let backend = &urn[..scheme_end + 3 + host_end];
    let (bucket, path) = rest[host_end + 1..]
        .split_once('/')
        .ok_or_else(|| MediaError::Storage(format!("invalid locator {urn}")))?;
    if bucket.is_empty() || path.is_empty() {
        return Err(MediaError::Storage(format!("invalid locator {urn}")));
    }
    Ok(Locator {
        backend,
        bucket,
        path,
    })
}

/// One pluggable filesystem backend.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Registry key, `scheme://name`.
    fn protocol(&self) -> &str;

    fn is_local(&self) -> bool {
        false
    }

    async fn open_read(&self, bucket: &str, path: &str) -> Result<(FileReader, FileStat), MediaError>;

    /// Streamed write with declared content length; returns bytes written.
    async fn write(
        &self,
        bucket: &str,
        path: &str,
        reader: FileReader,
        size: i64,
    ) -> Result<i64, MediaError>;

    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, MediaError>;

    /// Time-boxed URL usable by external tools to read the object. Local
    /// backends return a `file://` URL.
    async fn presigned_url(
        &self,
        bucket: &str,
        path: &str,
        expiry: Duration,
    ) -> Result<String, MediaError>;
}

/// Routes locators to their backend implementations.
#[derive(Default)]
pub struct FileSystemRegistry {
    backends: HashMap<String, Arc<dyn FileSystem>>,
}

impl FileSystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fs: Arc<dyn FileSystem>) {
        self.backends.insert(fs.protocol().to_string(), fs);
    }

    pub fn contains(&self, backend: &str) -> bool {
        self.backends.contains_key(backend)
    }

    pub fn resolve<'a>(&self, urn: &'a str) -> Result<(Arc<dyn FileSystem>, Locator<'a>), MediaError> {
        let locator = parse_locator(urn)?;
        let fs = self
            .backends
            .get(locator.backend)
            .cloned()
            .ok_or_else(|| {
                MediaError::Storage(format!("no filesystem registered for {}", locator.backend))
            })?;
        Ok((fs, locator))
    }

    pub async fn open_read(&self, urn: &str) -> Result<(FileReader, FileStat), MediaError> {
        let (fs, locator) = self.resolve(urn)?;
        fs.open_read(locator.bucket, locator.path).await
    }

    pub async fn write(&self, urn: &str, reader: FileReader, size: i64) -> Result<i64, MediaError> {
        let (fs, locator) = self.resolve(urn)?;
        fs.write(locator.bucket, locator.path, reader, size).await
    }

    pub async fn exists(&self, urn: &str) -> Result<bool, MediaError> {
        let (fs, locator) = self.resolve(urn)?;
        fs.exists(locator.bucket, locator.path).await
    }

    pub async fn presigned_url(&self, urn: &str, expiry: Duration) -> Result<String, MediaError> {
        let (fs, locator) = self.resolve(urn)?;
        fs.presigned_url(locator.bucket, locator.path, expiry).await
    }
}

/// S3/MinIO-backed filesystem. Buckets in locators map to S3 buckets.
pub struct S3FileSystem {
    client: Client,
    name: String,
}

impl S3FileSystem {
    pub fn new(client: Client, name: &str) -> Self {
        Self {
            client,
            name: format!("s3://{name}"),
        }
    }
}

const UPLOAD_CHUNK_SIZE: usize = 10 * 1024 * 1024;

#[async_trait]
impl FileSystem for S3FileSystem {
    fn protocol(&self) -> &str {
        &self.name
    }

    async fn open_read(&self, bucket: &str, path: &str) -> Result<(FileReader, FileStat), MediaError> {
        let res = self
            .client
            .get_object()
            .bucket(bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| MediaError::Storage(format!("cannot open {bucket}/{path}: {e}")))?;

        let stat = FileStat {
            size: res.content_length.unwrap_or(0),
            modified: res
                .last_modified
                .and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos())),
        };
        Ok((Box::new(res.body.into_async_read()), stat))
    }

    async fn write(
        &self,
        bucket: &str,
        path: &str,
        mut reader: FileReader,
        _size: i64,
    ) -> Result<i64, MediaError> {
        let multipart = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| MediaError::Storage(format!("cannot start upload {bucket}/{path}: {e}")))?;
        let upload_id = multipart
            .upload_id()
            .ok_or_else(|| MediaError::Storage("no upload id".to_string()))?;

        let mut part_number = 1;
        let mut completed_parts = Vec::new();
        let mut total: i64 = 0;
        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];

        loop {
            let mut filled = 0;
            while filled < UPLOAD_CHUNK_SIZE {
                let read = reader
                    .read(&mut buffer[filled..])
                    .await
                    .map_err(MediaError::storage)?;
                if read == 0 {
                    break;
                }
                filled += read;
            }
            if filled == 0 {
                break;
            }
            total += filled as i64;

            let part = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(path)
                .upload_id(upload_id)
                .body(ByteStream::from(buffer[..filled].to_vec()))
                .part_number(part_number)
                .send()
                .await
                .map_err(|e| {
                    MediaError::Storage(format!("cannot upload part {part_number}: {e}"))
                })?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(part.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );
            part_number += 1;
        }

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(path)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| MediaError::Storage(format!("cannot finish upload {bucket}/{path}: {e}")))?;

        Ok(total)
    }

    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, MediaError> {
        let res = self
            .client
            .head_object()
            .bucket(bucket)
            .key(path)
            .send()
            .await;
        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(MediaError::storage(service_error))
                }
            }
        }
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        path: &str,
        expiry: Duration,
    ) -> Result<String, MediaError> {
        let config = PresigningConfig::expires_in(expiry).map_err(MediaError::storage)?;
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(path)
            .presigned(config)
            .await
            .map_err(|e| MediaError::Storage(format!("cannot presign {bucket}/{path}: {e}")))?;
        Ok(presigned.uri().to_string())
    }
}

/// Local-path filesystem; buckets are directories under `base`.
pub struct LocalFileSystem {
    name: String,
    base: PathBuf,
}

impl LocalFileSystem {
    pub fn new(name: &str, base: impl Into<PathBuf>) -> Self {
        Self {
            name: format!("local://{name}"),
            base: base.into(),
        }
    }

    fn full_path(&self, bucket: &str, path: &str) -> PathBuf {
        self.base.join(bucket).join(path)
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn protocol(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn open_read(&self, bucket: &str, path: &str) -> Result<(FileReader, FileStat), MediaError> {
        let full = self.full_path(bucket, path);
        let file = tokio::fs::File::open(&full)
            .await
            .map_err(|e| MediaError::Storage(format!("cannot open {}: {e}", full.display())))?;
        let meta = file.metadata().await.map_err(MediaError::storage)?;
        let stat = FileStat {
            size: meta.len() as i64,
            modified: meta.modified().ok().map(DateTime::from),
        };
        Ok((Box::new(file), stat))
    }

    async fn write(
        &self,
        bucket: &str,
        path: &str,
        mut reader: FileReader,
        _size: i64,
    ) -> Result<i64, MediaError> {
        let full = self.full_path(bucket, path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(MediaError::storage)?;
        }
        let mut file = tokio::fs::File::create(&full)
            .await
            .map_err(|e| MediaError::Storage(format!("cannot create {}: {e}", full.display())))?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| MediaError::Storage(format!("cannot write {}: {e}", full.display())))?;
        file.flush().await.map_err(MediaError::storage)?;
        Ok(written as i64)
    }

    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, MediaError> {
        Ok(tokio::fs::try_exists(self.full_path(bucket, path))
            .await
            .unwrap_or(false))
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        path: &str,
        _expiry: Duration,
    ) -> Result<String, MediaError> {
        let full = self.full_path(bucket, path);
        let url = Url::from_file_path(&full)
            .map_err(|_| MediaError::Storage(format!("not an absolute path: {}", full.display())))?;
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locator() {
        let loc = parse_locator("s3://minio/media/data/1.2-abc").unwrap();
        assert_eq!(loc.backend, "s3://minio");
        assert_eq!(loc.bucket, "media");
        assert_eq!(loc.path, "data/1.2-abc");
    }

    #[test]
    fn test_parse_locator_rejects_garbage() {
        assert!(parse_locator("no-scheme/path").is_err());
        assert!(parse_locator("s3://minio").is_err());
        assert!(parse_locator("s3://minio/bucket-only").is_err());
    }

    #[tokio::test]
    async fn test_local_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new("test", dir.path());

        let payload: &[u8] = b"local bytes";
        let written = fs
            .write("bucket", "nested/file.bin", Box::new(payload), payload.len() as i64)
            .await
            .unwrap();
        assert_eq!(written, payload.len() as i64);
        assert!(fs.exists("bucket", "nested/file.bin").await.unwrap());

        let (mut reader, stat) = fs.open_read("bucket", "nested/file.bin").await.unwrap();
        assert_eq!(stat.size, payload.len() as i64);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn test_registry_routes_by_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = FileSystemRegistry::new();
        registry.register(Arc::new(LocalFileSystem::new("media", dir.path())));

        assert!(registry.contains("local://media"));
        assert!(!registry.contains("s3://minio"));

        let payload: &[u8] = b"routed";
        registry
            .write("local://media/bucket/a/b", Box::new(payload), 6)
            .await
            .unwrap();
        assert!(registry.exists("local://media/bucket/a/b").await.unwrap());
        assert!(registry.open_read("s3://other/bucket/x").await.is_err());
    }
}
