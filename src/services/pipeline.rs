use crate::entities::caches::MASTER_ACTION;
use crate::entities::{caches, collections, masters, storages};
use crate::services::canonical::Canonicalizer;
use crate::services::digest::{DigestTap, TapReader};
use crate::services::error::MediaError;
use crate::services::probe::MediaProber;
use crate::services::repository::MediaRepository;
use crate::services::resolver::{mime_relevance, TypeResolver};
use crate::services::storage::{FileReader, FileSystemRegistry};
use crate::services::store::NewCache;
use crate::services::transform::TransformEngine;
use crate::utils::hash::md5_hex;
use serde_json::json;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

/// Tunables of the request pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory for digest-tap staging files.
    pub temp_dir: PathBuf,
    /// Bytes of each ingested stream kept for random-access inspection.
    pub head_buffer_size: usize,
    /// Lifetime of URLs handed to the external probe tools.
    pub presign_expiry: Duration,
}

/// Bytes served back to the transport layer.
pub struct ServeReply {
    pub body: FileReader,
    pub mimetype: String,
    pub size: i64,
}

/// The request-facing state machine: turns `(collection, signature, action,
/// params)` into bytes. Cache hit streams from storage; a miss ingests the
/// master on first access and generates the derivative, persisting both
/// before serving. Nothing is committed on failure.
pub struct MediaPipeline {
    repo: Arc<MediaRepository>,
    filesystems: Arc<FileSystemRegistry>,
    canonicalizer: Canonicalizer,
    resolver: TypeResolver,
    prober: Arc<dyn MediaProber>,
    engine: TransformEngine,
    settings: PipelineSettings,
}

impl MediaPipeline {
    pub fn new(
        repo: Arc<MediaRepository>,
        filesystems: Arc<FileSystemRegistry>,
        resolver: TypeResolver,
        prober: Arc<dyn MediaProber>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            repo,
            filesystems,
            canonicalizer: Canonicalizer::new(),
            resolver,
            prober,
            engine: TransformEngine::new(),
            settings,
        }
    }

    pub async fn serve(
        &self,
        collection: &str,
        signature: &str,
        action: &str,
        raw_params: &[&str],
    ) -> Result<ServeReply, MediaError> {
        let request = self.canonicalizer.canonicalize(action, raw_params)?;

        match self
            .repo
            .cache_by_signature(collection, signature, &request.action, &request.canonical)
            .await
        {
            Ok(row) => return self.stream(&row).await,
            Err(err) if !err.is_not_found() => return Err(err),
            Err(_) => {}
        }

        let coll = self.repo.collection_by_name(collection).await?;
        let master = self.repo.master(&coll, signature).await?;
        let storage = self.repo.storage_by_id(coll.storage_id).await?;

        // The canonical copy must exist before anything else can.
        let (master, master_row) = match self.repo.cache(master.id, MASTER_ACTION, "").await {
            Ok(row) => (master, row),
            Err(err) if err.is_not_found() => {
                self.ingest_master(&coll, &storage, &master).await?
            }
            Err(err) => return Err(err),
        };

        if request.action == MASTER_ACTION {
            return self.stream(&master_row).await;
        }

        let mimetype = master
            .mimetype
            .clone()
            .unwrap_or_else(|| master_row.mimetype.clone());

        let (mut reader, _) = self.filesystems.open_read(&master_row.path).await?;
        let mut source = Vec::with_capacity(master_row.filesize.max(0) as usize);
        reader.read_to_end(&mut source).await?;

        let rendition = self
            .engine
            .render(&mimetype, &request.action, &request.values, &source)?;

        let dir = if rendition.meta.mimetype.starts_with("video/") {
            &storage.video_dir
        } else {
            &storage.data_dir
        };
        let path = derivative_path(
            &storage,
            dir,
            &coll,
            &master,
            &request.action,
            &request.canonical,
        );
        let size = rendition.meta.size;
        self.filesystems
            .write(&path, Box::new(Cursor::new(rendition.bytes)), size)
            .await?;

        info!(
            "generated {}/{}/{}/{} -> {} ({} bytes)",
            coll.name, master.signature, request.action, request.canonical, path, size
        );

        let row = self
            .repo
            .store_cache(
                &coll,
                &master,
                NewCache {
                    collection_id: coll.id,
                    master_id: master.id,
                    action: request.action,
                    params: request.canonical,
                    mimetype: rendition.meta.mimetype,
                    filesize: size,
                    path,
                    width: dimension(rendition.meta.width),
                    height: dimension(rendition.meta.height),
                    duration: dimension(rendition.meta.duration),
                },
            )
            .await?;
        self.stream(&row).await
    }

    async fn stream(&self, row: &caches::Model) -> Result<ServeReply, MediaError> {
        let (body, _) = self.filesystems.open_read(&row.path).await?;
        Ok(ServeReply {
            body,
            mimetype: row.mimetype.clone(),
            size: row.filesize,
        })
    }

    /// One-time copy of the source asset into durable storage: the stream is
    /// teed through the digest tap, the head sample drives type resolution,
    /// and the identified master plus its canonical cache row are persisted.
    /// A failure marks the master `error` and persists nothing else.
    async fn ingest_master(
        &self,
        coll: &collections::Model,
        storage: &storages::Model,
        master: &Arc<masters::Model>,
    ) -> Result<(Arc<masters::Model>, Arc<caches::Model>), MediaError> {
        let result = self.ingest_inner(coll, storage, master).await;
        if let Err(err) = &result {
            let mut failed = (**master).clone();
            failed.status = masters::STATUS_ERROR.to_string();
            failed.last_error = Some(err.to_string());
            if let Err(store_err) = self.repo.store_master(coll, failed).await {
                warn!(
                    "cannot record ingestion failure for {}/{}: {}",
                    coll.name, master.signature, store_err
                );
            }
        }
        result
    }

    async fn ingest_inner(
        &self,
        coll: &collections::Model,
        storage: &storages::Model,
        master: &Arc<masters::Model>,
    ) -> Result<(Arc<masters::Model>, Arc<caches::Model>), MediaError> {
        let path = derivative_path(storage, &storage.data_dir, coll, master, MASTER_ACTION, "");

        let (reader, stat) = self.filesystems.open_read(&master.urn).await?;

        let mut tap = DigestTap::new(&self.settings.temp_dir, self.settings.head_buffer_size);
        let head_path = tap.open()?;
        let tap = Arc::new(Mutex::new(tap));

        let tee = TapReader::new(reader, tap.clone());
        let written = self
            .filesystems
            .write(&path, Box::new(tee), stat.size)
            .await?;
        tap.lock().expect("digest tap poisoned").close()?;

        let head = tokio::fs::read(&head_path).await?;
        let resolved = self.resolver.resolve(&head, &head_path).await?;

        let location = self.probe_location(&path).await?;
        let probe = match resolved.media_type.as_str() {
            "image" => Some(self.prober.image_metadata(&location).await?),
            "video" => Some(self.prober.video_metadata(&location).await?),
            _ => None,
        };

        let digest = {
            let mut tap = tap.lock().expect("digest tap poisoned");
            let digest = tap.digest();
            tap.clear();
            digest
        };

        // The probe may know the mimetype more precisely than the resolver.
        let mut mimetype = resolved.mimetype.clone();
        if let Some(probed) = probe.as_ref().and_then(|p| p.mimetype.as_deref()) {
            if mime_relevance(probed) > mime_relevance(&mimetype) {
                mimetype = probed.to_string();
            }
        }
        let (width, height, duration) = probe
            .as_ref()
            .map(|p| (p.width, p.height, p.duration))
            .unwrap_or_default();

        let mut updated = (**master).clone();
        updated.media_type = Some(resolved.media_type);
        updated.media_subtype = Some(resolved.media_subtype);
        updated.mimetype = Some(mimetype.clone());
        // The content hash is set exactly once, at first successful
        // ingestion.
        if updated.sha256.is_empty() {
            updated.sha256 = digest;
        }
        updated.status = masters::STATUS_IDENTIFIED.to_string();
        updated.last_error = None;
        updated.metadata = Some(json!({
            "resolver": resolved.metadata,
            "probe": probe.as_ref().map(|p| p.raw.clone()),
        }));
        let master = self.repo.store_master(coll, updated).await?;

        info!(
            "ingested {}/{} as {} ({} bytes, sha256 {})",
            coll.name, master.signature, mimetype, written, master.sha256
        );

        let row = self
            .repo
            .store_cache(
                coll,
                &master,
                NewCache {
                    collection_id: coll.id,
                    master_id: master.id,
                    action: MASTER_ACTION.to_string(),
                    params: String::new(),
                    mimetype,
                    filesize: written,
                    path,
                    width: dimension(width),
                    height: dimension(height),
                    duration: dimension(duration),
                },
            )
            .await?;
        Ok((master, row))
    }

    /// Location handed to the external tools: a pre-signed URL, or the plain
    /// path for local backends.
    async fn probe_location(&self, urn: &str) -> Result<String, MediaError> {
        let url = self
            .filesystems
            .presigned_url(urn, self.settings.presign_expiry)
            .await?;
        Ok(url
            .strip_prefix("file://")
            .map(str::to_string)
            .unwrap_or(url))
    }
}

fn dimension(value: i64) -> Option<i64> {
    (value > 0).then_some(value)
}

/// Deterministic storage path of one derivative:
/// `{filebase}/{dir}/{collectionId}.{masterId}-{md5(collection/signature/action/params)}`.
/// Re-derivation of an identical request always targets the same path.
fn derivative_path(
    storage: &storages::Model,
    dir: &str,
    coll: &collections::Model,
    master: &masters::Model,
    action: &str,
    params: &str,
) -> String {
    let key = format!("{}/{}/{}/{}", coll.name, master.signature, action, params);
    format!(
        "{}/{}/{}.{}-{}",
        storage.filebase,
        dir,
        coll.id,
        master.id,
        md5_hex(key.as_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (storages::Model, collections::Model, masters::Model) {
        let storage = storages::Model {
            id: 1,
            name: "main".into(),
            filebase: "local://media/bucket".into(),
            data_dir: "data".into(),
            video_dir: "video".into(),
            submaster_dir: "submaster".into(),
            temp_dir: "temp".into(),
        };
        let coll = collections::Model {
            id: 7,
            name: "web".into(),
            estate_id: 1,
            storage_id: 1,
            signature_prefix: None,
            description: None,
            external_group: None,
        };
        let master = masters::Model {
            id: 42,
            collection_id: 7,
            signature: "img-0001".into(),
            parent_id: None,
            urn: "local://media/incoming/img-0001.png".into(),
            media_type: None,
            media_subtype: None,
            mimetype: None,
            status: masters::STATUS_UNIDENTIFIED.into(),
            sha256: String::new(),
            metadata: None,
            last_error: None,
        };
        (storage, coll, master)
    }

    #[test]
    fn test_derivative_path_is_deterministic() {
        let (storage, coll, master) = fixture();
        let a = derivative_path(&storage, "data", &coll, &master, "resize", "size+10x10");
        let b = derivative_path(&storage, "data", &coll, &master, "resize", "size+10x10");
        assert_eq!(a, b);
        assert!(a.starts_with("local://media/bucket/data/7.42-"));
    }

    #[test]
    fn test_derivative_path_depends_on_params() {
        let (storage, coll, master) = fixture();
        let a = derivative_path(&storage, "data", &coll, &master, "resize", "size+10x10");
        let b = derivative_path(&storage, "data", &coll, &master, "resize", "size+20x20");
        assert_ne!(a, b);
    }
}
