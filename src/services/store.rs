use crate::entities::{caches, collections, estates, masters, storages, prelude::*};
use crate::services::error::MediaError;
use async_trait::async_trait;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};

/// Fields required to create a storage row.
#[derive(Debug, Clone)]
pub struct NewStorage {
    pub name: String,
    pub filebase: String,
    pub data_dir: String,
    pub video_dir: String,
    pub submaster_dir: String,
    pub temp_dir: String,
}

/// Fields required to create a collection row.
#[derive(Debug, Clone)]
pub struct NewCollection {
    pub name: String,
    pub estate_id: i64,
    pub storage_id: i64,
    pub signature_prefix: Option<String>,
    pub description: Option<String>,
    pub external_group: Option<i64>,
}

/// Fields required to create a master row; it starts unidentified with an
/// empty content hash.
#[derive(Debug, Clone)]
pub struct NewMaster {
    pub collection_id: i64,
    pub signature: String,
    pub urn: String,
    pub parent_id: Option<i64>,
}

/// Fields of a derivative artifact row.
#[derive(Debug, Clone)]
pub struct NewCache {
    pub collection_id: i64,
    pub master_id: i64,
    pub action: String,
    pub params: String,
    pub mimetype: String,
    pub filesize: i64,
    pub path: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub duration: Option<i64>,
}

/// Narrow interface to the backing metadata store. Absence is reported as
/// the distinguished [`MediaError::NotFound`] so callers can branch into
/// ingestion or generation.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn list_estates(&self) -> Result<Vec<estates::Model>, MediaError>;
    async fn get_estate_by_id(&self, id: i64) -> Result<estates::Model, MediaError>;
    async fn get_estate_by_name(&self, name: &str) -> Result<estates::Model, MediaError>;
    async fn create_estate(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<estates::Model, MediaError>;

    async fn list_storages(&self) -> Result<Vec<storages::Model>, MediaError>;
    async fn get_storage_by_id(&self, id: i64) -> Result<storages::Model, MediaError>;
    async fn get_storage_by_name(&self, name: &str) -> Result<storages::Model, MediaError>;
    async fn create_storage(&self, storage: NewStorage) -> Result<storages::Model, MediaError>;

    async fn list_collections(&self) -> Result<Vec<collections::Model>, MediaError>;
    async fn get_collection_by_id(&self, id: i64) -> Result<collections::Model, MediaError>;
    async fn get_collection_by_name(&self, name: &str)
        -> Result<collections::Model, MediaError>;
    async fn create_collection(
        &self,
        collection: NewCollection,
    ) -> Result<collections::Model, MediaError>;

    async fn get_master_by_signature(
        &self,
        collection_id: i64,
        signature: &str,
    ) -> Result<masters::Model, MediaError>;
    async fn get_master_by_id(&self, id: i64) -> Result<masters::Model, MediaError>;
    async fn create_master(&self, master: NewMaster) -> Result<masters::Model, MediaError>;
    /// Upsert by id; used by ingestion to record identification results.
    async fn store_master(&self, master: masters::Model) -> Result<masters::Model, MediaError>;

    async fn get_cache(
        &self,
        master_id: i64,
        action: &str,
        params: &str,
    ) -> Result<caches::Model, MediaError>;
    async fn get_cache_by_signature(
        &self,
        collection_id: i64,
        signature: &str,
        action: &str,
        params: &str,
    ) -> Result<caches::Model, MediaError>;
    /// Upsert on the `(master, action, params)` cache key; concurrent
    /// generators settle on one canonical row.
    async fn store_cache(&self, cache: NewCache) -> Result<caches::Model, MediaError>;
}

/// Production store over the relational database.
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataStore for SeaOrmStore {
    async fn list_estates(&self) -> Result<Vec<estates::Model>, MediaError> {
        Ok(Estates::find().all(&self.db).await?)
    }

    async fn get_estate_by_id(&self, id: i64) -> Result<estates::Model, MediaError> {
        Estates::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| MediaError::not_found(format!("estate {id}")))
    }

    async fn get_estate_by_name(&self, name: &str) -> Result<estates::Model, MediaError> {
        Estates::find()
            .filter(estates::Column::Name.eq(name.to_lowercase()))
            .one(&self.db)
            .await?
            .ok_or_else(|| MediaError::not_found(format!("estate {name}")))
    }

    async fn create_estate(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<estates::Model, MediaError> {
        let model = estates::ActiveModel {
            name: Set(name.to_lowercase()),
            description: Set(description.map(str::to_string)),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn list_storages(&self) -> Result<Vec<storages::Model>, MediaError> {
        Ok(Storages::find().all(&self.db).await?)
    }

    async fn get_storage_by_id(&self, id: i64) -> Result<storages::Model, MediaError> {
        Storages::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| MediaError::not_found(format!("storage {id}")))
    }

    async fn get_storage_by_name(&self, name: &str) -> Result<storages::Model, MediaError> {
        Storages::find()
            .filter(storages::Column::Name.eq(name.to_lowercase()))
            .one(&self.db)
            .await?
            .ok_or_else(|| MediaError::not_found(format!("storage {name}")))
    }

    async fn create_storage(&self, storage: NewStorage) -> Result<storages::Model, MediaError> {
        let model = storages::ActiveModel {
            name: Set(storage.name.to_lowercase()),
            filebase: Set(storage.filebase),
            data_dir: Set(storage.data_dir),
            video_dir: Set(storage.video_dir),
            submaster_dir: Set(storage.submaster_dir),
            temp_dir: Set(storage.temp_dir),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn list_collections(&self) -> Result<Vec<collections::Model>, MediaError> {
        Ok(Collections::find().all(&self.db).await?)
    }

    async fn get_collection_by_id(&self, id: i64) -> Result<collections::Model, MediaError> {
        Collections::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| MediaError::not_found(format!("collection {id}")))
    }

    async fn get_collection_by_name(
        &self,
        name: &str,
    ) -> Result<collections::Model, MediaError> {
        Collections::find()
            .filter(collections::Column::Name.eq(name.to_lowercase()))
            .one(&self.db)
            .await?
            .ok_or_else(|| MediaError::not_found(format!("collection {name}")))
    }

    async fn create_collection(
        &self,
        collection: NewCollection,
    ) -> Result<collections::Model, MediaError> {
        let model = collections::ActiveModel {
            name: Set(collection.name.to_lowercase()),
            estate_id: Set(collection.estate_id),
            storage_id: Set(collection.storage_id),
            signature_prefix: Set(collection.signature_prefix),
            description: Set(collection.description),
            external_group: Set(collection.external_group),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn get_master_by_signature(
        &self,
        collection_id: i64,
        signature: &str,
    ) -> Result<masters::Model, MediaError> {
        Masters::find()
            .filter(masters::Column::CollectionId.eq(collection_id))
            .filter(masters::Column::Signature.eq(signature.to_lowercase()))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                MediaError::not_found(format!("master {collection_id}/{signature}"))
            })
    }

    async fn get_master_by_id(&self, id: i64) -> Result<masters::Model, MediaError> {
        Masters::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| MediaError::not_found(format!("master {id}")))
    }

    async fn create_master(&self, master: NewMaster) -> Result<masters::Model, MediaError> {
        let model = masters::ActiveModel {
            collection_id: Set(master.collection_id),
            signature: Set(master.signature.to_lowercase()),
            urn: Set(master.urn),
            parent_id: Set(master.parent_id),
            status: Set(masters::STATUS_UNIDENTIFIED.to_string()),
            sha256: Set(String::new()),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn store_master(&self, master: masters::Model) -> Result<masters::Model, MediaError> {
        let model = masters::ActiveModel {
            id: Set(master.id),
            collection_id: Set(master.collection_id),
            signature: Set(master.signature),
            parent_id: Set(master.parent_id),
            urn: Set(master.urn),
            media_type: Set(master.media_type),
            media_subtype: Set(master.media_subtype),
            mimetype: Set(master.mimetype),
            status: Set(master.status),
            sha256: Set(master.sha256),
            metadata: Set(master.metadata),
            last_error: Set(master.last_error),
        };
        Ok(model.update(&self.db).await?)
    }

    async fn get_cache(
        &self,
        master_id: i64,
        action: &str,
        params: &str,
    ) -> Result<caches::Model, MediaError> {
        Caches::find()
            .filter(caches::Column::MasterId.eq(master_id))
            .filter(caches::Column::Action.eq(action))
            .filter(caches::Column::Params.eq(params))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                MediaError::not_found(format!("cache {master_id}/{action}/{params}"))
            })
    }

    async fn get_cache_by_signature(
        &self,
        collection_id: i64,
        signature: &str,
        action: &str,
        params: &str,
    ) -> Result<caches::Model, MediaError> {
        let master = self
            .get_master_by_signature(collection_id, signature)
            .await?;
        self.get_cache(master.id, action, params).await
    }

    async fn store_cache(&self, cache: NewCache) -> Result<caches::Model, MediaError> {
        // Upsert on the cache key: the first row wins, later generators only
        // refresh its book-keeping fields.
        match self
            .get_cache(cache.master_id, &cache.action, &cache.params)
            .await
        {
            Ok(existing) => {
                let model = caches::ActiveModel {
                    id: Set(existing.id),
                    collection_id: Set(cache.collection_id),
                    master_id: Set(cache.master_id),
                    action: Set(cache.action),
                    params: Set(cache.params),
                    mimetype: Set(cache.mimetype),
                    filesize: Set(cache.filesize),
                    path: Set(cache.path),
                    width: Set(cache.width),
                    height: Set(cache.height),
                    duration: Set(cache.duration),
                };
                Ok(model.update(&self.db).await?)
            }
            Err(MediaError::NotFound(_)) => {
                let model = caches::ActiveModel {
                    collection_id: Set(cache.collection_id),
                    master_id: Set(cache.master_id),
                    action: Set(cache.action),
                    params: Set(cache.params),
                    mimetype: Set(cache.mimetype),
                    filesize: Set(cache.filesize),
                    path: Set(cache.path),
                    width: Set(cache.width),
                    height: Set(cache.height),
                    duration: Set(cache.duration),
                    ..Default::default()
                };
                Ok(model.insert(&self.db).await?)
            }
            Err(e) => Err(e),
        }
    }
}
