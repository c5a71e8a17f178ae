use crate::entities::{caches, collections, estates, masters, storages};
use crate::services::error::MediaError;
use crate::services::storage::{parse_locator, FileSystemRegistry};
use crate::services::store::{MetadataStore, NewCache, NewCollection, NewMaster, NewStorage};
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::ttl_cache::TtlCache;
use std::sync::Arc;
use std::time::Duration;

/// Entries per entity kind and their lifetime; the backing store remains
/// authoritative, these only absorb repeated lookups.
pub const CACHE_CAPACITY: usize = 128;
pub const CACHE_TTL: Duration = Duration::from_secs(3 * 3600);

/// Read-through, type-partitioned cache over the backing metadata store.
///
/// Each entity kind has its own bounded TTL cache; fills are serialized
/// per lookup key, so concurrent misses for one key share a single
/// backing-store call while unrelated keys proceed independently.
/// Masters and caches are additionally keyed by their human-readable
/// identifiers so lookups by name are as fast as lookups by id.
pub struct MediaRepository {
    store: Arc<dyn MetadataStore>,
    filesystems: Arc<FileSystemRegistry>,
    estates: TtlCache<estates::Model>,
    storages: TtlCache<storages::Model>,
    collections: TtlCache<collections::Model>,
    masters: TtlCache<masters::Model>,
    caches: TtlCache<caches::Model>,
    flights: KeyedMutex,
}

impl MediaRepository {
    pub fn new(store: Arc<dyn MetadataStore>, filesystems: Arc<FileSystemRegistry>) -> Self {
        Self {
            store,
            filesystems,
            estates: TtlCache::new(CACHE_CAPACITY, CACHE_TTL),
            storages: TtlCache::new(CACHE_CAPACITY, CACHE_TTL),
            collections: TtlCache::new(CACHE_CAPACITY, CACHE_TTL),
            masters: TtlCache::new(CACHE_CAPACITY, CACHE_TTL),
            caches: TtlCache::new(CACHE_CAPACITY, CACHE_TTL),
            flights: KeyedMutex::new(),
        }
    }

    pub async fn estate_by_id(&self, id: i64) -> Result<Arc<estates::Model>, MediaError> {
        let key = format!("est:{id}");
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.estates.get(&key) {
            return Ok(hit);
        }
        let estate = Arc::new(self.store.get_estate_by_id(id).await?);
        self.estates.insert(key, estate.clone());
        self.estates
            .insert(format!("est:{}", estate.name), estate.clone());
        Ok(estate)
    }

    pub async fn estate_by_name(&self, name: &str) -> Result<Arc<estates::Model>, MediaError> {
        let name = name.to_lowercase();
        let key = format!("est:{name}");
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.estates.get(&key) {
            return Ok(hit);
        }
        let estate = Arc::new(self.store.get_estate_by_name(&name).await?);
        self.estates.insert(key, estate.clone());
        self.estates
            .insert(format!("est:{}", estate.id), estate.clone());
        Ok(estate)
    }

    pub async fn create_estate(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<estates::Model, MediaError> {
        self.store.create_estate(name, description).await
    }

    pub async fn storage_by_id(&self, id: i64) -> Result<Arc<storages::Model>, MediaError> {
        let key = format!("stor:{id}");
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.storages.get(&key) {
            return Ok(hit);
        }
        let storage = Arc::new(self.store.get_storage_by_id(id).await?);
        self.storages.insert(key, storage.clone());
        self.storages
            .insert(format!("stor:{}", storage.name), storage.clone());
        Ok(storage)
    }

    pub async fn storage_by_name(&self, name: &str) -> Result<Arc<storages::Model>, MediaError> {
        let name = name.to_lowercase();
        let key = format!("stor:{name}");
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.storages.get(&key) {
            return Ok(hit);
        }
        let storage = Arc::new(self.store.get_storage_by_name(&name).await?);
        self.storages.insert(key, storage.clone());
        self.storages
            .insert(format!("stor:{}", storage.id), storage.clone());
        Ok(storage)
    }

    /// Creates a storage binding. The filebase must point at a registered
    /// filesystem backend, otherwise construction fails.
    pub async fn create_storage(&self, storage: NewStorage) -> Result<storages::Model, MediaError> {
        let probe_urn = format!("{}/_probe", storage.filebase);
        let locator = parse_locator(&probe_urn)?;
        if !self.filesystems.contains(locator.backend) {
            return Err(MediaError::Storage(format!(
                "filesystem {} unknown",
                locator.backend
            )));
        }
        self.store.create_storage(storage).await
    }

    pub async fn collection_by_id(&self, id: i64) -> Result<Arc<collections::Model>, MediaError> {
        let key = format!("coll:{id}");
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.collections.get(&key) {
            return Ok(hit);
        }
        let coll = Arc::new(self.store.get_collection_by_id(id).await?);
        self.collections.insert(key, coll.clone());
        self.collections
            .insert(format!("coll:{}", coll.name), coll.clone());
        Ok(coll)
    }

    pub async fn collection_by_name(
        &self,
        name: &str,
    ) -> Result<Arc<collections::Model>, MediaError> {
        let name = name.to_lowercase();
        let key = format!("coll:{name}");
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.collections.get(&key) {
            return Ok(hit);
        }
        let coll = Arc::new(self.store.get_collection_by_name(&name).await?);
        self.collections.insert(key, coll.clone());
        self.collections
            .insert(format!("coll:{}", coll.id), coll.clone());
        Ok(coll)
    }

    /// Creates a collection after verifying that its estate and storage
    /// references resolve.
    pub async fn create_collection(
        &self,
        collection: NewCollection,
    ) -> Result<collections::Model, MediaError> {
        self.estate_by_id(collection.estate_id).await?;
        self.storage_by_id(collection.storage_id).await?;
        self.store.create_collection(collection).await
    }

    pub async fn master(
        &self,
        collection: &collections::Model,
        signature: &str,
    ) -> Result<Arc<masters::Model>, MediaError> {
        let signature = signature.to_lowercase();
        let key = format!("mas:{}/{}", collection.name, signature);
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.masters.get(&key) {
            return Ok(hit);
        }
        let master = Arc::new(
            self.store
                .get_master_by_signature(collection.id, &signature)
                .await?,
        );
        self.masters.insert(key, master.clone());
        self.masters
            .insert(format!("mas:{}", master.id), master.clone());
        Ok(master)
    }

    pub async fn master_by_id(&self, id: i64) -> Result<Arc<masters::Model>, MediaError> {
        let key = format!("mas:{id}");
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.masters.get(&key) {
            return Ok(hit);
        }
        let master = Arc::new(self.store.get_master_by_id(id).await?);
        self.masters.insert(key, master.clone());
        Ok(master)
    }

    pub async fn create_master(&self, master: NewMaster) -> Result<masters::Model, MediaError> {
        self.collection_by_id(master.collection_id).await?;
        self.store.create_master(master).await
    }

    /// Writes a master through to the store and refreshes its cached
    /// entries.
    pub async fn store_master(
        &self,
        collection: &collections::Model,
        master: masters::Model,
    ) -> Result<Arc<masters::Model>, MediaError> {
        let stored = Arc::new(self.store.store_master(master).await?);
        self.masters
            .insert(format!("mas:{}", stored.id), stored.clone());
        self.masters.insert(
            format!("mas:{}/{}", collection.name, stored.signature),
            stored.clone(),
        );
        Ok(stored)
    }

    pub async fn cache(
        &self,
        master_id: i64,
        action: &str,
        params: &str,
    ) -> Result<Arc<caches::Model>, MediaError> {
        let action = action.to_lowercase();
        let key = format!("cac:{master_id}/{action}/{params}");
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.caches.get(&key) {
            return Ok(hit);
        }
        let row = Arc::new(self.store.get_cache(master_id, &action, params).await?);
        self.caches.insert(key, row.clone());
        Ok(row)
    }

    pub async fn cache_by_signature(
        &self,
        collection: &str,
        signature: &str,
        action: &str,
        params: &str,
    ) -> Result<Arc<caches::Model>, MediaError> {
        let collection = collection.to_lowercase();
        let signature = signature.to_lowercase();
        let action = action.to_lowercase();
        let key = format!("cac:{collection}/{signature}/{action}/{params}");
        let _flight = self.flights.lock(&key).await;
        if let Some(hit) = self.caches.get(&key) {
            return Ok(hit);
        }
        let coll = self.collection_by_name(&collection).await?;
        let row = Arc::new(
            self.store
                .get_cache_by_signature(coll.id, &signature, &action, params)
                .await?,
        );
        self.caches.insert(key, row.clone());
        self.caches.insert(
            format!("cac:{}/{}/{}", row.master_id, action, params),
            row.clone(),
        );
        Ok(row)
    }

    /// Persists a derivative row and primes both its id- and name-keyed
    /// cache entries. Only called after the bytes are durably stored.
    pub async fn store_cache(
        &self,
        collection: &collections::Model,
        master: &masters::Model,
        cache: NewCache,
    ) -> Result<Arc<caches::Model>, MediaError> {
        let row = Arc::new(self.store.store_cache(cache).await?);
        self.caches.insert(
            format!("cac:{}/{}/{}", master.id, row.action, row.params),
            row.clone(),
        );
        self.caches.insert(
            format!(
                "cac:{}/{}/{}/{}",
                collection.name, master.signature, row.action, row.params
            ),
            row.clone(),
        );
        self.flights.prune();
        Ok(row)
    }
}
