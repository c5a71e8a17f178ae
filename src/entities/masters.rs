use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ingestion lifecycle states of a master.
pub const STATUS_UNIDENTIFIED: &str = "unidentified";
pub const STATUS_IDENTIFIED: &str = "identified";
pub const STATUS_ERROR: &str = "error";

/// The canonical identity of one source asset inside a collection.
///
/// `(collection_id, signature)` is unique; `sha256` stays empty until the
/// first successful ingestion and is never changed afterwards.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "masters")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub collection_id: i64,
    pub signature: String,
    pub parent_id: Option<i64>,
    pub urn: String,
    pub media_type: Option<String>,
    pub media_subtype: Option<String>,
    pub mimetype: Option<String>,
    pub status: String,
    pub sha256: String,
    pub metadata: Option<Json>,
    pub last_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::collections::Entity",
        from = "Column::CollectionId",
        to = "super::collections::Column::Id"
    )]
    Collection,
    #[sea_orm(has_many = "super::caches::Entity")]
    Caches,
}

impl Related<super::collections::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Collection.def()
    }
}

impl Related<super::caches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Caches.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
