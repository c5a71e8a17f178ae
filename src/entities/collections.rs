use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A named namespace of assets belonging to one estate and bound to one
/// storage. Names are unique case-insensitively and stored lower-case.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "collections")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub estate_id: i64,
    pub storage_id: i64,
    pub signature_prefix: Option<String>,
    pub description: Option<String>,
    pub external_group: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::estates::Entity",
        from = "Column::EstateId",
        to = "super::estates::Column::Id"
    )]
    Estate,
    #[sea_orm(
        belongs_to = "super::storages::Entity",
        from = "Column::StorageId",
        to = "super::storages::Column::Id"
    )]
    Storage,
    #[sea_orm(has_many = "super::masters::Entity")]
    Masters,
}

impl Related<super::estates::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Estate.def()
    }
}

impl Related<super::storages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Storage.def()
    }
}

impl Related<super::masters::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Masters.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
