use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A named binding between a logical location and a filesystem backend.
///
/// `filebase` is the URN root every object of this storage lives under,
/// `scheme://backend/bucket`, and must resolve to a registered filesystem
/// implementation when the row is created.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "storages")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub filebase: String,
    pub data_dir: String,
    pub video_dir: String,
    pub submaster_dir: String,
    pub temp_dir: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::collections::Entity")]
    Collections,
}

impl Related<super::collections::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Collections.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
