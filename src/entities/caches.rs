use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Action name of the canonical (unmodified) copy of a master.
pub const MASTER_ACTION: &str = "master";

/// A materialized derivative artifact. `(master_id, action, params)` is the
/// cache key; the row for the `master` action is the canonical copy and must
/// exist before any other row of the same master.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "caches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
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

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::masters::Entity",
        from = "Column::MasterId",
        to = "super::masters::Column::Id"
    )]
    Master,
}

impl Related<super::masters::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Master.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
