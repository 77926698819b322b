use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Named price book holding tiered price rows per SKU.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "pricelists")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    pub description: Option<String>,

    /// ISO 4217 code
    #[validate(length(min = 3, max = 3))]
    pub currency: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub is_active: bool,
    pub sequence: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::price_detail::Entity")]
    PriceDetails,
}

impl Related<super::price_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PriceDetails.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
