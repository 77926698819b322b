use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One price tier for a (SKU, pricelist) pair.
///
/// `minimum_quantity` values are unique within the pair; resolution picks
/// the highest threshold not exceeding the requested quantity.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "price_details")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub sku_id: Uuid,

    pub pricelist_id: Uuid,

    pub minimum_quantity: i32,

    pub price: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub is_active: bool,
    pub sequence: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sku::Entity",
        from = "Column::SkuId",
        to = "super::sku::Column::Id"
    )]
    Sku,

    #[sea_orm(
        belongs_to = "super::pricelist::Entity",
        from = "Column::PricelistId",
        to = "super::pricelist::Column::Id"
    )]
    Pricelist,
}

impl Related<super::sku::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sku.def()
    }
}

impl Related<super::pricelist::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pricelist.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if let ActiveValue::Set(ref price) = self.price {
            if *price <= Decimal::ZERO {
                return Err(DbErr::Custom("price must be greater than zero".into()));
            }
        }
        if let ActiveValue::Set(ref minimum_quantity) = self.minimum_quantity {
            if *minimum_quantity < 1 {
                return Err(DbErr::Custom(
                    "minimum quantity must be greater than zero".into(),
                ));
            }
        }
        Ok(self)
    }
}
