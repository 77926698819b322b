use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Stock keeping unit: the priceable, attributable unit under a product.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "skus")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(length(min = 1, max = 100))]
    pub slug: String,

    pub description: Option<String>,

    /// Exactly 10 uppercase hex characters, generated when not supplied
    #[sea_orm(unique)]
    pub sku_number: String,

    pub product_id: Uuid,

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
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,

    #[sea_orm(has_many = "super::price_detail::Entity")]
    PriceDetails,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::price_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PriceDetails.def()
    }
}

/// Generates a fresh SKU number: the first 10 hex digits of a v4 UUID,
/// uppercased.
pub fn generate_sku_number() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_uppercase()
}

/// Checks the SKU number rule: exactly 10 chars, 0-9 or A-F only.
pub fn is_valid_sku_number(value: &str) -> bool {
    value.len() == 10
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if let ActiveValue::Set(ref sku_number) = self.sku_number {
            if !is_valid_sku_number(sku_number) {
                return Err(DbErr::Custom(format!(
                    "SKU number '{}' must be exactly 10 characters of 0-9 or A-F",
                    sku_number
                )));
            }
        }
        Ok(self)
    }
}
