use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Named, reusable grouping of attribute definitions.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "attribute_sets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    pub description: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub is_active: bool,
    pub sequence: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attribute_set_attribute::Entity")]
    AttributeSetAttributes,

    #[sea_orm(has_many = "super::category_attribute_set::Entity")]
    CategoryAttributeSets,
}

impl Related<super::attribute::Entity> for Entity {
    fn to() -> RelationDef {
        super::attribute_set_attribute::Relation::Attribute.def()
    }

    fn via() -> Option<RelationDef> {
        Some(
            super::attribute_set_attribute::Relation::AttributeSet
                .def()
                .rev(),
        )
    }
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        super::category_attribute_set::Relation::Category.def()
    }

    fn via() -> Option<RelationDef> {
        Some(
            super::category_attribute_set::Relation::AttributeSet
                .def()
                .rev(),
        )
    }
}

impl ActiveModelBehavior for ActiveModel {}
