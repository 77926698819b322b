use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Category node in the self-referencing hierarchy.
///
/// Hierarchy rule: a root category (no parent) must carry a category type,
/// a child category must not. Slugs are unique within a sibling scope.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(length(min = 1, max = 100))]
    pub slug: String,

    pub description: Option<String>,

    pub category_type_id: Option<Uuid>,

    pub parent_id: Option<Uuid>,

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
        belongs_to = "super::category_type::Entity",
        from = "Column::CategoryTypeId",
        to = "super::category_type::Column::Id"
    )]
    CategoryType,

    #[sea_orm(belongs_to = "Entity", from = "Column::ParentId", to = "Column::Id")]
    Parent,

    #[sea_orm(has_many = "super::product::Entity")]
    Products,

    #[sea_orm(has_many = "super::category_attribute_set::Entity")]
    CategoryAttributeSets,
}

impl Related<super::category_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CategoryType.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Products.def()
    }
}

impl Related<super::attribute_set::Entity> for Entity {
    fn to() -> RelationDef {
        super::category_attribute_set::Relation::AttributeSet.def()
    }

    fn via() -> Option<RelationDef> {
        Some(
            super::category_attribute_set::Relation::Category
                .def()
                .rev(),
        )
    }
}

impl ActiveModelBehavior for ActiveModel {}
