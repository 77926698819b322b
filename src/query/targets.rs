//! [`FilterTarget`] impls wiring the engine to the catalog entities.

use sea_orm::sea_query::SimpleExpr;
use sea_orm::{JoinType, QuerySelect, RelationTrait, Select};
use serde_json::Value as JsonValue;

use crate::entities::{
    category, category_type, product, sku, supplier, EntityKind,
};
use crate::errors::ServiceError;
use crate::query::engine::{qualified_col, related_subquery, resolve_column, FilterTarget};
use crate::query::FilterOp;

impl FilterTarget for product::Entity {
    fn attribute_owner() -> Option<EntityKind> {
        Some(EntityKind::Product)
    }

    fn related_condition(
        relation: &str,
        column: &str,
        op: FilterOp,
        value: &JsonValue,
        active_only: bool,
    ) -> Result<SimpleExpr, ServiceError> {
        match relation {
            "category" => related_subquery::<category::Entity>(
                qualified_col::<Self>(product::Column::CategoryId),
                column,
                op,
                value,
                active_only,
            ),
            "supplier" => related_subquery::<supplier::Entity>(
                qualified_col::<Self>(product::Column::SupplierId),
                column,
                op,
                value,
                active_only,
            ),
            _ => Err(ServiceError::InvalidFilter(format!(
                "unknown relation '{}'",
                relation
            ))),
        }
    }

    fn related_sort(
        select: Select<Self>,
        relation: &str,
        column: &str,
    ) -> Result<(Select<Self>, SimpleExpr), ServiceError> {
        match relation {
            "category" => {
                let col = resolve_column::<category::Entity>(column).ok_or_else(|| {
                    ServiceError::InvalidFilter(format!("unknown field 'category.{}'", column))
                })?;
                Ok((
                    select.join(JoinType::LeftJoin, product::Relation::Category.def()),
                    qualified_col::<category::Entity>(col),
                ))
            }
            _ => Err(ServiceError::InvalidFilter(format!(
                "cannot sort by relation '{}'",
                relation
            ))),
        }
    }
}

impl FilterTarget for sku::Entity {
    fn attribute_owner() -> Option<EntityKind> {
        Some(EntityKind::Sku)
    }

    fn related_condition(
        relation: &str,
        column: &str,
        op: FilterOp,
        value: &JsonValue,
        active_only: bool,
    ) -> Result<SimpleExpr, ServiceError> {
        match relation {
            "product" => related_subquery::<product::Entity>(
                qualified_col::<Self>(sku::Column::ProductId),
                column,
                op,
                value,
                active_only,
            ),
            _ => Err(ServiceError::InvalidFilter(format!(
                "unknown relation '{}'",
                relation
            ))),
        }
    }

    fn related_sort(
        select: Select<Self>,
        relation: &str,
        column: &str,
    ) -> Result<(Select<Self>, SimpleExpr), ServiceError> {
        match relation {
            "product" => {
                let col = resolve_column::<product::Entity>(column).ok_or_else(|| {
                    ServiceError::InvalidFilter(format!("unknown field 'product.{}'", column))
                })?;
                Ok((
                    select.join(JoinType::LeftJoin, sku::Relation::Product.def()),
                    qualified_col::<product::Entity>(col),
                ))
            }
            _ => Err(ServiceError::InvalidFilter(format!(
                "cannot sort by relation '{}'",
                relation
            ))),
        }
    }
}

impl FilterTarget for category::Entity {
    fn related_condition(
        relation: &str,
        column: &str,
        op: FilterOp,
        value: &JsonValue,
        active_only: bool,
    ) -> Result<SimpleExpr, ServiceError> {
        match relation {
            "category_type" => related_subquery::<category_type::Entity>(
                qualified_col::<Self>(category::Column::CategoryTypeId),
                column,
                op,
                value,
                active_only,
            ),
            "parent" => related_subquery::<category::Entity>(
                qualified_col::<Self>(category::Column::ParentId),
                column,
                op,
                value,
                active_only,
            ),
            _ => Err(ServiceError::InvalidFilter(format!(
                "unknown relation '{}'",
                relation
            ))),
        }
    }
}

impl FilterTarget for supplier::Entity {}

impl FilterTarget for category_type::Entity {}

impl FilterTarget for crate::entities::attribute::Entity {}

impl FilterTarget for crate::entities::attribute_set::Entity {}

impl FilterTarget for crate::entities::pricelist::Entity {}
