//! Applies a [`QueryPlan`] to a sea-orm entity.
//!
//! Native columns resolve through the entity's column set; dotted one-hop
//! paths and dynamic attribute fields are delegated to the entity's
//! [`FilterTarget`] impl or routed through the polymorphic value table.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use sea_orm::sea_query::{
    Alias, Expr, Func, IntoColumnRef, NullOrdering, Query, SimpleExpr,
};
use sea_orm::{
    Condition, ConnectionTrait, EntityName, EntityTrait, JoinType, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::entities::attribute::{self, DataType, TypedValue};
use crate::entities::{attribute_value, product, sku, EntityKind};
use crate::errors::ServiceError;
use crate::query::{FieldPath, FilterOp, Page, PageMeta, Predicate, QueryPlan, SortOrder};

/// Attribute definitions resolved for a plan, keyed by code.
pub type AttributeMap = BTreeMap<String, attribute::Model>;

/// Entities the engine can be pointed at.
///
/// The default impl rejects dotted paths and attribute fields; targets
/// opt in to the paths their schema actually has.
pub trait FilterTarget: EntityTrait {
    /// Owner kind when this entity carries dynamic attribute values.
    fn attribute_owner() -> Option<EntityKind> {
        None
    }

    /// Condition for a one-hop dotted path such as `category.name`.
    fn related_condition(
        relation: &str,
        column: &str,
        op: FilterOp,
        value: &JsonValue,
        active_only: bool,
    ) -> Result<SimpleExpr, ServiceError> {
        let _ = (column, op, value, active_only);
        Err(ServiceError::InvalidFilter(format!(
            "unknown relation '{}'",
            relation
        )))
    }

    /// Join plus sort expression for a one-hop dotted path.
    fn related_sort(
        select: Select<Self>,
        relation: &str,
        column: &str,
    ) -> Result<(Select<Self>, SimpleExpr), ServiceError>
    where
        Self: Sized,
    {
        let _ = (select, column);
        Err(ServiceError::InvalidFilter(format!(
            "cannot sort by relation '{}'",
            relation
        )))
    }
}

/// Resolves a raw name against the entity's native column set.
pub fn resolve_column<E: EntityTrait>(name: &str) -> Option<E::Column> {
    E::Column::from_str(name).ok()
}

/// Table-qualified column expression.
pub(crate) fn qualified_col<E: EntityTrait>(col: E::Column) -> SimpleExpr {
    SimpleExpr::Column((E::default(), col).into_column_ref())
}

/// Names from the plan that are neither native columns nor dotted paths;
/// the caller resolves these as dynamic attribute codes before applying.
pub fn unresolved_names<E: FilterTarget>(plan: &QueryPlan) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut visit = |name: &str, names: &mut Vec<String>| {
        if resolve_column::<E>(name).is_none() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };
    for pred in &plan.predicates {
        if let FieldPath::Name(name) = &pred.path {
            visit(name, &mut names);
        }
    }
    if let Some(sort) = &plan.sort {
        if let FieldPath::Name(name) = &sort.path {
            visit(name, &mut names);
        }
    }
    names
}

/// Builds the filtered, ordered select for a plan.
///
/// `attrs` must contain a definition for every name returned by
/// [`unresolved_names`]; anything missing is an unknown field.
pub fn build_select<E: FilterTarget>(
    plan: &QueryPlan,
    attrs: &AttributeMap,
) -> Result<Select<E>, ServiceError> {
    let mut cond = Condition::all();
    if !plan.include_inactive {
        let col = active_column::<E>()?;
        cond = cond.add(Expr::expr(qualified_col::<E>(col)).eq(true));
    }
    for pred in &plan.predicates {
        cond = cond.add(predicate_expr::<E>(pred, attrs, !plan.include_inactive)?);
    }
    apply_sort(E::find().filter(cond), plan, attrs)
}

/// Runs the count and the page fetch for a plan.
///
/// Both queries run on the connection handed in; callers pass a
/// transaction so total and page come from one consistent snapshot.
pub async fn paginate<E, C>(
    db: &C,
    select: Select<E>,
    plan: &QueryPlan,
) -> Result<Page<E::Model>, ServiceError>
where
    E: EntityTrait,
    E::Model: Send + Sync,
    C: ConnectionTrait,
{
    let paginator = select.paginate(db, plan.limit);
    let total = paginator.num_items().await?;
    let data = paginator.fetch_page(plan.page - 1).await?;
    Ok(Page {
        data,
        meta: PageMeta::new(plan.page, plan.limit, total),
    })
}

fn active_column<E: EntityTrait>() -> Result<E::Column, ServiceError> {
    resolve_column::<E>("is_active").ok_or_else(|| {
        ServiceError::InternalError(format!(
            "entity '{}' has no is_active column",
            E::default().table_name()
        ))
    })
}

fn id_column<E: EntityTrait>() -> Result<E::Column, ServiceError> {
    resolve_column::<E>("id").ok_or_else(|| {
        ServiceError::InternalError(format!(
            "entity '{}' has no id column",
            E::default().table_name()
        ))
    })
}

fn predicate_expr<E: FilterTarget>(
    pred: &Predicate,
    attrs: &AttributeMap,
    active_only: bool,
) -> Result<SimpleExpr, ServiceError> {
    match &pred.path {
        FieldPath::Name(name) => {
            if let Some(col) = resolve_column::<E>(name) {
                native_condition::<E>(col, pred.op, &pred.value)
            } else if let Some(attr) = attrs.get(name) {
                attribute_condition::<E>(attr, pred.op, &pred.value)
            } else {
                Err(ServiceError::InvalidFilter(format!(
                    "unknown field '{}'",
                    name
                )))
            }
        }
        FieldPath::Related { relation, column } => {
            E::related_condition(relation, column, pred.op, &pred.value, active_only)
        }
    }
}

fn native_condition<E: EntityTrait>(
    col: E::Column,
    op: FilterOp,
    value: &JsonValue,
) -> Result<SimpleExpr, ServiceError> {
    let expr = qualified_col::<E>(col);
    match op {
        FilterOp::Like => Ok(ilike(expr, like_operand(value)?)),
        _ => Ok(compare(expr, op, scalar_value(value)?)),
    }
}

/// EAV predicate: `id IN (SELECT entity_id FROM attribute_values WHERE ...)`
/// with the stored payload cast to the attribute's declared type.
fn attribute_condition<E: FilterTarget>(
    attr: &attribute::Model,
    op: FilterOp,
    value: &JsonValue,
) -> Result<SimpleExpr, ServiceError> {
    let kind = E::attribute_owner().ok_or_else(|| {
        ServiceError::InvalidFilter(format!("unknown field '{}'", attr.code))
    })?;

    let value_col = SimpleExpr::Column(
        (attribute_value::Entity, attribute_value::Column::Value).into_column_ref(),
    );
    let cmp = match op {
        FilterOp::Like => ilike(value_col, like_operand(value)?),
        _ => {
            let typed = attr.coerce(value)?;
            compare(eav_value_expr(attr, value_col), op, typed_operand(&typed)?)
        }
    };

    let mut sub = Query::select();
    sub.column(attribute_value::Column::EntityId)
        .from(attribute_value::Entity)
        .and_where(
            Expr::col((attribute_value::Entity, attribute_value::Column::EntityType))
                .eq(kind.to_string()),
        )
        .and_where(
            Expr::col((attribute_value::Entity, attribute_value::Column::AttributeId))
                .eq(attr.id),
        )
        .and_where(
            Expr::col((attribute_value::Entity, attribute_value::Column::IsActive)).eq(true),
        )
        .and_where(cmp);

    let id_col = id_column::<E>()?;
    Ok(Expr::expr(qualified_col::<E>(id_col)).in_subquery(sub.to_owned()))
}

/// Builds a `fk IN (SELECT id FROM related WHERE ...)` condition for a
/// dotted path. Used by the per-entity [`FilterTarget`] impls.
pub(crate) fn related_subquery<R: EntityTrait>(
    owner_fk: SimpleExpr,
    column: &str,
    op: FilterOp,
    value: &JsonValue,
    active_only: bool,
) -> Result<SimpleExpr, ServiceError> {
    let col = resolve_column::<R>(column).ok_or_else(|| {
        ServiceError::InvalidFilter(format!(
            "unknown field '{}.{}'",
            R::default().table_name(),
            column
        ))
    })?;
    let target = qualified_col::<R>(col);
    let cmp = match op {
        FilterOp::Like => ilike(target, like_operand(value)?),
        _ => compare(target, op, scalar_value(value)?),
    };

    let mut sub = Query::select();
    sub.column(id_column::<R>()?).from(R::default()).and_where(cmp);
    if active_only {
        sub.and_where(Expr::expr(qualified_col::<R>(active_column::<R>()?)).eq(true));
    }
    Ok(Expr::expr(owner_fk).in_subquery(sub.to_owned()))
}

fn apply_sort<E: FilterTarget>(
    select: Select<E>,
    plan: &QueryPlan,
    attrs: &AttributeMap,
) -> Result<Select<E>, ServiceError> {
    let id_col = id_column::<E>()?;
    let Some(sort) = &plan.sort else {
        // Stable default: manual ordering key, then id.
        let seq = resolve_column::<E>("sequence").ok_or_else(|| {
            ServiceError::InternalError(format!(
                "entity '{}' has no sequence column",
                E::default().table_name()
            ))
        })?;
        return Ok(select
            .order_by(seq, Order::Asc)
            .order_by(id_col, Order::Asc));
    };

    let ord = match sort.order {
        SortOrder::Asc => Order::Asc,
        SortOrder::Desc => Order::Desc,
    };

    match &sort.path {
        FieldPath::Name(name) => {
            if let Some(col) = resolve_column::<E>(name) {
                Ok(select.order_by(col, ord).order_by(id_col, Order::Asc))
            } else if let Some(attr) = attrs.get(name) {
                attribute_sort(select, attr, ord).map(|s| s.order_by(id_col, Order::Asc))
            } else {
                Err(ServiceError::InvalidFilter(format!(
                    "unknown sort field '{}'",
                    name
                )))
            }
        }
        FieldPath::Related { relation, column } => {
            let (select, expr) = E::related_sort(select, relation, column)?;
            Ok(select
                .order_by_with_nulls(expr, ord, NullOrdering::Last)
                .order_by(id_col, Order::Asc))
        }
    }
}

/// Left-joins the value rows for one attribute and orders by the typed
/// payload; entities missing the value sort last in either direction.
fn attribute_sort<E: FilterTarget>(
    select: Select<E>,
    attr: &attribute::Model,
    ord: Order,
) -> Result<Select<E>, ServiceError> {
    let kind = E::attribute_owner().ok_or_else(|| {
        ServiceError::InvalidFilter(format!("unknown sort field '{}'", attr.code))
    })?;

    let rel: sea_orm::RelationDef = match kind {
        EntityKind::Product => attribute_value::Entity::belongs_to(product::Entity)
            .from(attribute_value::Column::EntityId)
            .to(product::Column::Id)
            .into(),
        EntityKind::Sku => attribute_value::Entity::belongs_to(sku::Entity)
            .from(attribute_value::Column::EntityId)
            .to(sku::Column::Id)
            .into(),
    };

    let attr_id = attr.id;
    let kind_name = kind.to_string();
    let rel = rel.on_condition(move |_left, _right| {
        Condition::all()
            .add(
                Expr::col((attribute_value::Entity, attribute_value::Column::AttributeId))
                    .eq(attr_id),
            )
            .add(
                Expr::col((attribute_value::Entity, attribute_value::Column::EntityType))
                    .eq(kind_name.clone()),
            )
            .add(
                Expr::col((attribute_value::Entity, attribute_value::Column::IsActive)).eq(true),
            )
    });

    let value_col = SimpleExpr::Column(
        (attribute_value::Entity, attribute_value::Column::Value).into_column_ref(),
    );
    let expr = eav_value_expr(attr, value_col);

    Ok(select
        .join_rev(JoinType::LeftJoin, rel)
        .order_by_with_nulls(expr, ord, NullOrdering::Last))
}

/// Comparable expression over the stored payload for one attribute.
/// Numeric types compare through a cast; dates and the rest compare on
/// their canonical lexical form.
fn eav_value_expr(attr: &attribute::Model, value_col: SimpleExpr) -> SimpleExpr {
    match attr.data_type {
        DataType::Integer => Expr::expr(value_col).cast_as(Alias::new("integer")),
        DataType::Decimal => Expr::expr(value_col).cast_as(Alias::new("decimal")),
        _ => value_col,
    }
}

fn typed_operand(typed: &TypedValue) -> Result<sea_orm::Value, ServiceError> {
    Ok(match typed {
        TypedValue::Text(s) | TypedValue::Choice(s) => s.clone().into(),
        TypedValue::Integer(i) => (*i).into(),
        // Comparison is numeric; the stored payload keeps the exact digits.
        TypedValue::Decimal(d) => d
            .to_f64()
            .ok_or_else(|| {
                ServiceError::TypeMismatch(format!("decimal '{}' is out of comparable range", d))
            })?
            .into(),
        TypedValue::Boolean(b) => b.to_string().into(),
        TypedValue::Date(d) => d.format("%Y-%m-%d").to_string().into(),
    })
}

fn like_operand(value: &JsonValue) -> Result<&str, ServiceError> {
    value.as_str().ok_or_else(|| {
        ServiceError::InvalidFilter("'like' requires a string operand".to_string())
    })
}

fn ilike(expr: SimpleExpr, needle: &str) -> SimpleExpr {
    Expr::expr(Func::lower(expr)).like(format!("%{}%", needle.to_lowercase()))
}

fn compare(expr: SimpleExpr, op: FilterOp, rhs: sea_orm::Value) -> SimpleExpr {
    let lhs = Expr::expr(expr);
    match op {
        FilterOp::Eq => lhs.eq(rhs),
        FilterOp::Ne => lhs.ne(rhs),
        FilterOp::Gt => lhs.gt(rhs),
        FilterOp::Gte => lhs.gte(rhs),
        FilterOp::Lt => lhs.lt(rhs),
        FilterOp::Lte => lhs.lte(rhs),
        FilterOp::Like => unreachable!("like is handled before compare"),
    }
}

/// Converts a JSON scalar into a bindable value. UUID- and
/// timestamp-shaped strings bind as their native types so id and
/// timestamp columns compare correctly.
fn scalar_value(value: &JsonValue) -> Result<sea_orm::Value, ServiceError> {
    match value {
        JsonValue::Bool(b) => Ok((*b).into()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.into())
            } else if let Some(f) = n.as_f64() {
                Ok(f.into())
            } else {
                Err(ServiceError::InvalidFilter(format!(
                    "number '{}' is not representable",
                    n
                )))
            }
        }
        JsonValue::String(s) => {
            if let Ok(id) = Uuid::parse_str(s) {
                Ok(id.into())
            } else if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                Ok(ts.with_timezone(&Utc).into())
            } else {
                Ok(s.clone().into())
            }
        }
        _ => Err(ServiceError::InvalidFilter(
            "filter value must be a scalar".to_string(),
        )),
    }
}
