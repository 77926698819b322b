use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auditing::ActorContext;
use crate::config::CatalogConfig;
use crate::db::DbPool;
use crate::entities::attribute::{self, DataType, Entity as Attribute, TypedValue};
use crate::entities::attribute_set::{self, Entity as AttributeSet};
use crate::entities::attribute_set_attribute::{self, Entity as AttributeSetAttribute};
use crate::entities::attribute_value::{self, Entity as AttributeValue};
use crate::entities::category_attribute_set::{self, Entity as CategoryAttributeSet};
use crate::entities::{product, sku, EntityKind};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::query::{engine, ListParams, Page, QueryPlan};
use crate::services::categories;

/// Service owning attribute definitions, attribute sets and their category
/// bindings, plus the typed value store for catalog entities.
pub struct AttributeService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: CatalogConfig,
}

#[derive(Debug, Clone, Validate)]
pub struct CreateAttributeInput {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    pub data_type: DataType,
    #[validate(length(max = 15))]
    pub unit_of_measure: Option<String>,
    /// Allowed values; required for enum attributes, rejected otherwise
    pub choices: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateAttributeInput {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    /// Refused once values exist for the attribute
    pub data_type: Option<DataType>,
    pub unit_of_measure: Option<Option<String>>,
    pub choices: Option<Vec<String>>,
}

#[derive(Debug, Clone, Validate)]
pub struct CreateAttributeSetInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}

impl AttributeService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, catalog: CatalogConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            catalog,
        }
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_attribute(
        &self,
        ctx: &ActorContext,
        input: CreateAttributeInput,
    ) -> Result<attribute::Model, ServiceError> {
        input.validate()?;
        let choices = validate_choices(input.data_type, input.choices.as_deref())?;

        let txn = self.db_pool.begin().await?;
        if Attribute::find()
            .filter(attribute::Column::Code.eq(input.code.as_str()))
            .one(&txn)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "attribute with code '{}' already exists",
                input.code
            )));
        }
        if Attribute::find()
            .filter(attribute::Column::Name.eq(input.name.as_str()))
            .one(&txn)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "attribute named '{}' already exists",
                input.name
            )));
        }

        let (now, actor_id) = ctx.stamp();
        let created = attribute::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            code: Set(input.code),
            data_type: Set(input.data_type),
            unit_of_measure: Set(input.unit_of_measure),
            choices: Set(choices),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor_id),
            updated_by: Set(actor_id),
            is_active: Set(true),
            sequence: Set(next_attribute_sequence(&txn).await?),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(attribute_id = %created.id, code = %created.code, "Attribute created");
        self.event_sender
            .publish(Event::AttributeCreated(created.id))
            .await;
        Ok(created)
    }

    /// Updates an attribute definition. The data type is immutable once any
    /// value rows exist, since a change would invalidate stored payloads.
    #[instrument(skip(self, input))]
    pub async fn update_attribute(
        &self,
        ctx: &ActorContext,
        attribute_id: Uuid,
        input: UpdateAttributeInput,
    ) -> Result<attribute::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        let existing = require_attribute(&txn, attribute_id).await?;

        if let Some(new_type) = input.data_type {
            if new_type != existing.data_type && value_count(&txn, attribute_id).await? > 0 {
                return Err(ServiceError::Conflict(format!(
                    "attribute '{}' has stored values; its data type cannot change",
                    existing.code
                )));
            }
        }
        let target_type = input.data_type.unwrap_or(existing.data_type);
        let choices = match &input.choices {
            Some(list) => validate_choices(target_type, Some(list))?,
            None if input.data_type.is_some() && target_type != DataType::Enum => None,
            None => existing.choices.clone(),
        };
        if target_type == DataType::Enum && choices.is_none() {
            return Err(ServiceError::ValidationError(
                "enum attributes require a non-empty choice list".to_string(),
            ));
        }

        if let Some(name) = &input.name {
            if name != &existing.name
                && Attribute::find()
                    .filter(attribute::Column::Name.eq(name.as_str()))
                    .filter(attribute::Column::Id.ne(attribute_id))
                    .one(&txn)
                    .await?
                    .is_some()
            {
                return Err(ServiceError::Conflict(format!(
                    "attribute named '{}' already exists",
                    name
                )));
            }
        }

        let (now, actor_id) = ctx.stamp();
        let mut model: attribute::ActiveModel = existing.into();
        if let Some(name) = input.name {
            model.name = Set(name);
        }
        if let Some(data_type) = input.data_type {
            model.data_type = Set(data_type);
        }
        if let Some(unit) = input.unit_of_measure {
            model.unit_of_measure = Set(unit);
        }
        model.choices = Set(choices);
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let updated = model.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::AttributeUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Soft-deletes an attribute definition; refused while value rows exist.
    #[instrument(skip(self))]
    pub async fn delete_attribute(
        &self,
        ctx: &ActorContext,
        attribute_id: Uuid,
    ) -> Result<attribute::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let existing = require_attribute(&txn, attribute_id).await?;
        if value_count(&txn, attribute_id).await? > 0 {
            return Err(ServiceError::Conflict(format!(
                "attribute '{}' has stored values and cannot be deleted",
                existing.code
            )));
        }

        let (now, actor_id) = ctx.stamp();
        let mut model: attribute::ActiveModel = existing.into();
        model.is_active = Set(false);
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let deleted = model.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::AttributeDeleted(deleted.id))
            .await;
        Ok(deleted)
    }

    pub async fn get_attribute_by_code(
        &self,
        code: &str,
    ) -> Result<attribute::Model, ServiceError> {
        Attribute::find()
            .filter(attribute::Column::Code.eq(code))
            .filter(attribute::Column::IsActive.eq(true))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Attribute", code))
    }

    #[instrument(skip(self, params))]
    pub async fn list_attributes(
        &self,
        params: &ListParams,
        include_inactive: bool,
    ) -> Result<Page<attribute::Model>, ServiceError> {
        let mut plan = QueryPlan::parse(params, &self.catalog)?;
        if include_inactive {
            plan = plan.with_inactive();
        }
        if let Some(name) = engine::unresolved_names::<Attribute>(&plan).first() {
            return Err(ServiceError::InvalidFilter(format!(
                "unknown field '{}'",
                name
            )));
        }
        let select = engine::build_select::<Attribute>(&plan, &Default::default())?;
        let txn = self.db_pool.begin().await?;
        let page = engine::paginate(&txn, select, &plan).await?;
        txn.commit().await?;
        Ok(page)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_attribute_set(
        &self,
        ctx: &ActorContext,
        input: CreateAttributeSetInput,
    ) -> Result<attribute_set::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        if AttributeSet::find()
            .filter(attribute_set::Column::Name.eq(input.name.as_str()))
            .one(&txn)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "attribute set named '{}' already exists",
                input.name
            )));
        }

        let (now, actor_id) = ctx.stamp();
        let created = attribute_set::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor_id),
            updated_by: Set(actor_id),
            is_active: Set(true),
            sequence: Set(AttributeSet::find().count(&txn).await? as i32 + 1),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::AttributeSetCreated(created.id))
            .await;
        Ok(created)
    }

    /// Adds an attribute definition to a set; the pair is unique.
    #[instrument(skip(self))]
    pub async fn add_attribute_to_set(
        &self,
        ctx: &ActorContext,
        attribute_set_id: Uuid,
        attribute_id: Uuid,
    ) -> Result<attribute_set_attribute::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        require_set(&txn, attribute_set_id).await?;
        require_attribute(&txn, attribute_id).await?;

        let existing = AttributeSetAttribute::find()
            .filter(attribute_set_attribute::Column::AttributeSetId.eq(attribute_set_id))
            .filter(attribute_set_attribute::Column::AttributeId.eq(attribute_id))
            .one(&txn)
            .await?;
        if let Some(row) = existing {
            if row.is_active {
                return Err(ServiceError::Conflict(
                    "attribute is already part of this set".to_string(),
                ));
            }
            let (now, actor_id) = ctx.stamp();
            let mut model: attribute_set_attribute::ActiveModel = row.into();
            model.is_active = Set(true);
            model.updated_at = Set(now);
            model.updated_by = Set(actor_id);
            let restored = model.update(&txn).await?;
            txn.commit().await?;
            return Ok(restored);
        }

        let (now, actor_id) = ctx.stamp();
        let created = attribute_set_attribute::ActiveModel {
            id: Set(Uuid::new_v4()),
            attribute_set_id: Set(attribute_set_id),
            attribute_id: Set(attribute_id),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor_id),
            updated_by: Set(actor_id),
            is_active: Set(true),
            sequence: Set(next_in_set_sequence(&txn, attribute_set_id).await?),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;
        Ok(created)
    }

    /// Binds an attribute set to a category; the pair is unique.
    #[instrument(skip(self))]
    pub async fn bind_set_to_category(
        &self,
        ctx: &ActorContext,
        category_id: Uuid,
        attribute_set_id: Uuid,
    ) -> Result<category_attribute_set::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        categories::require(&txn, category_id).await?;
        require_set(&txn, attribute_set_id).await?;

        let existing = CategoryAttributeSet::find()
            .filter(category_attribute_set::Column::CategoryId.eq(category_id))
            .filter(category_attribute_set::Column::AttributeSetId.eq(attribute_set_id))
            .one(&txn)
            .await?;
        if let Some(row) = existing {
            if row.is_active {
                return Err(ServiceError::Conflict(
                    "attribute set is already bound to this category".to_string(),
                ));
            }
            let (now, actor_id) = ctx.stamp();
            let mut model: category_attribute_set::ActiveModel = row.into();
            model.is_active = Set(true);
            model.updated_at = Set(now);
            model.updated_by = Set(actor_id);
            let restored = model.update(&txn).await?;
            txn.commit().await?;
            return Ok(restored);
        }

        let (now, actor_id) = ctx.stamp();
        let created = category_attribute_set::ActiveModel {
            id: Set(Uuid::new_v4()),
            category_id: Set(category_id),
            attribute_set_id: Set(attribute_set_id),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor_id),
            updated_by: Set(actor_id),
            is_active: Set(true),
            sequence: Set(1),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;
        Ok(created)
    }

    /// Union of attribute definitions expected for entities under the
    /// category: every set bound to it and, when inheritance is on, to any
    /// of its ancestors.
    pub async fn effective_attributes(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<attribute::Model>, ServiceError> {
        effective_attributes_for(&*self.db_pool, &self.catalog, category_id).await
    }

    /// Stores (or replaces) the typed value of one attribute for one
    /// entity: coerce, schema-check, then upsert, in one transaction.
    #[instrument(skip(self, raw))]
    pub async fn set_value(
        &self,
        ctx: &ActorContext,
        entity_type: EntityKind,
        entity_id: Uuid,
        attribute_code: &str,
        raw: &JsonValue,
    ) -> Result<attribute_value::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let attr = Attribute::find()
            .filter(attribute::Column::Code.eq(attribute_code))
            .filter(attribute::Column::IsActive.eq(true))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Attribute", attribute_code))?;

        let category_id = owner_category(&txn, entity_type, entity_id).await?;
        if !self.catalog.allow_adhoc_attributes {
            let effective = effective_attributes_for(&txn, &self.catalog, category_id).await?;
            if !effective.iter().any(|a| a.id == attr.id) {
                return Err(ServiceError::SchemaViolation(format!(
                    "attribute '{}' is not part of the effective schema for this entity",
                    attr.code
                )));
            }
        }

        let typed = attr.coerce(raw)?;
        let stored = upsert_value(&txn, ctx, entity_type, entity_id, &attr, &typed).await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::AttributeValueSet {
                entity_type,
                entity_id,
                attribute_id: attr.id,
            })
            .await;
        Ok(stored)
    }

    /// Current typed values of an entity, keyed by attribute code.
    pub async fn get_values(
        &self,
        entity_type: EntityKind,
        entity_id: Uuid,
    ) -> Result<BTreeMap<String, TypedValue>, ServiceError> {
        let db = &*self.db_pool;
        owner_category(db, entity_type, entity_id).await?;
        fetch_values(db, entity_type, entity_id).await
    }
}

/// Reads and coerces every active value row of an entity.
pub(crate) async fn fetch_values<C: ConnectionTrait>(
    db: &C,
    entity_type: EntityKind,
    entity_id: Uuid,
) -> Result<BTreeMap<String, TypedValue>, ServiceError> {
    let rows = AttributeValue::find()
        .filter(attribute_value::Column::EntityType.eq(entity_type))
        .filter(attribute_value::Column::EntityId.eq(entity_id))
        .filter(attribute_value::Column::IsActive.eq(true))
        .find_also_related(Attribute)
        .all(db)
        .await?;

    let mut values = BTreeMap::new();
    for (row, attr) in rows {
        let attr = attr.ok_or_else(|| {
            ServiceError::InternalError(format!(
                "attribute value {} references a missing attribute",
                row.id
            ))
        })?;
        values.insert(attr.code.clone(), attr.coerce_str(&row.value)?);
    }
    Ok(values)
}

fn validate_choices(
    data_type: DataType,
    choices: Option<&[String]>,
) -> Result<Option<JsonValue>, ServiceError> {
    match (data_type, choices) {
        (DataType::Enum, Some(list)) if !list.is_empty() => Ok(Some(JsonValue::from(
            list.iter().map(|c| JsonValue::from(c.as_str())).collect::<Vec<_>>(),
        ))),
        (DataType::Enum, _) => Err(ServiceError::ValidationError(
            "enum attributes require a non-empty choice list".to_string(),
        )),
        (_, None) => Ok(None),
        (_, Some(_)) => Err(ServiceError::ValidationError(format!(
            "choices are only valid for enum attributes, not {}",
            data_type
        ))),
    }
}

pub(crate) async fn require_attribute<C: ConnectionTrait>(
    db: &C,
    attribute_id: Uuid,
) -> Result<attribute::Model, ServiceError> {
    Attribute::find_by_id(attribute_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Attribute", attribute_id))
}

async fn require_set<C: ConnectionTrait>(
    db: &C,
    attribute_set_id: Uuid,
) -> Result<attribute_set::Model, ServiceError> {
    AttributeSet::find_by_id(attribute_set_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("AttributeSet", attribute_set_id))
}

async fn value_count<C: ConnectionTrait>(db: &C, attribute_id: Uuid) -> Result<u64, ServiceError> {
    Ok(AttributeValue::find()
        .filter(attribute_value::Column::AttributeId.eq(attribute_id))
        .filter(attribute_value::Column::IsActive.eq(true))
        .count(db)
        .await?)
}

async fn next_attribute_sequence<C: ConnectionTrait>(db: &C) -> Result<i32, ServiceError> {
    Ok(Attribute::find().count(db).await? as i32 + 1)
}

async fn next_in_set_sequence<C: ConnectionTrait>(
    db: &C,
    attribute_set_id: Uuid,
) -> Result<i32, ServiceError> {
    Ok(AttributeSetAttribute::find()
        .filter(attribute_set_attribute::Column::AttributeSetId.eq(attribute_set_id))
        .count(db)
        .await? as i32
        + 1)
}

/// Category whose effective schema governs the entity, validating the
/// entity exists on the way.
pub(crate) async fn owner_category<C: ConnectionTrait>(
    db: &C,
    entity_type: EntityKind,
    entity_id: Uuid,
) -> Result<Uuid, ServiceError> {
    match entity_type {
        EntityKind::Product => {
            let found = product::Entity::find_by_id(entity_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Product", entity_id))?;
            Ok(found.category_id)
        }
        EntityKind::Sku => {
            let found = sku::Entity::find_by_id(entity_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Sku", entity_id))?;
            let parent = product::Entity::find_by_id(found.product_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Product", found.product_id))?;
            Ok(parent.category_id)
        }
    }
}

/// Union of the attribute definitions in every set bound to the category
/// (and its ancestors when inheritance is configured), deduplicated and
/// ordered by code.
pub(crate) async fn effective_attributes_for<C: ConnectionTrait>(
    db: &C,
    catalog: &CatalogConfig,
    category_id: Uuid,
) -> Result<Vec<attribute::Model>, ServiceError> {
    let category = categories::require(db, category_id).await?;
    let scope_ids: Vec<Uuid> = if catalog.inherit_attribute_sets {
        categories::ancestor_path(db, &category)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect()
    } else {
        vec![category_id]
    };

    let bindings = CategoryAttributeSet::find()
        .filter(category_attribute_set::Column::CategoryId.is_in(scope_ids))
        .filter(category_attribute_set::Column::IsActive.eq(true))
        .all(db)
        .await?;
    if bindings.is_empty() {
        return Ok(Vec::new());
    }
    let set_ids: Vec<Uuid> = bindings.into_iter().map(|b| b.attribute_set_id).collect();

    let active_sets: Vec<Uuid> = AttributeSet::find()
        .filter(attribute_set::Column::Id.is_in(set_ids))
        .filter(attribute_set::Column::IsActive.eq(true))
        .all(db)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    if active_sets.is_empty() {
        return Ok(Vec::new());
    }

    let member_ids: Vec<Uuid> = AttributeSetAttribute::find()
        .filter(attribute_set_attribute::Column::AttributeSetId.is_in(active_sets))
        .filter(attribute_set_attribute::Column::IsActive.eq(true))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.attribute_id)
        .collect();
    if member_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut attributes = Attribute::find()
        .filter(attribute::Column::Id.is_in(member_ids))
        .filter(attribute::Column::IsActive.eq(true))
        .all(db)
        .await?;
    attributes.sort_by(|a, b| a.code.cmp(&b.code));
    attributes.dedup_by(|a, b| a.id == b.id);
    Ok(attributes)
}

/// Replaces or inserts the single value row for (entity, attribute) and
/// re-stamps provenance. Never creates a second row for the pair.
pub(crate) async fn upsert_value<C: ConnectionTrait>(
    db: &C,
    ctx: &ActorContext,
    entity_type: EntityKind,
    entity_id: Uuid,
    attr: &attribute::Model,
    typed: &TypedValue,
) -> Result<attribute_value::Model, ServiceError> {
    let existing = AttributeValue::find()
        .filter(attribute_value::Column::EntityType.eq(entity_type))
        .filter(attribute_value::Column::EntityId.eq(entity_id))
        .filter(attribute_value::Column::AttributeId.eq(attr.id))
        .one(db)
        .await?;

    let (now, actor_id) = ctx.stamp();
    match existing {
        Some(row) => {
            let mut model: attribute_value::ActiveModel = row.into();
            model.value = Set(typed.storage_value());
            model.is_active = Set(true);
            model.updated_at = Set(now);
            model.updated_by = Set(actor_id);
            Ok(model.update(db).await?)
        }
        None => {
            let sequence = AttributeValue::find()
                .filter(attribute_value::Column::EntityType.eq(entity_type))
                .filter(attribute_value::Column::EntityId.eq(entity_id))
                .count(db)
                .await? as i32
                + 1;
            Ok(attribute_value::ActiveModel {
                id: Set(Uuid::new_v4()),
                entity_type: Set(entity_type),
                entity_id: Set(entity_id),
                attribute_id: Set(attr.id),
                value: Set(typed.storage_value()),
                created_at: Set(now),
                updated_at: Set(now),
                created_by: Set(actor_id),
                updated_by: Set(actor_id),
                is_active: Set(true),
                sequence: Set(sequence),
            }
            .insert(db)
            .await?)
        }
    }
}
