use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use std::collections::{HashSet, BTreeMap};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auditing::ActorContext;
use crate::config::CatalogConfig;
use crate::db::DbPool;
use crate::entities::attribute::TypedValue;
use crate::entities::price_detail;
use crate::entities::sku::{self, generate_sku_number, is_valid_sku_number, Entity as Sku};
use crate::entities::{pricelist, product, EntityKind};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::query::{engine, ListParams, Page, QueryPlan};
use crate::services::{attributes, categories, pricing, products};

/// Service for managing SKUs: the priceable, attributable unit.
pub struct SkuService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: CatalogConfig,
}

#[derive(Debug, Clone)]
pub struct PriceTierInput {
    pub pricelist_id: Uuid,
    pub minimum_quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct AttributeValueInput {
    pub code: String,
    pub value: JsonValue,
}

#[derive(Debug, Clone, Validate)]
pub struct CreateSkuInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    pub product_id: Uuid,
    /// Generated when absent; must be 10 uppercase hex chars when given
    pub sku_number: Option<String>,
    /// Pins the slug instead of deriving it from the name
    pub slug: Option<String>,
    /// Initial price tiers, created with the SKU
    pub price_details: Vec<PriceTierInput>,
    /// Initial attribute values, validated against the effective schema
    pub attribute_values: Vec<AttributeValueInput>,
}

#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateSkuInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub slug: Option<String>,
}

impl SkuService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, catalog: CatalogConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            catalog,
        }
    }

    pub async fn get_sku(&self, sku_id: Uuid) -> Result<sku::Model, ServiceError> {
        Sku::find_by_id(sku_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sku", sku_id))
    }

    /// Creates a SKU together with its initial price tiers and attribute
    /// values, all in one transaction.
    #[instrument(skip(self, input), fields(name = %input.name, product_id = %input.product_id))]
    pub async fn create_sku(
        &self,
        ctx: &ActorContext,
        input: CreateSkuInput,
    ) -> Result<sku::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        let parent = product::Entity::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", input.product_id))?;
        if !parent.is_active {
            return Err(ServiceError::ValidationError(
                "cannot create a SKU under a soft-deleted product".to_string(),
            ));
        }

        let sku_number = match &input.sku_number {
            Some(given) => {
                if !is_valid_sku_number(given) {
                    return Err(ServiceError::ValidationError(format!(
                        "SKU number '{}' must be exactly 10 characters of 0-9 or A-F",
                        given
                    )));
                }
                if sku_number_taken(&txn, given).await? {
                    return Err(ServiceError::Conflict(format!(
                        "SKU number '{}' already exists",
                        given
                    )));
                }
                given.clone()
            }
            None => {
                let mut candidate = generate_sku_number();
                while sku_number_taken(&txn, &candidate).await? {
                    candidate = generate_sku_number();
                }
                candidate
            }
        };

        let slug = match &input.slug {
            Some(pinned) => {
                if sku_slug_taken(&txn, pinned, None).await? {
                    return Err(ServiceError::Conflict(format!(
                        "SKU slug '{}' already exists",
                        pinned
                    )));
                }
                pinned.clone()
            }
            None => derive_sku_slug(&txn, &input.name, None).await?,
        };

        let (now, actor_id) = ctx.stamp();
        let created = sku::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.clone()),
            slug: Set(slug),
            description: Set(input.description.clone()),
            sku_number: Set(sku_number),
            product_id: Set(input.product_id),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor_id),
            updated_by: Set(actor_id),
            is_active: Set(true),
            sequence: Set(next_sequence_in_product(&txn, input.product_id).await?),
        }
        .insert(&txn)
        .await?;

        // Initial price tiers: thresholds must be unique per pricelist.
        let mut seen: HashSet<(Uuid, i32)> = HashSet::new();
        for tier in &input.price_details {
            if !seen.insert((tier.pricelist_id, tier.minimum_quantity)) {
                return Err(ServiceError::Conflict(format!(
                    "duplicate minimum quantity {} for pricelist {}",
                    tier.minimum_quantity, tier.pricelist_id
                )));
            }
            pricelist::Entity::find_by_id(tier.pricelist_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Pricelist", tier.pricelist_id))?;
            pricing::insert_tier(&txn, ctx, created.id, tier).await?;
        }

        // Initial attribute values, checked against the effective schema of
        // the product's category.
        if !input.attribute_values.is_empty() {
            let effective =
                attributes::effective_attributes_for(&txn, &self.catalog, parent.category_id)
                    .await?;
            for value in &input.attribute_values {
                let attr = effective
                    .iter()
                    .find(|a| a.code == value.code)
                    .cloned();
                let attr = match attr {
                    Some(attr) => attr,
                    None if self.catalog.allow_adhoc_attributes => {
                        lookup_attribute(&txn, &value.code).await?
                    }
                    None => {
                        return Err(ServiceError::SchemaViolation(format!(
                            "attribute '{}' is not part of the effective schema for this entity",
                            value.code
                        )))
                    }
                };
                let typed = attr.coerce(&value.value)?;
                attributes::upsert_value(&txn, ctx, EntityKind::Sku, created.id, &attr, &typed)
                    .await?;
            }
        }

        txn.commit().await?;

        info!(sku_id = %created.id, sku_number = %created.sku_number, "SKU created");
        self.event_sender.publish(Event::SkuCreated(created.id)).await;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_sku(
        &self,
        ctx: &ActorContext,
        sku_id: Uuid,
        input: UpdateSkuInput,
    ) -> Result<sku::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        let existing = Sku::find_by_id(sku_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sku", sku_id))?;

        let renamed = input
            .name
            .as_ref()
            .map(|n| n != &existing.name)
            .unwrap_or(false);
        let slug = match (&input.slug, renamed) {
            (Some(pinned), _) => {
                if sku_slug_taken(&txn, pinned, Some(sku_id)).await? {
                    return Err(ServiceError::Conflict(format!(
                        "SKU slug '{}' already exists",
                        pinned
                    )));
                }
                Some(pinned.clone())
            }
            (None, true) => {
                Some(derive_sku_slug(&txn, input.name.as_ref().unwrap(), Some(sku_id)).await?)
            }
            (None, false) => None,
        };

        let (now, actor_id) = ctx.stamp();
        let mut model: sku::ActiveModel = existing.into();
        if let Some(name) = input.name {
            model.name = Set(name);
        }
        if let Some(description) = input.description {
            model.description = Set(description);
        }
        if let Some(slug) = slug {
            model.slug = Set(slug);
        }
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let updated = model.update(&txn).await?;
        txn.commit().await?;

        self.event_sender.publish(Event::SkuUpdated(updated.id)).await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_sku(
        &self,
        ctx: &ActorContext,
        sku_id: Uuid,
    ) -> Result<sku::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let existing = Sku::find_by_id(sku_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sku", sku_id))?;

        let (now, actor_id) = ctx.stamp();
        let mut model: sku::ActiveModel = existing.into();
        model.is_active = Set(false);
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let deleted = model.update(&txn).await?;
        txn.commit().await?;

        self.event_sender.publish(Event::SkuDeleted(deleted.id)).await;
        Ok(deleted)
    }

    /// Lists SKUs through the generic filter engine, including dynamic
    /// attribute predicates and sorts.
    #[instrument(skip(self, params))]
    pub async fn list_skus(
        &self,
        params: &ListParams,
        include_inactive: bool,
    ) -> Result<Page<sku::Model>, ServiceError> {
        let mut plan = QueryPlan::parse(params, &self.catalog)?;
        if include_inactive {
            plan = plan.with_inactive();
        }
        let txn = self.db_pool.begin().await?;
        let attrs = products::resolve_plan_attributes::<Sku>(&txn, &plan).await?;
        let select = engine::build_select::<Sku>(&plan, &attrs)?;
        let page = engine::paginate(&txn, select, &plan).await?;
        txn.commit().await?;
        Ok(page)
    }

    /// SKUs of one product, in manual order.
    pub async fn list_for_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<sku::Model>, ServiceError> {
        let db = &*self.db_pool;
        product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
        Ok(Sku::find()
            .filter(sku::Column::ProductId.eq(product_id))
            .filter(sku::Column::IsActive.eq(true))
            .order_by(sku::Column::Sequence, Order::Asc)
            .all(db)
            .await?)
    }

    /// A SKU together with the price tier resolved for the requested
    /// pricelist and quantity.
    pub async fn get_with_price(
        &self,
        sku_id: Uuid,
        pricelist_id: Uuid,
        quantity: i32,
    ) -> Result<(sku::Model, price_detail::Model), ServiceError> {
        let db = &*self.db_pool;
        let found = Sku::find_by_id(sku_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sku", sku_id))?;
        let tier = pricing::resolve_tier(db, sku_id, pricelist_id, quantity).await?;
        Ok((found, tier))
    }

    /// Current attribute values of a SKU, keyed by code.
    pub async fn get_attribute_values(
        &self,
        sku_id: Uuid,
    ) -> Result<BTreeMap<String, TypedValue>, ServiceError> {
        let db = &*self.db_pool;
        attributes::owner_category(db, EntityKind::Sku, sku_id).await?;
        attributes::fetch_values(db, EntityKind::Sku, sku_id).await
    }
}

async fn lookup_attribute<C: ConnectionTrait>(
    db: &C,
    code: &str,
) -> Result<crate::entities::attribute::Model, ServiceError> {
    use crate::entities::attribute::{self, Entity as Attribute};
    Attribute::find()
        .filter(attribute::Column::Code.eq(code))
        .filter(attribute::Column::IsActive.eq(true))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Attribute", code))
}

async fn sku_number_taken<C: ConnectionTrait>(db: &C, value: &str) -> Result<bool, ServiceError> {
    Ok(Sku::find()
        .filter(sku::Column::SkuNumber.eq(value))
        .one(db)
        .await?
        .is_some())
}

async fn sku_slug_taken<C: ConnectionTrait>(
    db: &C,
    slug: &str,
    exclude: Option<Uuid>,
) -> Result<bool, ServiceError> {
    let mut query = Sku::find().filter(sku::Column::Slug.eq(slug));
    if let Some(id) = exclude {
        query = query.filter(sku::Column::Id.ne(id));
    }
    Ok(query.one(db).await?.is_some())
}

async fn derive_sku_slug<C: ConnectionTrait>(
    db: &C,
    name: &str,
    exclude: Option<Uuid>,
) -> Result<String, ServiceError> {
    let base = categories::slugify(name);
    if base.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "name '{}' contains no sluggable characters",
            name
        )));
    }
    if !sku_slug_taken(db, &base, exclude).await? {
        return Ok(base);
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !sku_slug_taken(db, &candidate, exclude).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

async fn next_sequence_in_product<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
) -> Result<i32, ServiceError> {
    let last = Sku::find()
        .filter(sku::Column::ProductId.eq(product_id))
        .order_by(sku::Column::Sequence, Order::Desc)
        .one(db)
        .await?;
    Ok(last.map(|s| s.sequence + 1).unwrap_or(1))
}
