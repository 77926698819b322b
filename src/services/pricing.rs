use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auditing::ActorContext;
use crate::config::CatalogConfig;
use crate::db::DbPool;
use crate::entities::price_detail::{self, Entity as PriceDetail};
use crate::entities::pricelist::{self, Entity as Pricelist};
use crate::entities::sku;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::query::{engine, ListParams, Page, QueryPlan};
use crate::services::skus::PriceTierInput;

/// Service for pricelists, price tiers and quantity-based resolution.
pub struct PricingService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: CatalogConfig,
}

#[derive(Debug, Clone, Validate)]
pub struct CreatePricelistInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct AddPriceDetailInput {
    pub sku_id: Uuid,
    pub pricelist_id: Uuid,
    pub minimum_quantity: i32,
    pub price: Decimal,
}

impl PricingService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, catalog: CatalogConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            catalog,
        }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_pricelist(
        &self,
        ctx: &ActorContext,
        input: CreatePricelistInput,
    ) -> Result<pricelist::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        if Pricelist::find()
            .filter(pricelist::Column::Name.eq(input.name.as_str()))
            .one(&txn)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "pricelist named '{}' already exists",
                input.name
            )));
        }

        let (now, actor_id) = ctx.stamp();
        let created = pricelist::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            currency: Set(input.currency.to_uppercase()),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor_id),
            updated_by: Set(actor_id),
            is_active: Set(true),
            sequence: Set(Pricelist::find().count(&txn).await? as i32 + 1),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::PricelistCreated(created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, params))]
    pub async fn list_pricelists(
        &self,
        params: &ListParams,
        include_inactive: bool,
    ) -> Result<Page<pricelist::Model>, ServiceError> {
        let mut plan = QueryPlan::parse(params, &self.catalog)?;
        if include_inactive {
            plan = plan.with_inactive();
        }
        if let Some(name) = engine::unresolved_names::<Pricelist>(&plan).first() {
            return Err(ServiceError::InvalidFilter(format!(
                "unknown field '{}'",
                name
            )));
        }
        let select = engine::build_select::<Pricelist>(&plan, &Default::default())?;
        let txn = self.db_pool.begin().await?;
        let page = engine::paginate(&txn, select, &plan).await?;
        txn.commit().await?;
        Ok(page)
    }

    /// Adds a price tier for a (SKU, pricelist) pair. A tier with the same
    /// minimum quantity already present is a conflict, active or not.
    #[instrument(skip(self, input), fields(sku_id = %input.sku_id, pricelist_id = %input.pricelist_id))]
    pub async fn add_price_detail(
        &self,
        ctx: &ActorContext,
        input: AddPriceDetailInput,
    ) -> Result<price_detail::Model, ServiceError> {
        if input.minimum_quantity < 1 {
            return Err(ServiceError::ValidationError(
                "minimum quantity must be greater than zero".to_string(),
            ));
        }
        if input.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price must be greater than zero".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await?;
        sku::Entity::find_by_id(input.sku_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sku", input.sku_id))?;
        Pricelist::find_by_id(input.pricelist_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Pricelist", input.pricelist_id))?;

        let duplicate = PriceDetail::find()
            .filter(price_detail::Column::SkuId.eq(input.sku_id))
            .filter(price_detail::Column::PricelistId.eq(input.pricelist_id))
            .filter(price_detail::Column::MinimumQuantity.eq(input.minimum_quantity))
            .one(&txn)
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::Conflict(format!(
                "a price tier with minimum quantity {} already exists for this SKU and pricelist",
                input.minimum_quantity
            )));
        }

        let tier = PriceTierInput {
            pricelist_id: input.pricelist_id,
            minimum_quantity: input.minimum_quantity,
            price: input.price,
        };
        let created = insert_tier(&txn, ctx, input.sku_id, &tier).await?;
        txn.commit().await?;

        info!(price_detail_id = %created.id, "Price tier added");
        self.event_sender
            .publish(Event::PriceDetailAdded {
                sku_id: created.sku_id,
                pricelist_id: created.pricelist_id,
                minimum_quantity: created.minimum_quantity,
            })
            .await;
        Ok(created)
    }

    /// Soft-deletes one price tier.
    #[instrument(skip(self))]
    pub async fn remove_price_detail(
        &self,
        ctx: &ActorContext,
        price_detail_id: Uuid,
    ) -> Result<price_detail::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let existing = PriceDetail::find_by_id(price_detail_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("PriceDetail", price_detail_id))?;

        let (now, actor_id) = ctx.stamp();
        let mut model: price_detail::ActiveModel = existing.into();
        model.is_active = Set(false);
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let deleted = model.update(&txn).await?;
        txn.commit().await?;
        Ok(deleted)
    }

    /// Active tiers of a (SKU, pricelist) pair, ordered by threshold.
    pub async fn list_price_details(
        &self,
        sku_id: Uuid,
        pricelist_id: Uuid,
    ) -> Result<Vec<price_detail::Model>, ServiceError> {
        Ok(PriceDetail::find()
            .filter(price_detail::Column::SkuId.eq(sku_id))
            .filter(price_detail::Column::PricelistId.eq(pricelist_id))
            .filter(price_detail::Column::IsActive.eq(true))
            .order_by(price_detail::Column::MinimumQuantity, Order::Asc)
            .all(&*self.db_pool)
            .await?)
    }

    /// Resolves the applicable price tier: the largest minimum quantity not
    /// exceeding the requested one. No qualifying tier is NotFound; callers
    /// decide fallback policy.
    #[instrument(skip(self))]
    pub async fn resolve_price(
        &self,
        sku_id: Uuid,
        pricelist_id: Uuid,
        quantity: i32,
    ) -> Result<price_detail::Model, ServiceError> {
        resolve_tier(&*self.db_pool, sku_id, pricelist_id, quantity).await
    }
}

/// Tier selection shared with the SKU service.
pub(crate) async fn resolve_tier<C: ConnectionTrait>(
    db: &C,
    sku_id: Uuid,
    pricelist_id: Uuid,
    quantity: i32,
) -> Result<price_detail::Model, ServiceError> {
    PriceDetail::find()
        .filter(price_detail::Column::SkuId.eq(sku_id))
        .filter(price_detail::Column::PricelistId.eq(pricelist_id))
        .filter(price_detail::Column::IsActive.eq(true))
        .filter(price_detail::Column::MinimumQuantity.lte(quantity))
        .order_by(price_detail::Column::MinimumQuantity, Order::Desc)
        .one(db)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no price tier for sku {} in pricelist {} at quantity {}",
                sku_id, pricelist_id, quantity
            ))
        })
}

/// Inserts one tier row with provenance stamps. Uniqueness of the
/// threshold is the caller's check.
pub(crate) async fn insert_tier<C: ConnectionTrait>(
    db: &C,
    ctx: &ActorContext,
    sku_id: Uuid,
    tier: &PriceTierInput,
) -> Result<price_detail::Model, ServiceError> {
    let sequence = PriceDetail::find()
        .filter(price_detail::Column::SkuId.eq(sku_id))
        .filter(price_detail::Column::PricelistId.eq(tier.pricelist_id))
        .count(db)
        .await? as i32;

    let (now, actor_id) = ctx.stamp();
    Ok(price_detail::ActiveModel {
        id: Set(Uuid::new_v4()),
        sku_id: Set(sku_id),
        pricelist_id: Set(tier.pricelist_id),
        minimum_quantity: Set(tier.minimum_quantity),
        price: Set(tier.price),
        created_at: Set(now),
        updated_at: Set(now),
        created_by: Set(actor_id),
        updated_by: Set(actor_id),
        is_active: Set(true),
        sequence: Set(sequence + 1),
    }
    .insert(db)
    .await?)
}
