use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auditing::ActorContext;
use crate::config::CatalogConfig;
use crate::db::DbPool;
use crate::entities::image::{self, Entity as Image};
use crate::entities::product::{self, Entity as Product};
use crate::entities::{supplier, EntityKind};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::query::engine::AttributeMap;
use crate::query::{engine, ListParams, Page, QueryPlan};
use crate::services::{attributes, categories};

/// Service for managing products and their polymorphic image attachments.
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: CatalogConfig,
}

#[derive(Debug, Clone, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub category_id: Uuid,
    pub supplier_id: Option<Uuid>,
    /// Pins the slug instead of deriving it from the name
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<Option<String>>,
    pub category_id: Option<Uuid>,
    pub supplier_id: Option<Option<Uuid>>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct AttachImageInput {
    #[validate(url)]
    pub url: String,
    pub alt_text: Option<String>,
    pub is_primary: bool,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, catalog: CatalogConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            catalog,
        }
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        ctx: &ActorContext,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        let category = categories::require(&txn, input.category_id).await?;
        if !category.is_active {
            return Err(ServiceError::ValidationError(
                "cannot create a product under a soft-deleted category".to_string(),
            ));
        }
        if let Some(supplier_id) = input.supplier_id {
            supplier::Entity::find_by_id(supplier_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Supplier", supplier_id))?;
        }

        let slug = match &input.slug {
            Some(pinned) => {
                ensure_product_slug_free(&txn, pinned, None).await?;
                pinned.clone()
            }
            None => derive_product_slug(&txn, &input.name, None).await?,
        };

        let (now, actor_id) = ctx.stamp();
        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            slug: Set(slug),
            description: Set(input.description),
            category_id: Set(input.category_id),
            supplier_id: Set(input.supplier_id),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor_id),
            updated_by: Set(actor_id),
            is_active: Set(true),
            sequence: Set(next_sequence_in_category(&txn, input.category_id).await?),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(product_id = %created.id, slug = %created.slug, "Product created");
        self.event_sender
            .publish(Event::ProductCreated(created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        ctx: &ActorContext,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        let existing = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        if let Some(category_id) = input.category_id {
            categories::require(&txn, category_id).await?;
        }
        if let Some(Some(supplier_id)) = input.supplier_id {
            supplier::Entity::find_by_id(supplier_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Supplier", supplier_id))?;
        }

        let renamed = input
            .name
            .as_ref()
            .map(|n| n != &existing.name)
            .unwrap_or(false);
        let slug = match (&input.slug, renamed) {
            (Some(pinned), _) => {
                ensure_product_slug_free(&txn, pinned, Some(product_id)).await?;
                Some(pinned.clone())
            }
            (None, true) => {
                Some(derive_product_slug(&txn, input.name.as_ref().unwrap(), Some(product_id)).await?)
            }
            (None, false) => None,
        };

        let (now, actor_id) = ctx.stamp();
        let mut model: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            model.name = Set(name);
        }
        if let Some(description) = input.description {
            model.description = Set(description);
        }
        if let Some(category_id) = input.category_id {
            model.category_id = Set(category_id);
        }
        if let Some(supplier_id) = input.supplier_id {
            model.supplier_id = Set(supplier_id);
        }
        if let Some(slug) = slug {
            model.slug = Set(slug);
        }
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let updated = model.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::ProductUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Soft delete; the product stays queryable in administrative contexts.
    #[instrument(skip(self))]
    pub async fn delete_product(
        &self,
        ctx: &ActorContext,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let existing = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        let (now, actor_id) = ctx.stamp();
        let mut model: product::ActiveModel = existing.into();
        model.is_active = Set(false);
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let deleted = model.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::ProductDeleted(deleted.id))
            .await;
        Ok(deleted)
    }

    /// Lists products through the generic filter engine: native columns,
    /// dotted paths (`category.name`, `supplier.name`) and dynamic
    /// attribute codes.
    #[instrument(skip(self, params))]
    pub async fn list_products(
        &self,
        params: &ListParams,
        include_inactive: bool,
    ) -> Result<Page<product::Model>, ServiceError> {
        let mut plan = QueryPlan::parse(params, &self.catalog)?;
        if include_inactive {
            plan = plan.with_inactive();
        }
        let txn = self.db_pool.begin().await?;
        let attrs = resolve_plan_attributes::<Product>(&txn, &plan).await?;
        let select = engine::build_select::<Product>(&plan, &attrs)?;
        let page = engine::paginate(&txn, select, &plan).await?;
        txn.commit().await?;
        Ok(page)
    }

    /// Products under a category, including its whole active subtree; the
    /// hierarchy supplies the descendant set the engine filters on.
    #[instrument(skip(self, params))]
    pub async fn list_under_category(
        &self,
        category_id: Uuid,
        params: &ListParams,
    ) -> Result<Page<product::Model>, ServiceError> {
        let plan = QueryPlan::parse(params, &self.catalog)?;
        let txn = self.db_pool.begin().await?;

        let root = categories::require(&txn, category_id).await?;
        let mut scope: Vec<Uuid> = Vec::new();
        if root.is_active {
            scope.push(root.id);
            scope.extend(categories::subtree_ids(&txn, root.id, true).await?);
        }

        let attrs = resolve_plan_attributes::<Product>(&txn, &plan).await?;
        let select = engine::build_select::<Product>(&plan, &attrs)?
            .filter(product::Column::CategoryId.is_in(scope));
        let page = engine::paginate(&txn, select, &plan).await?;
        txn.commit().await?;
        Ok(page)
    }

    /// Attaches image metadata to a product or SKU after validating the
    /// owner row exists.
    #[instrument(skip(self, input))]
    pub async fn attach_image(
        &self,
        ctx: &ActorContext,
        owner_type: EntityKind,
        owner_id: Uuid,
        input: AttachImageInput,
    ) -> Result<image::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        require_owner(&txn, owner_type, owner_id).await?;

        let sequence = Image::find()
            .filter(image::Column::OwnerType.eq(owner_type))
            .filter(image::Column::OwnerId.eq(owner_id))
            .count(&txn)
            .await? as i32;

        let (now, actor_id) = ctx.stamp();
        let created = image::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_type: Set(owner_type),
            owner_id: Set(owner_id),
            url: Set(input.url),
            alt_text: Set(input.alt_text),
            is_primary: Set(input.is_primary),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor_id),
            updated_by: Set(actor_id),
            is_active: Set(true),
            sequence: Set(sequence + 1),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::ImageAttached {
                owner_type,
                owner_id,
                image_id: created.id,
            })
            .await;
        Ok(created)
    }

    pub async fn list_images(
        &self,
        owner_type: EntityKind,
        owner_id: Uuid,
    ) -> Result<Vec<image::Model>, ServiceError> {
        let db = &*self.db_pool;
        require_owner(db, owner_type, owner_id).await?;
        Ok(Image::find()
            .filter(image::Column::OwnerType.eq(owner_type))
            .filter(image::Column::OwnerId.eq(owner_id))
            .filter(image::Column::IsActive.eq(true))
            .order_by(image::Column::Sequence, Order::Asc)
            .all(db)
            .await?)
    }
}

/// Looks up attribute definitions for every plan name that is not a native
/// column of the target; unknown codes are an invalid filter.
pub(crate) async fn resolve_plan_attributes<E: engine::FilterTarget>(
    db: &impl ConnectionTrait,
    plan: &QueryPlan,
) -> Result<AttributeMap, ServiceError> {
    use crate::entities::attribute::{self, Entity as Attribute};

    let names = engine::unresolved_names::<E>(plan);
    if names.is_empty() {
        return Ok(AttributeMap::new());
    }

    let found = Attribute::find()
        .filter(attribute::Column::Code.is_in(names.clone()))
        .filter(attribute::Column::IsActive.eq(true))
        .all(db)
        .await?;
    let mut attrs = AttributeMap::new();
    for attr in found {
        attrs.insert(attr.code.clone(), attr);
    }

    let missing: Vec<&String> = names.iter().filter(|n| !attrs.contains_key(*n)).collect();
    if let Some(name) = missing.first() {
        return Err(ServiceError::InvalidFilter(format!(
            "unknown field '{}'",
            name
        )));
    }
    Ok(attrs)
}

async fn require_owner<C: ConnectionTrait>(
    db: &C,
    owner_type: EntityKind,
    owner_id: Uuid,
) -> Result<(), ServiceError> {
    attributes::owner_category(db, owner_type, owner_id).await.map(|_| ())
}

async fn next_sequence_in_category<C: ConnectionTrait>(
    db: &C,
    category_id: Uuid,
) -> Result<i32, ServiceError> {
    let last = Product::find()
        .filter(product::Column::CategoryId.eq(category_id))
        .order_by(product::Column::Sequence, Order::Desc)
        .one(db)
        .await?;
    Ok(last.map(|p| p.sequence + 1).unwrap_or(1))
}

async fn product_slugs<C: ConnectionTrait>(
    db: &C,
    exclude: Option<Uuid>,
) -> Result<HashSet<String>, ServiceError> {
    let mut query = Product::find();
    if let Some(id) = exclude {
        query = query.filter(product::Column::Id.ne(id));
    }
    Ok(query.all(db).await?.into_iter().map(|p| p.slug).collect())
}

async fn ensure_product_slug_free<C: ConnectionTrait>(
    db: &C,
    slug: &str,
    exclude: Option<Uuid>,
) -> Result<(), ServiceError> {
    if product_slugs(db, exclude).await?.contains(slug) {
        return Err(ServiceError::Conflict(format!(
            "product slug '{}' already exists",
            slug
        )));
    }
    Ok(())
}

pub(crate) async fn derive_product_slug<C: ConnectionTrait>(
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
    let taken = product_slugs(db, exclude).await?;
    if !taken.contains(&base) {
        return Ok(base);
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}
