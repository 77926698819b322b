use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auditing::ActorContext;
use crate::config::CatalogConfig;
use crate::db::DbPool;
use crate::entities::category::{self, Entity as Category};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::query::{engine, ListParams, Page, QueryPlan};

/// Service owning the category hierarchy: structural invariants (no
/// cycles, bounded depth), slug derivation and subtree traversals.
pub struct CategoryService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: CatalogConfig,
}

#[derive(Debug, Clone, Validate)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    /// Required for root categories, forbidden for children
    pub category_type_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    /// Pins the slug instead of deriving it from the name
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateCategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    /// Pins the slug; when absent a rename re-derives it
    pub slug: Option<String>,
}

impl CategoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, catalog: CatalogConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            catalog,
        }
    }

    /// Fetch one category or NotFound.
    pub async fn get_category(&self, category_id: Uuid) -> Result<category::Model, ServiceError> {
        require(&*self.db_pool, category_id).await
    }

    /// Lists categories through the generic filter engine.
    #[instrument(skip(self, params))]
    pub async fn list_categories(
        &self,
        params: &ListParams,
        include_inactive: bool,
    ) -> Result<Page<category::Model>, ServiceError> {
        let mut plan = QueryPlan::parse(params, &self.catalog)?;
        if include_inactive {
            plan = plan.with_inactive();
        }
        let unresolved = engine::unresolved_names::<Category>(&plan);
        if let Some(name) = unresolved.first() {
            return Err(ServiceError::InvalidFilter(format!(
                "unknown field '{}'",
                name
            )));
        }
        let select = engine::build_select::<Category>(&plan, &Default::default())?;
        let txn = self.db_pool.begin().await?;
        let page = engine::paginate(&txn, select, &plan).await?;
        txn.commit().await?;
        Ok(page)
    }

    /// Creates a category under an optional parent.
    ///
    /// Enforces the hierarchy rule (root categories carry a category type,
    /// children must not), the configured maximum depth and sibling-scoped
    /// slug uniqueness, and stamps provenance from the actor.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(
        &self,
        ctx: &ActorContext,
        input: CreateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        match (input.parent_id, input.category_type_id) {
            (None, None) => {
                return Err(ServiceError::ValidationError(
                    "a root category requires a category type".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ServiceError::ValidationError(
                    "a child category must not carry a category type".to_string(),
                ))
            }
            _ => {}
        }

        let txn = self.db_pool.begin().await?;

        if let Some(parent_id) = input.parent_id {
            let parent = require(&txn, parent_id).await?;
            if !parent.is_active {
                return Err(ServiceError::ValidationError(
                    "cannot create a category under a soft-deleted parent".to_string(),
                ));
            }
            let parent_depth = ancestor_path(&txn, &parent).await?.len() as u32;
            if parent_depth + 1 > self.catalog.max_depth {
                return Err(ServiceError::DepthExceeded(format!(
                    "depth {} exceeds the configured maximum of {}",
                    parent_depth + 1,
                    self.catalog.max_depth
                )));
            }
        }

        let slug = match &input.slug {
            Some(pinned) => {
                ensure_slug_free(&txn, input.parent_id, pinned, None).await?;
                pinned.clone()
            }
            None => derive_slug(&txn, input.parent_id, &input.name, None).await?,
        };

        let (now, actor_id) = ctx.stamp();
        let model = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.clone()),
            slug: Set(slug),
            description: Set(input.description),
            category_type_id: Set(input.category_type_id),
            parent_id: Set(input.parent_id),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor_id),
            updated_by: Set(actor_id),
            is_active: Set(true),
            sequence: Set(next_sequence(&txn, input.parent_id).await?),
        };
        let created = model.insert(&txn).await?;
        txn.commit().await?;

        info!(category_id = %created.id, slug = %created.slug, "Category created");
        self.event_sender
            .publish(Event::CategoryCreated(created.id))
            .await;
        Ok(created)
    }

    /// Updates name/description; a rename re-derives the slug unless the
    /// input pins one explicitly.
    #[instrument(skip(self, input))]
    pub async fn update_category(
        &self,
        ctx: &ActorContext,
        category_id: Uuid,
        input: UpdateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        let existing = require(&txn, category_id).await?;

        let renamed = input
            .name
            .as_ref()
            .map(|n| n != &existing.name)
            .unwrap_or(false);

        let slug = match (&input.slug, renamed) {
            (Some(pinned), _) => {
                ensure_slug_free(&txn, existing.parent_id, pinned, Some(category_id)).await?;
                Some(pinned.clone())
            }
            (None, true) => Some(
                derive_slug(
                    &txn,
                    existing.parent_id,
                    input.name.as_ref().unwrap(),
                    Some(category_id),
                )
                .await?,
            ),
            (None, false) => None,
        };

        let (now, actor_id) = ctx.stamp();
        let mut model: category::ActiveModel = existing.into();
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

        self.event_sender
            .publish(Event::CategoryUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Reparents a category.
    ///
    /// Fails with CycleError when the new parent is the category itself or
    /// any of its current descendants, and with DepthExceeded when the
    /// deepest node of the moved subtree would land beyond the configured
    /// maximum. The check and the reparent commit in one transaction.
    #[instrument(skip(self))]
    pub async fn move_category(
        &self,
        ctx: &ActorContext,
        category_id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> Result<category::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let existing = require(&txn, category_id).await?;
        let old_parent_id = existing.parent_id;

        if new_parent_id == Some(category_id) {
            return Err(ServiceError::CycleError(
                "a category cannot be its own parent".to_string(),
            ));
        }

        let subtree_height = subtree_height(&txn, category_id).await?;

        match new_parent_id {
            None => {
                if existing.category_type_id.is_none() {
                    return Err(ServiceError::ValidationError(
                        "a root category requires a category type".to_string(),
                    ));
                }
            }
            Some(parent_id) => {
                let parent = require(&txn, parent_id).await?;
                let path = ancestor_path(&txn, &parent).await?;
                if path.iter().any(|node| node.id == category_id) {
                    return Err(ServiceError::CycleError(format!(
                        "category {} is a descendant of {}",
                        parent_id, category_id
                    )));
                }
                let new_depth = path.len() as u32 + 1 + subtree_height;
                if new_depth > self.catalog.max_depth {
                    return Err(ServiceError::DepthExceeded(format!(
                        "depth {} exceeds the configured maximum of {}",
                        new_depth, self.catalog.max_depth
                    )));
                }
            }
        }

        let slug = derive_slug(&txn, new_parent_id, &existing.name, Some(category_id)).await?;
        let sequence = next_sequence(&txn, new_parent_id).await?;
        let (now, actor_id) = ctx.stamp();
        let mut model: category::ActiveModel = existing.into();
        model.parent_id = Set(new_parent_id);
        // Children carry no category type of their own.
        if new_parent_id.is_some() {
            model.category_type_id = Set(None);
        }
        model.slug = Set(slug);
        model.sequence = Set(sequence);
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let moved = model.update(&txn).await?;
        txn.commit().await?;

        info!(category_id = %moved.id, ?old_parent_id, ?new_parent_id, "Category moved");
        self.event_sender
            .publish(Event::CategoryMoved {
                category_id: moved.id,
                old_parent_id,
                new_parent_id,
            })
            .await;
        Ok(moved)
    }

    /// Soft-deletes a category. Descendant rows are untouched; active-only
    /// traversals stop seeing the whole subtree.
    #[instrument(skip(self))]
    pub async fn delete_category(
        &self,
        ctx: &ActorContext,
        category_id: Uuid,
    ) -> Result<category::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let existing = require(&txn, category_id).await?;

        let (now, actor_id) = ctx.stamp();
        let mut model: category::ActiveModel = existing.into();
        model.is_active = Set(false);
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let deleted = model.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::CategoryDeleted(deleted.id))
            .await;
        Ok(deleted)
    }

    /// Path from the root down to the category itself.
    pub async fn ancestors(&self, category_id: Uuid) -> Result<Vec<category::Model>, ServiceError> {
        let node = require(&*self.db_pool, category_id).await?;
        ancestor_path(&*self.db_pool, &node).await
    }

    /// All categories beneath the given one, parents before children.
    ///
    /// With `active_only`, soft-deleted nodes and everything beneath them
    /// are skipped; a soft-deleted starting node yields an empty set.
    pub async fn descendants(
        &self,
        category_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<category::Model>, ServiceError> {
        let root = require(&*self.db_pool, category_id).await?;
        if active_only && !root.is_active {
            return Ok(Vec::new());
        }
        collect_descendants(&*self.db_pool, root.id, active_only).await
    }
}

pub(crate) async fn require<C: ConnectionTrait>(
    db: &C,
    category_id: Uuid,
) -> Result<category::Model, ServiceError> {
    Category::find_by_id(category_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Category", category_id))
}

/// Root-first path ending at `node`. Errors on a corrupted parent graph
/// instead of looping.
pub(crate) async fn ancestor_path<C: ConnectionTrait>(
    db: &C,
    node: &category::Model,
) -> Result<Vec<category::Model>, ServiceError> {
    let mut path = vec![node.clone()];
    let mut seen: HashSet<Uuid> = HashSet::from([node.id]);
    let mut current = node.clone();
    while let Some(parent_id) = current.parent_id {
        let parent = require(db, parent_id).await?;
        if !seen.insert(parent.id) {
            return Err(ServiceError::InternalError(format!(
                "parent graph of category {} contains a cycle",
                node.id
            )));
        }
        path.push(parent.clone());
        current = parent;
    }
    path.reverse();
    Ok(path)
}

/// Ids of the subtree rooted at `root_id`, excluding the root.
pub(crate) async fn subtree_ids<C: ConnectionTrait>(
    db: &C,
    root_id: Uuid,
    active_only: bool,
) -> Result<Vec<Uuid>, ServiceError> {
    Ok(collect_descendants(db, root_id, active_only)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect())
}

async fn collect_descendants<C: ConnectionTrait>(
    db: &C,
    root_id: Uuid,
    active_only: bool,
) -> Result<Vec<category::Model>, ServiceError> {
    let mut queue = vec![root_id];
    let mut out = Vec::new();
    while let Some(current) = queue.pop() {
        let mut query = Category::find().filter(category::Column::ParentId.eq(current));
        if active_only {
            query = query.filter(category::Column::IsActive.eq(true));
        }
        let children = query
            .order_by(category::Column::Sequence, Order::Asc)
            .all(db)
            .await?;
        for child in children {
            queue.push(child.id);
            out.push(child);
        }
    }
    Ok(out)
}

/// Number of levels beneath `root_id` (0 for a leaf).
async fn subtree_height<C: ConnectionTrait>(db: &C, root_id: Uuid) -> Result<u32, ServiceError> {
    let mut height = 0;
    let mut level = vec![root_id];
    while !level.is_empty() {
        let children = Category::find()
            .filter(category::Column::ParentId.is_in(level))
            .all(db)
            .await?;
        if children.is_empty() {
            break;
        }
        height += 1;
        level = children.into_iter().map(|c| c.id).collect();
    }
    Ok(height)
}

async fn next_sequence<C: ConnectionTrait>(
    db: &C,
    parent_id: Option<Uuid>,
) -> Result<i32, ServiceError> {
    let query = match parent_id {
        Some(parent) => Category::find().filter(category::Column::ParentId.eq(parent)),
        None => Category::find().filter(category::Column::ParentId.is_null()),
    };
    let last = query
        .order_by(category::Column::Sequence, Order::Desc)
        .one(db)
        .await?;
    Ok(last.map(|c| c.sequence + 1).unwrap_or(1))
}

async fn sibling_slugs<C: ConnectionTrait>(
    db: &C,
    parent_id: Option<Uuid>,
    exclude: Option<Uuid>,
) -> Result<HashSet<String>, ServiceError> {
    let mut query = match parent_id {
        Some(parent) => Category::find().filter(category::Column::ParentId.eq(parent)),
        None => Category::find().filter(category::Column::ParentId.is_null()),
    };
    if let Some(id) = exclude {
        query = query.filter(category::Column::Id.ne(id));
    }
    Ok(query.all(db).await?.into_iter().map(|c| c.slug).collect())
}

async fn ensure_slug_free<C: ConnectionTrait>(
    db: &C,
    parent_id: Option<Uuid>,
    slug: &str,
    exclude: Option<Uuid>,
) -> Result<(), ServiceError> {
    if sibling_slugs(db, parent_id, exclude).await?.contains(slug) {
        return Err(ServiceError::Conflict(format!(
            "slug '{}' already exists in this scope",
            slug
        )));
    }
    Ok(())
}

/// Derives a slug from the name and suffixes it until unique among the
/// siblings of the target scope.
async fn derive_slug<C: ConnectionTrait>(
    db: &C,
    parent_id: Option<Uuid>,
    name: &str,
    exclude: Option<Uuid>,
) -> Result<String, ServiceError> {
    let base = slugify(name);
    if base.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "name '{}' contains no sluggable characters",
            name
        )));
    }
    let taken = sibling_slugs(db, parent_id, exclude).await?;
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

/// Deterministic slug normalization: lowercase, whitespace runs to a
/// single hyphen, everything non-alphanumeric stripped.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_hyphen = true;
        }
        // any other character is stripped
    }
    slug
}
