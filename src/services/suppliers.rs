use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::auditing::ActorContext;
use crate::config::CatalogConfig;
use crate::db::DbPool;
use crate::entities::supplier::{self, Entity as Supplier};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::query::{engine, ListParams, Page, QueryPlan};

/// Service for managing suppliers.
pub struct SupplierService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: CatalogConfig,
}

#[derive(Debug, Clone, Validate)]
pub struct CreateSupplierInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub contact_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateSupplierInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub contact_name: Option<Option<String>>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<Option<String>>,
    pub address: Option<Option<String>>,
}

impl SupplierService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, catalog: CatalogConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            catalog,
        }
    }

    pub async fn get_supplier(&self, supplier_id: Uuid) -> Result<supplier::Model, ServiceError> {
        Supplier::find_by_id(supplier_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", supplier_id))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_supplier(
        &self,
        ctx: &ActorContext,
        input: CreateSupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        if Supplier::find()
            .filter(supplier::Column::Name.eq(input.name.as_str()))
            .one(&txn)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "supplier named '{}' already exists",
                input.name
            )));
        }

        let (now, actor_id) = ctx.stamp();
        let created = supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            contact_name: Set(input.contact_name),
            email: Set(input.email),
            phone: Set(input.phone),
            address: Set(input.address),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor_id),
            updated_by: Set(actor_id),
            is_active: Set(true),
            sequence: Set(Supplier::find().count(&txn).await? as i32 + 1),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::SupplierCreated(created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_supplier(
        &self,
        ctx: &ActorContext,
        supplier_id: Uuid,
        input: UpdateSupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        input.validate()?;

        let txn = self.db_pool.begin().await?;
        let existing = Supplier::find_by_id(supplier_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", supplier_id))?;

        if let Some(name) = &input.name {
            if name != &existing.name
                && Supplier::find()
                    .filter(supplier::Column::Name.eq(name.as_str()))
                    .filter(supplier::Column::Id.ne(supplier_id))
                    .one(&txn)
                    .await?
                    .is_some()
            {
                return Err(ServiceError::Conflict(format!(
                    "supplier named '{}' already exists",
                    name
                )));
            }
        }

        let (now, actor_id) = ctx.stamp();
        let mut model: supplier::ActiveModel = existing.into();
        if let Some(name) = input.name {
            model.name = Set(name);
        }
        if let Some(contact_name) = input.contact_name {
            model.contact_name = Set(contact_name);
        }
        if let Some(email) = input.email {
            model.email = Set(Some(email));
        }
        if let Some(phone) = input.phone {
            model.phone = Set(phone);
        }
        if let Some(address) = input.address {
            model.address = Set(address);
        }
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let updated = model.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::SupplierUpdated(updated.id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_supplier(
        &self,
        ctx: &ActorContext,
        supplier_id: Uuid,
    ) -> Result<supplier::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let existing = Supplier::find_by_id(supplier_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", supplier_id))?;

        let (now, actor_id) = ctx.stamp();
        let mut model: supplier::ActiveModel = existing.into();
        model.is_active = Set(false);
        model.updated_at = Set(now);
        model.updated_by = Set(actor_id);
        let deleted = model.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::SupplierDeleted(deleted.id))
            .await;
        Ok(deleted)
    }

    /// Lists suppliers through the generic filter engine.
    #[instrument(skip(self, params))]
    pub async fn list_suppliers(
        &self,
        params: &ListParams,
        include_inactive: bool,
    ) -> Result<Page<supplier::Model>, ServiceError> {
        let mut plan = QueryPlan::parse(params, &self.catalog)?;
        if include_inactive {
            plan = plan.with_inactive();
        }
        if let Some(name) = engine::unresolved_names::<Supplier>(&plan).first() {
            return Err(ServiceError::InvalidFilter(format!(
                "unknown field '{}'",
                name
            )));
        }
        let select = engine::build_select::<Supplier>(&plan, &Default::default())?;
        let txn = self.db_pool.begin().await?;
        let page = engine::paginate(&txn, select, &plan).await?;
        txn.commit().await?;
        Ok(page)
    }
}
