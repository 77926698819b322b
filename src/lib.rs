//! Catalog API Library
//!
//! Core data/query layer of the product catalog backend: audited entities,
//! a cycle-safe category hierarchy, schema-defined dynamic attributes, a
//! generic filter/sort/pagination engine and tiered price resolution. The
//! surrounding transport, auth and migration layers consume this crate.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auditing;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod query;
pub mod services;

use std::sync::Arc;

use crate::auditing::SYSTEM_ACTOR_ID;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;

/// Shared application state wiring every service over one pool, one event
/// channel and one configuration.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Arc<EventSender>,
    pub categories: Arc<services::CategoryService>,
    pub attributes: Arc<services::AttributeService>,
    pub products: Arc<services::ProductService>,
    pub skus: Arc<services::SkuService>,
    pub suppliers: Arc<services::SupplierService>,
    pub pricing: Arc<services::PricingService>,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: config::AppConfig, event_sender: EventSender) -> Self {
        let event_sender = Arc::new(event_sender);
        let catalog = config.catalog.clone();
        Self {
            categories: Arc::new(services::CategoryService::new(
                db.clone(),
                event_sender.clone(),
                catalog.clone(),
            )),
            attributes: Arc::new(services::AttributeService::new(
                db.clone(),
                event_sender.clone(),
                catalog.clone(),
            )),
            products: Arc::new(services::ProductService::new(
                db.clone(),
                event_sender.clone(),
                catalog.clone(),
            )),
            skus: Arc::new(services::SkuService::new(
                db.clone(),
                event_sender.clone(),
                catalog.clone(),
            )),
            suppliers: Arc::new(services::SupplierService::new(
                db.clone(),
                event_sender.clone(),
                catalog.clone(),
            )),
            pricing: Arc::new(services::PricingService::new(
                db.clone(),
                event_sender.clone(),
                catalog,
            )),
            db,
            config,
            event_sender,
        }
    }

    /// Seeds the reserved system actor row; idempotent.
    pub async fn ensure_system_actor(&self) -> Result<(), ServiceError> {
        use chrono::Utc;
        use sea_orm::{ActiveModelTrait, EntityTrait, Set};

        let existing = entities::user::Entity::find_by_id(SYSTEM_ACTOR_ID)
            .one(&*self.db)
            .await?;
        if existing.is_none() {
            entities::user::ActiveModel {
                id: Set(SYSTEM_ACTOR_ID),
                username: Set("system".to_string()),
                email: Set(None),
                is_active: Set(true),
                created_at: Set(Utc::now()),
            }
            .insert(&*self.db)
            .await?;
        }
        Ok(())
    }
}
