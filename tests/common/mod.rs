#![allow(dead_code)]

use std::sync::Arc;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DbBackend, Schema};
use tokio::sync::mpsc;
use uuid::Uuid;

use catalog_api::auditing::ActorContext;
use catalog_api::config::{AppConfig, CatalogConfig};
use catalog_api::entities;
use catalog_api::events::{self, Event};
use catalog_api::services::categories::CreateCategoryInput;
use catalog_api::services::products::CreateProductInput;
use catalog_api::services::skus::CreateSkuInput;
use catalog_api::AppState;

/// Test harness: application state over an in-memory SQLite database with
/// the schema created straight from the entities.
pub struct TestApp {
    pub state: AppState,
    pub events: mpsc::Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_catalog(CatalogConfig::default()).await
    }

    pub async fn with_catalog(catalog: CatalogConfig) -> Self {
        // A single pooled connection: every pool member of an in-memory
        // SQLite database would otherwise see its own empty schema.
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1).min_connections(1);
        let db = Database::connect(options)
            .await
            .expect("Failed to open in-memory database");

        let schema = Schema::new(DbBackend::Sqlite);
        let statements = [
            schema.create_table_from_entity(entities::user::Entity),
            schema.create_table_from_entity(entities::category_type::Entity),
            schema.create_table_from_entity(entities::category::Entity),
            schema.create_table_from_entity(entities::attribute::Entity),
            schema.create_table_from_entity(entities::attribute_set::Entity),
            schema.create_table_from_entity(entities::attribute_set_attribute::Entity),
            schema.create_table_from_entity(entities::category_attribute_set::Entity),
            schema.create_table_from_entity(entities::supplier::Entity),
            schema.create_table_from_entity(entities::product::Entity),
            schema.create_table_from_entity(entities::sku::Entity),
            schema.create_table_from_entity(entities::attribute_value::Entity),
            schema.create_table_from_entity(entities::pricelist::Entity),
            schema.create_table_from_entity(entities::price_detail::Entity),
            schema.create_table_from_entity(entities::image::Entity),
        ];
        for statement in statements {
            db.execute(db.get_database_backend().build(&statement))
                .await
                .expect("Failed to create table");
        }

        let (sender, receiver) = events::channel(256);
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            environment: "test".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            catalog,
        };
        let state = AppState::new(Arc::new(db), config, sender);
        state
            .ensure_system_actor()
            .await
            .expect("Failed to seed system actor");

        Self {
            state,
            events: receiver,
        }
    }
}

pub fn actor() -> ActorContext {
    ActorContext::system()
}

/// Seeds a category type and a root category under it.
pub async fn seed_root_category(app: &TestApp, name: &str) -> entities::category::Model {
    let category_type = seed_category_type(app, &format!("{} type", name)).await;
    app.state
        .categories
        .create_category(
            &actor(),
            CreateCategoryInput {
                name: name.to_string(),
                description: None,
                category_type_id: Some(category_type.id),
                parent_id: None,
                slug: None,
            },
        )
        .await
        .expect("Failed to create root category")
}

pub async fn seed_category_type(app: &TestApp, name: &str) -> entities::category_type::Model {
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, Set};

    entities::category_type::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        created_by: Set(Uuid::nil()),
        updated_by: Set(Uuid::nil()),
        is_active: Set(true),
        sequence: Set(1),
    }
    .insert(&*app.state.db)
    .await
    .expect("Failed to create category type")
}

pub async fn seed_child_category(
    app: &TestApp,
    parent_id: Uuid,
    name: &str,
) -> entities::category::Model {
    app.state
        .categories
        .create_category(
            &actor(),
            CreateCategoryInput {
                name: name.to_string(),
                description: None,
                category_type_id: None,
                parent_id: Some(parent_id),
                slug: None,
            },
        )
        .await
        .expect("Failed to create child category")
}

pub async fn seed_product(
    app: &TestApp,
    category_id: Uuid,
    name: &str,
) -> entities::product::Model {
    app.state
        .products
        .create_product(
            &actor(),
            CreateProductInput {
                name: name.to_string(),
                description: None,
                category_id,
                supplier_id: None,
                slug: None,
            },
        )
        .await
        .expect("Failed to create product")
}

pub async fn seed_sku(app: &TestApp, product_id: Uuid, name: &str) -> entities::sku::Model {
    app.state
        .skus
        .create_sku(
            &actor(),
            CreateSkuInput {
                name: name.to_string(),
                description: None,
                product_id,
                sku_number: None,
                slug: None,
                price_details: Vec::new(),
                attribute_values: Vec::new(),
            },
        )
        .await
        .expect("Failed to create sku")
}
