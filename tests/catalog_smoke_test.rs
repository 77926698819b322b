mod common;

use assert_matches::assert_matches;
use common::{actor, seed_product, seed_root_category, seed_sku, TestApp};
use serde_json::json;
use uuid::Uuid;

use catalog_api::entities::EntityKind;
use catalog_api::errors::ServiceError;
use catalog_api::query::ListParams;
use catalog_api::services::products::AttachImageInput;
use catalog_api::services::suppliers::{CreateSupplierInput, UpdateSupplierInput};

#[tokio::test]
async fn suppliers_run_through_the_generic_engine() {
    let app = TestApp::new().await;
    for name in ["Acme Goods", "Acme Logistics", "Globex"] {
        app.state
            .suppliers
            .create_supplier(
                &actor(),
                CreateSupplierInput {
                    name: name.to_string(),
                    contact_name: None,
                    email: None,
                    phone: None,
                    address: None,
                },
            )
            .await
            .unwrap();
    }

    let page = app
        .state
        .suppliers
        .list_suppliers(
            &ListParams {
                filter: serde_json::from_value(json!({"name": {"like": "acme"}})).unwrap(),
                sort_field: Some("name".to_string()),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    assert_eq!(page.meta.total, 2);
    let names: Vec<&str> = page.data.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Acme Goods", "Acme Logistics"]);
}

#[tokio::test]
async fn supplier_names_are_unique() {
    let app = TestApp::new().await;
    let input = CreateSupplierInput {
        name: "Acme".to_string(),
        contact_name: None,
        email: None,
        phone: None,
        address: None,
    };
    let first = app
        .state
        .suppliers
        .create_supplier(&actor(), input.clone())
        .await
        .unwrap();

    let duplicate = app.state.suppliers.create_supplier(&actor(), input).await;
    assert_matches!(duplicate, Err(ServiceError::Conflict(_)));

    let renamed = app
        .state
        .suppliers
        .update_supplier(
            &actor(),
            first.id,
            UpdateSupplierInput {
                contact_name: Some(Some("Wile E.".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.contact_name.as_deref(), Some("Wile E."));
}

#[tokio::test]
async fn images_attach_to_validated_owners_only() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Gallery").await;
    let product = seed_product(&app, root.id, "Poster").await;
    let sku = seed_sku(&app, product.id, "Poster A2").await;

    let product_image = app
        .state
        .products
        .attach_image(
            &actor(),
            EntityKind::Product,
            product.id,
            AttachImageInput {
                url: "https://cdn.example.com/poster.jpg".to_string(),
                alt_text: Some("Poster".to_string()),
                is_primary: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(product_image.owner_id, product.id);

    app.state
        .products
        .attach_image(
            &actor(),
            EntityKind::Sku,
            sku.id,
            AttachImageInput {
                url: "https://cdn.example.com/poster-a2.jpg".to_string(),
                alt_text: None,
                is_primary: false,
            },
        )
        .await
        .unwrap();

    // The same id under the wrong owner kind does not validate.
    let wrong_kind = app
        .state
        .products
        .attach_image(
            &actor(),
            EntityKind::Sku,
            product.id,
            AttachImageInput {
                url: "https://cdn.example.com/oops.jpg".to_string(),
                alt_text: None,
                is_primary: false,
            },
        )
        .await;
    assert_matches!(wrong_kind, Err(ServiceError::NotFound(_)));

    let missing_owner = app
        .state
        .products
        .attach_image(
            &actor(),
            EntityKind::Product,
            Uuid::new_v4(),
            AttachImageInput {
                url: "https://cdn.example.com/ghost.jpg".to_string(),
                alt_text: None,
                is_primary: false,
            },
        )
        .await;
    assert_matches!(missing_owner, Err(ServiceError::NotFound(_)));

    // Listings are scoped per owner.
    let product_images = app
        .state
        .products
        .list_images(EntityKind::Product, product.id)
        .await
        .unwrap();
    assert_eq!(product_images.len(), 1);
    let sku_images = app
        .state
        .products
        .list_images(EntityKind::Sku, sku.id)
        .await
        .unwrap();
    assert_eq!(sku_images.len(), 1);

    let bad_url = app
        .state
        .products
        .attach_image(
            &actor(),
            EntityKind::Product,
            product.id,
            AttachImageInput {
                url: "not a url".to_string(),
                alt_text: None,
                is_primary: false,
            },
        )
        .await;
    assert_matches!(bad_url, Err(ServiceError::ValidationError(_)));
}
