mod common;

use assert_matches::assert_matches;
use common::{actor, seed_child_category, seed_product, seed_root_category, seed_sku, TestApp};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use catalog_api::entities::attribute::DataType;
use catalog_api::entities::EntityKind;
use catalog_api::errors::ServiceError;
use catalog_api::query::{ListParams, SortOrder};
use catalog_api::services::attributes::{CreateAttributeInput, CreateAttributeSetInput};

fn filter(value: Value) -> BTreeMap<String, Value> {
    serde_json::from_value(value).unwrap()
}

/// Three SKUs carrying color = {red, blue, none} and weight = {1.5, 10.25,
/// none} under one product.
struct SkuFixture {
    red_id: Uuid,
    blue_id: Uuid,
    plain_id: Uuid,
}

async fn seed_sku_fixture(app: &TestApp) -> SkuFixture {
    let root = seed_root_category(app, "Gear").await;
    let product = seed_product(app, root.id, "Backpack").await;

    let set = app
        .state
        .attributes
        .create_attribute_set(
            &actor(),
            CreateAttributeSetInput {
                name: "Gear basics".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    for (name, code, data_type) in [
        ("Color", "color", DataType::Text),
        ("Weight", "weight", DataType::Decimal),
    ] {
        let attr = app
            .state
            .attributes
            .create_attribute(
                &actor(),
                CreateAttributeInput {
                    name: name.to_string(),
                    code: code.to_string(),
                    data_type,
                    unit_of_measure: None,
                    choices: None,
                },
            )
            .await
            .unwrap();
        app.state
            .attributes
            .add_attribute_to_set(&actor(), set.id, attr.id)
            .await
            .unwrap();
    }
    app.state
        .attributes
        .bind_set_to_category(&actor(), root.id, set.id)
        .await
        .unwrap();

    let red = seed_sku(app, product.id, "Red pack").await;
    let blue = seed_sku(app, product.id, "Blue pack").await;
    let plain = seed_sku(app, product.id, "Plain pack").await;

    for (sku_id, color, weight) in [
        (red.id, Some("red"), Some("1.5")),
        (blue.id, Some("blue"), Some("10.25")),
        (plain.id, None, None),
    ] {
        if let Some(color) = color {
            app.state
                .attributes
                .set_value(&actor(), EntityKind::Sku, sku_id, "color", &json!(color))
                .await
                .unwrap();
        }
        if let Some(weight) = weight {
            app.state
                .attributes
                .set_value(&actor(), EntityKind::Sku, sku_id, "weight", &json!(weight))
                .await
                .unwrap();
        }
    }

    SkuFixture {
        red_id: red.id,
        blue_id: blue.id,
        plain_id: plain.id,
    }
}

#[tokio::test]
async fn native_equality_and_substring_match() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Pantry").await;
    seed_product(&app, root.id, "Arabica Beans").await;
    seed_product(&app, root.id, "Robusta Beans").await;
    seed_product(&app, root.id, "Green Tea").await;

    let exact = app
        .state
        .products
        .list_products(
            &ListParams {
                filter: filter(json!({"name": "Green Tea"})),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    assert_eq!(exact.meta.total, 1);
    assert_eq!(exact.data[0].name, "Green Tea");

    let substring = app
        .state
        .products
        .list_products(
            &ListParams {
                filter: filter(json!({"name": {"like": "BEAN"}})),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    assert_eq!(substring.meta.total, 2);
}

#[tokio::test]
async fn dotted_path_filters_through_the_relation() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Beverages").await;
    let coffee = seed_child_category(&app, root.id, "Coffee").await;
    let tea = seed_child_category(&app, root.id, "Tea").await;
    seed_product(&app, coffee.id, "Espresso Kit").await;
    seed_product(&app, tea.id, "Matcha Kit").await;

    let page = app
        .state
        .products
        .list_products(
            &ListParams {
                filter: filter(json!({"category.name": "Coffee"})),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    assert_eq!(page.meta.total, 1);
    assert_eq!(page.data[0].name, "Espresso Kit");

    // Unknown column behind the relation is an invalid filter.
    let unknown = app
        .state
        .products
        .list_products(
            &ListParams {
                filter: filter(json!({"category.nonexistent": "x"})),
                ..Default::default()
            },
            false,
        )
        .await;
    assert_matches!(unknown, Err(ServiceError::InvalidFilter(_)));
}

#[tokio::test]
async fn attribute_filter_excludes_null_and_non_matching() {
    let app = TestApp::new().await;
    let fixture = seed_sku_fixture(&app).await;

    let page = app
        .state
        .skus
        .list_skus(
            &ListParams {
                filter: filter(json!({"color": "red"})),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let ids: Vec<Uuid> = page.data.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![fixture.red_id]);
}

#[tokio::test]
async fn attribute_sort_places_nulls_last_in_both_directions() {
    let app = TestApp::new().await;
    let fixture = seed_sku_fixture(&app).await;

    let asc = app
        .state
        .skus
        .list_skus(
            &ListParams {
                sort_field: Some("color".to_string()),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let ids: Vec<Uuid> = asc.data.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![fixture.blue_id, fixture.red_id, fixture.plain_id]);

    let desc = app
        .state
        .skus
        .list_skus(
            &ListParams {
                sort_field: Some("color".to_string()),
                order_rule: SortOrder::Desc,
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let ids: Vec<Uuid> = desc.data.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![fixture.red_id, fixture.blue_id, fixture.plain_id]);
}

#[tokio::test]
async fn numeric_attribute_comparison_is_not_lexical() {
    let app = TestApp::new().await;
    let fixture = seed_sku_fixture(&app).await;

    // Lexically "10.25" < "1.5"; numerically it is not.
    let heavy = app
        .state
        .skus
        .list_skus(
            &ListParams {
                filter: filter(json!({"weight": {"gte": 2}})),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let ids: Vec<Uuid> = heavy.data.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![fixture.blue_id]);
}

#[tokio::test]
async fn unknown_fields_and_operators_fail_loudly() {
    let app = TestApp::new().await;
    let fixture = seed_sku_fixture(&app).await;
    let _ = fixture;

    let unknown_field = app
        .state
        .skus
        .list_skus(
            &ListParams {
                filter: filter(json!({"flavour": "salty"})),
                ..Default::default()
            },
            false,
        )
        .await;
    assert_matches!(unknown_field, Err(ServiceError::InvalidFilter(_)));

    let unknown_op = app
        .state
        .skus
        .list_skus(
            &ListParams {
                filter: filter(json!({"name": {"regex": ".*"}})),
                ..Default::default()
            },
            false,
        )
        .await;
    assert_matches!(unknown_op, Err(ServiceError::InvalidFilter(_)));

    let unknown_sort = app
        .state
        .skus
        .list_skus(
            &ListParams {
                sort_field: Some("flavour".to_string()),
                ..Default::default()
            },
            false,
        )
        .await;
    assert_matches!(unknown_sort, Err(ServiceError::InvalidFilter(_)));
}

#[tokio::test]
async fn soft_deleted_rows_are_gated_unless_administrative() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Pantry").await;
    let keep = seed_product(&app, root.id, "Keeper").await;
    let gone = seed_product(&app, root.id, "Goner").await;
    app.state
        .products
        .delete_product(&actor(), gone.id)
        .await
        .unwrap();

    let visible = app
        .state
        .products
        .list_products(&ListParams::default(), false)
        .await
        .unwrap();
    let ids: Vec<Uuid> = visible.data.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![keep.id]);

    let administrative = app
        .state
        .products
        .list_products(&ListParams::default(), true)
        .await
        .unwrap();
    assert_eq!(administrative.meta.total, 2);

    // The gate cannot be addressed from the raw expression.
    let overridden = app
        .state
        .products
        .list_products(
            &ListParams {
                filter: filter(json!({"is_active": false})),
                ..Default::default()
            },
            false,
        )
        .await;
    assert_matches!(overridden, Err(ServiceError::InvalidFilter(_)));
}

#[tokio::test]
async fn pagination_meta_and_last_page_line_up() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Bulk").await;
    for i in 0..157 {
        seed_product(&app, root.id, &format!("Item {:03}", i)).await;
    }

    let page = app
        .state
        .products
        .list_products(
            &ListParams {
                limit: Some(20),
                page: Some(8),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    assert_eq!(page.meta.total, 157);
    assert_eq!(page.meta.pages, 8);
    assert_eq!(page.meta.page, 8);
    assert_eq!(page.data.len(), 17);

    let beyond = app
        .state
        .products
        .list_products(
            &ListParams {
                limit: Some(20),
                page: Some(9),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    assert!(beyond.data.is_empty());
    assert_eq!(beyond.meta.total, 157);
}

#[tokio::test]
async fn products_under_a_category_span_its_active_subtree() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Store").await;
    let coffee = seed_child_category(&app, root.id, "Coffee").await;
    let decaf = seed_child_category(&app, coffee.id, "Decaf").await;
    let tea = seed_child_category(&app, root.id, "Tea").await;

    let direct = seed_product(&app, coffee.id, "Espresso").await;
    let nested = seed_product(&app, decaf.id, "Decaf Espresso").await;
    seed_product(&app, tea.id, "Sencha").await;

    let page = app
        .state
        .products
        .list_under_category(coffee.id, &ListParams::default())
        .await
        .unwrap();
    let mut ids: Vec<Uuid> = page.data.iter().map(|p| p.id).collect();
    ids.sort();
    let mut expected = vec![direct.id, nested.id];
    expected.sort();
    assert_eq!(ids, expected);

    // Soft-deleting the subtree's branch hides its products from the scope.
    app.state
        .categories
        .delete_category(&actor(), decaf.id)
        .await
        .unwrap();
    let after = app
        .state
        .products
        .list_under_category(coffee.id, &ListParams::default())
        .await
        .unwrap();
    let ids: Vec<Uuid> = after.data.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![direct.id]);
}

#[tokio::test]
async fn sku_lists_filter_through_the_parent_product_path() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Gear").await;
    let pack = seed_product(&app, root.id, "Backpack").await;
    let tent = seed_product(&app, root.id, "Tent").await;
    let pack_sku = seed_sku(&app, pack.id, "Backpack 30L").await;
    seed_sku(&app, tent.id, "Tent 2P").await;

    let page = app
        .state
        .skus
        .list_skus(
            &ListParams {
                filter: filter(json!({"product.name": {"like": "backpack"}})),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    let ids: Vec<Uuid> = page.data.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![pack_sku.id]);
}
