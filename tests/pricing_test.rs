mod common;

use assert_matches::assert_matches;
use common::{actor, seed_product, seed_root_category, seed_sku, TestApp};
use rust_decimal_macros::dec;
use uuid::Uuid;

use catalog_api::errors::ServiceError;
use catalog_api::services::pricing::{AddPriceDetailInput, CreatePricelistInput};
use catalog_api::services::skus::{CreateSkuInput, PriceTierInput};

struct PricingFixture {
    sku_id: Uuid,
    pricelist_id: Uuid,
}

/// One SKU with tiers {1 -> 10, 10 -> 9, 100 -> 8} on one pricelist.
async fn seed_tiers(app: &TestApp) -> PricingFixture {
    let root = seed_root_category(app, "Warehouse").await;
    let product = seed_product(app, root.id, "Crate").await;
    let sku = seed_sku(app, product.id, "Crate Single").await;

    let pricelist = app
        .state
        .pricing
        .create_pricelist(
            &actor(),
            CreatePricelistInput {
                name: "Standard".to_string(),
                description: None,
                currency: "USD".to_string(),
            },
        )
        .await
        .unwrap();

    for (minimum_quantity, price) in [(1, dec!(10)), (10, dec!(9)), (100, dec!(8))] {
        app.state
            .pricing
            .add_price_detail(
                &actor(),
                AddPriceDetailInput {
                    sku_id: sku.id,
                    pricelist_id: pricelist.id,
                    minimum_quantity,
                    price,
                },
            )
            .await
            .unwrap();
    }

    PricingFixture {
        sku_id: sku.id,
        pricelist_id: pricelist.id,
    }
}

#[tokio::test]
async fn resolution_picks_the_highest_threshold_not_exceeding_quantity() {
    let app = TestApp::new().await;
    let fixture = seed_tiers(&app).await;

    for (quantity, expected) in [(1, dec!(10)), (9, dec!(10)), (10, dec!(9)), (15, dec!(9)), (100, dec!(8)), (5000, dec!(8))] {
        let tier = app
            .state
            .pricing
            .resolve_price(fixture.sku_id, fixture.pricelist_id, quantity)
            .await
            .unwrap();
        assert_eq!(tier.price, expected, "quantity {}", quantity);
    }
}

#[tokio::test]
async fn quantity_below_every_threshold_is_not_found() {
    let app = TestApp::new().await;
    let fixture = seed_tiers(&app).await;

    let zero = app
        .state
        .pricing
        .resolve_price(fixture.sku_id, fixture.pricelist_id, 0)
        .await;
    assert_matches!(zero, Err(ServiceError::NotFound(_)));

    // Unknown pricelist behaves the same: no qualifying tier, no default.
    let other = app
        .state
        .pricing
        .resolve_price(fixture.sku_id, Uuid::new_v4(), 50)
        .await;
    assert_matches!(other, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_minimum_quantity_is_a_conflict() {
    let app = TestApp::new().await;
    let fixture = seed_tiers(&app).await;

    let duplicate = app
        .state
        .pricing
        .add_price_detail(
            &actor(),
            AddPriceDetailInput {
                sku_id: fixture.sku_id,
                pricelist_id: fixture.pricelist_id,
                minimum_quantity: 10,
                price: dec!(7),
            },
        )
        .await;
    assert_matches!(duplicate, Err(ServiceError::Conflict(_)));

    let err = duplicate.unwrap_err();
    assert_eq!(err.code(), "RESOURCE_CONFLICT");
}

#[tokio::test]
async fn removed_tiers_stop_resolving() {
    let app = TestApp::new().await;
    let fixture = seed_tiers(&app).await;

    let tiers = app
        .state
        .pricing
        .list_price_details(fixture.sku_id, fixture.pricelist_id)
        .await
        .unwrap();
    let ten = tiers.iter().find(|t| t.minimum_quantity == 10).unwrap();
    app.state
        .pricing
        .remove_price_detail(&actor(), ten.id)
        .await
        .unwrap();

    let tier = app
        .state
        .pricing
        .resolve_price(fixture.sku_id, fixture.pricelist_id, 15)
        .await
        .unwrap();
    assert_eq!(tier.price, dec!(10));
}

#[tokio::test]
async fn invalid_tier_values_are_rejected() {
    let app = TestApp::new().await;
    let fixture = seed_tiers(&app).await;

    let zero_quantity = app
        .state
        .pricing
        .add_price_detail(
            &actor(),
            AddPriceDetailInput {
                sku_id: fixture.sku_id,
                pricelist_id: fixture.pricelist_id,
                minimum_quantity: 0,
                price: dec!(5),
            },
        )
        .await;
    assert_matches!(zero_quantity, Err(ServiceError::ValidationError(_)));

    let free = app
        .state
        .pricing
        .add_price_detail(
            &actor(),
            AddPriceDetailInput {
                sku_id: fixture.sku_id,
                pricelist_id: fixture.pricelist_id,
                minimum_quantity: 500,
                price: dec!(0),
            },
        )
        .await;
    assert_matches!(free, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn nested_sku_create_builds_tiers_and_resolves() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Warehouse").await;
    let product = seed_product(&app, root.id, "Crate").await;
    let pricelist = app
        .state
        .pricing
        .create_pricelist(
            &actor(),
            CreatePricelistInput {
                name: "Wholesale".to_string(),
                description: None,
                currency: "USD".to_string(),
            },
        )
        .await
        .unwrap();

    let sku = app
        .state
        .skus
        .create_sku(
            &actor(),
            CreateSkuInput {
                name: "Crate Pallet".to_string(),
                description: None,
                product_id: product.id,
                sku_number: None,
                slug: None,
                price_details: vec![
                    PriceTierInput {
                        pricelist_id: pricelist.id,
                        minimum_quantity: 1,
                        price: dec!(100),
                    },
                    PriceTierInput {
                        pricelist_id: pricelist.id,
                        minimum_quantity: 24,
                        price: dec!(90),
                    },
                ],
                attribute_values: Vec::new(),
            },
        )
        .await
        .unwrap();

    let (found, tier) = app
        .state
        .skus
        .get_with_price(sku.id, pricelist.id, 30)
        .await
        .unwrap();
    assert_eq!(found.id, sku.id);
    assert_eq!(tier.price, dec!(90));

    // Duplicate thresholds inside one nested create roll the whole SKU back.
    let duplicated = app
        .state
        .skus
        .create_sku(
            &actor(),
            CreateSkuInput {
                name: "Crate Broken".to_string(),
                description: None,
                product_id: product.id,
                sku_number: None,
                slug: None,
                price_details: vec![
                    PriceTierInput {
                        pricelist_id: pricelist.id,
                        minimum_quantity: 5,
                        price: dec!(50),
                    },
                    PriceTierInput {
                        pricelist_id: pricelist.id,
                        minimum_quantity: 5,
                        price: dec!(45),
                    },
                ],
                attribute_values: Vec::new(),
            },
        )
        .await;
    assert_matches!(duplicated, Err(ServiceError::Conflict(_)));

    let orphan = app
        .state
        .skus
        .list_skus(&Default::default(), true)
        .await
        .unwrap()
        .data
        .into_iter()
        .find(|s| s.name == "Crate Broken");
    assert!(orphan.is_none());
}

#[tokio::test]
async fn generated_sku_numbers_are_unique_hex() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Warehouse").await;
    let product = seed_product(&app, root.id, "Crate").await;

    let a = seed_sku(&app, product.id, "One").await;
    let b = seed_sku(&app, product.id, "Two").await;
    assert_ne!(a.sku_number, b.sku_number);
    assert!(catalog_api::entities::sku::is_valid_sku_number(&a.sku_number));

    let forged = app
        .state
        .skus
        .create_sku(
            &actor(),
            CreateSkuInput {
                name: "Three".to_string(),
                description: None,
                product_id: product.id,
                sku_number: Some("nothex".to_string()),
                slug: None,
                price_details: Vec::new(),
                attribute_values: Vec::new(),
            },
        )
        .await;
    assert_matches!(forged, Err(ServiceError::ValidationError(_)));

    let taken = app
        .state
        .skus
        .create_sku(
            &actor(),
            CreateSkuInput {
                name: "Four".to_string(),
                description: None,
                product_id: product.id,
                sku_number: Some(a.sku_number.clone()),
                slug: None,
                price_details: Vec::new(),
                attribute_values: Vec::new(),
            },
        )
        .await;
    assert_matches!(taken, Err(ServiceError::Conflict(_)));
}
