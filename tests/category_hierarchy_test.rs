mod common;

use assert_matches::assert_matches;
use common::{actor, seed_category_type, seed_child_category, seed_root_category, TestApp};

use catalog_api::auditing::{ActorContext, AuditedModel};
use catalog_api::config::CatalogConfig;
use catalog_api::entities::category::{self, Entity as Category};
use catalog_api::errors::ServiceError;
use catalog_api::events::Event;
use catalog_api::services::categories::{CreateCategoryInput, UpdateCategoryInput};
use sea_orm::EntityTrait;
use uuid::Uuid;

#[tokio::test]
async fn create_derives_slug_and_stamps_audit_fields() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Hot Beverages").await;

    assert_eq!(root.slug, "hot-beverages");
    assert_eq!(root.created_by, Uuid::nil());
    assert_eq!(root.updated_by, Uuid::nil());
    assert!(root.updated_at >= root.created_at);
    assert!(root.is_active);
    assert_eq!(root.sequence, 1);

    // The shared audit contract is readable through the trait as well.
    assert_eq!(root.audit_id(), root.id);
    assert!(root.audit_is_active());
    assert_eq!(root.audit_created_by(), root.audit_updated_by());
}

#[tokio::test]
async fn sibling_slug_collision_appends_suffix() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Retail").await;

    let first = seed_child_category(&app, root.id, "Coffee").await;
    let second = seed_child_category(&app, root.id, "Coffee").await;
    assert_eq!(first.slug, "coffee");
    assert_eq!(second.slug, "coffee-1");

    let third = seed_child_category(&app, root.id, "Coffee").await;
    assert_eq!(third.slug, "coffee-2");
}

#[tokio::test]
async fn same_slug_is_allowed_in_different_scopes() {
    let app = TestApp::new().await;
    let left = seed_root_category(&app, "Food").await;
    let right = seed_root_category(&app, "Drink").await;

    let a = seed_child_category(&app, left.id, "Organic").await;
    let b = seed_child_category(&app, right.id, "Organic").await;
    assert_eq!(a.slug, "organic");
    assert_eq!(b.slug, "organic");
}

#[tokio::test]
async fn root_requires_type_and_child_must_not_have_one() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Retail").await;
    let category_type = seed_category_type(&app, "Another type").await;

    let no_type = app
        .state
        .categories
        .create_category(
            &actor(),
            CreateCategoryInput {
                name: "Orphan".to_string(),
                description: None,
                category_type_id: None,
                parent_id: None,
                slug: None,
            },
        )
        .await;
    assert_matches!(no_type, Err(ServiceError::ValidationError(_)));

    let typed_child = app
        .state
        .categories
        .create_category(
            &actor(),
            CreateCategoryInput {
                name: "Child".to_string(),
                description: None,
                category_type_id: Some(category_type.id),
                parent_id: Some(root.id),
                slug: None,
            },
        )
        .await;
    assert_matches!(typed_child, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn move_rejects_self_and_descendants() {
    let app = TestApp::new().await;
    let a = seed_root_category(&app, "A").await;
    let b = seed_child_category(&app, a.id, "B").await;
    let c = seed_child_category(&app, b.id, "C").await;

    let onto_self = app
        .state
        .categories
        .move_category(&actor(), a.id, Some(a.id))
        .await;
    assert_matches!(onto_self, Err(ServiceError::CycleError(_)));

    let under_own_descendant = app
        .state
        .categories
        .move_category(&actor(), a.id, Some(c.id))
        .await;
    assert_matches!(under_own_descendant, Err(ServiceError::CycleError(_)));

    // Nothing changed inside the aborted transaction.
    let reread = Category::find_by_id(a.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reread.parent_id, None);

    // A legal reparent: C directly under A.
    let moved = app
        .state
        .categories
        .move_category(&actor(), c.id, Some(a.id))
        .await
        .unwrap();
    assert_eq!(moved.parent_id, Some(a.id));
}

#[tokio::test]
async fn move_and_create_respect_max_depth() {
    let app = TestApp::with_catalog(CatalogConfig {
        max_depth: 3,
        ..Default::default()
    })
    .await;
    let root = seed_root_category(&app, "Root").await;
    let mid = seed_child_category(&app, root.id, "Mid").await;
    let leaf = seed_child_category(&app, mid.id, "Leaf").await;

    let too_deep = app
        .state
        .categories
        .create_category(
            &actor(),
            CreateCategoryInput {
                name: "Too deep".to_string(),
                description: None,
                category_type_id: None,
                parent_id: Some(leaf.id),
                slug: None,
            },
        )
        .await;
    assert_matches!(too_deep, Err(ServiceError::DepthExceeded(_)));

    // Moving a subtree that would push its deepest node past the limit.
    let other = seed_root_category(&app, "Other").await;
    let hanger = seed_child_category(&app, other.id, "Hanger").await;
    let deep_move = app
        .state
        .categories
        .move_category(&actor(), mid.id, Some(hanger.id))
        .await;
    assert_matches!(deep_move, Err(ServiceError::DepthExceeded(_)));
}

#[tokio::test]
async fn soft_delete_hides_subtree_without_touching_descendants() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Root").await;
    let a = seed_child_category(&app, root.id, "A").await;
    let a1 = seed_child_category(&app, a.id, "A1").await;
    let b = seed_child_category(&app, root.id, "B").await;

    app.state
        .categories
        .delete_category(&actor(), a.id)
        .await
        .unwrap();

    let active: Vec<Uuid> = app
        .state
        .categories
        .descendants(root.id, true)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(active, vec![b.id]);

    // The hidden child keeps its own active flag.
    let a1_reread = Category::find_by_id(a1.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert!(a1_reread.is_active);

    let all: Vec<Uuid> = app
        .state
        .categories
        .descendants(root.id, false)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert!(all.contains(&a.id) && all.contains(&a1.id) && all.contains(&b.id));

    // A soft-deleted starting node yields nothing in active traversal.
    assert!(app
        .state
        .categories
        .descendants(a.id, true)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn ancestors_run_root_first() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Root").await;
    let mid = seed_child_category(&app, root.id, "Mid").await;
    let leaf = seed_child_category(&app, mid.id, "Leaf").await;

    let path: Vec<Uuid> = app
        .state
        .categories
        .ancestors(leaf.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(path, vec![root.id, mid.id, leaf.id]);
}

#[tokio::test]
async fn rename_recomputes_slug_unless_pinned() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Root").await;
    let child = seed_child_category(&app, root.id, "Beans").await;

    let renamed = app
        .state
        .categories
        .update_category(
            &actor(),
            child.id,
            UpdateCategoryInput {
                name: Some("Green Beans".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.slug, "green-beans");

    let pinned = app
        .state
        .categories
        .update_category(
            &actor(),
            child.id,
            UpdateCategoryInput {
                name: Some("Roasted Beans".to_string()),
                slug: Some("legacy-beans".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(pinned.slug, "legacy-beans");
}

#[tokio::test]
async fn updates_restamp_provenance() {
    let mut app = TestApp::new().await;
    let root = seed_root_category(&app, "Root").await;

    // Drain seed events before asserting on the one we care about.
    while let Ok(event) = app.events.try_recv() {
        if matches!(event, Event::CategoryCreated(id) if id == root.id) {
            break;
        }
    }

    let editor = ActorContext::new(Uuid::new_v4());
    let updated = app
        .state
        .categories
        .update_category(
            &editor,
            root.id,
            UpdateCategoryInput {
                description: Some(Some("All products".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.created_by, Uuid::nil());
    assert_eq!(updated.updated_by, editor.actor_id);
    assert!(updated.updated_at >= updated.created_at);

    assert_matches!(app.events.try_recv(), Ok(Event::CategoryUpdated(id)) if id == root.id);
}

#[tokio::test]
async fn missing_category_is_not_found() {
    let app = TestApp::new().await;
    let missing = app.state.categories.get_category(Uuid::new_v4()).await;
    assert_matches!(missing, Err(ServiceError::NotFound(_)));

    let err = missing.unwrap_err();
    assert_eq!(err.code(), "RESOURCE_NOT_FOUND");
}

#[tokio::test]
async fn moving_child_to_root_requires_a_type() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Root").await;
    let child = seed_child_category(&app, root.id, "Child").await;

    let promoted = app
        .state
        .categories
        .move_category(&actor(), child.id, None)
        .await;
    assert_matches!(promoted, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn category_model_serializes_with_audit_columns() {
    let app = TestApp::new().await;
    let root = seed_root_category(&app, "Root").await;
    let json = serde_json::to_value(&root).unwrap();
    for key in ["id", "created_at", "updated_at", "created_by", "updated_by", "is_active", "sequence"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    let _: category::Model = serde_json::from_value(json).unwrap();
}
