use proptest::prelude::*;

use catalog_api::config::CatalogConfig;
use catalog_api::query::{ListParams, PageMeta, QueryPlan};
use catalog_api::services::categories::slugify;

proptest! {
    /// Slugs only ever contain lowercase alphanumerics and single hyphens,
    /// never at the edges.
    #[test]
    fn slugs_are_normalized(name in ".{0,64}") {
        let slug = slugify(&name);
        prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
        prop_assert!(!slug.contains("--"));
    }

    /// Deriving a slug from its own output changes nothing.
    #[test]
    fn slugify_is_idempotent(name in "[a-zA-Z0-9 _-]{0,64}") {
        let once = slugify(&name);
        prop_assert_eq!(slugify(&once), once);
    }

    /// pages is always the ceiling of total/limit, and the last page is the
    /// only short one.
    #[test]
    fn meta_pages_is_the_ceiling(total in 0u64..100_000, limit in 1u64..500) {
        let meta = PageMeta::new(1, limit, total);
        prop_assert_eq!(meta.pages, (total + limit - 1) / limit);
        prop_assert!(meta.pages * limit >= total);
        prop_assert!(meta.pages == 0 || (meta.pages - 1) * limit < total);
    }

    /// Requested limits never escape the configured ceiling.
    #[test]
    fn plan_limit_is_clamped(limit in 1u64..100_000) {
        let catalog = CatalogConfig::default();
        let params = ListParams { limit: Some(limit), ..Default::default() };
        let plan = QueryPlan::parse(&params, &catalog).unwrap();
        prop_assert!(plan.limit >= 1 && plan.limit <= catalog.max_page_size);
        prop_assert!(plan.limit <= limit);
    }
}
