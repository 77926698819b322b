pub mod attributes;
pub mod categories;
pub mod pricing;
pub mod products;
pub mod skus;
pub mod suppliers;

pub use attributes::AttributeService;
pub use categories::CategoryService;
pub use pricing::PricingService;
pub use products::ProductService;
pub use skus::SkuService;
pub use suppliers::SupplierService;
