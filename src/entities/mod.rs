use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub mod attribute;
pub mod attribute_set;
pub mod attribute_set_attribute;
pub mod attribute_value;
pub mod category;
pub mod category_attribute_set;
pub mod category_type;
pub mod image;
pub mod price_detail;
pub mod pricelist;
pub mod product;
pub mod sku;
pub mod supplier;
pub mod user;

/// Owner kinds for polymorphic attachments (attribute values, images).
///
/// An explicit enumeration plus an owner id replaces a generic foreign key;
/// services validate the owner row exists before inserting.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "sku")]
    Sku,
}

crate::impl_audited_model!(attribute::Model);
crate::impl_audited_model!(attribute_set::Model);
crate::impl_audited_model!(attribute_set_attribute::Model);
crate::impl_audited_model!(attribute_value::Model);
crate::impl_audited_model!(category::Model);
crate::impl_audited_model!(category_attribute_set::Model);
crate::impl_audited_model!(category_type::Model);
crate::impl_audited_model!(image::Model);
crate::impl_audited_model!(price_detail::Model);
crate::impl_audited_model!(pricelist::Model);
crate::impl_audited_model!(product::Model);
crate::impl_audited_model!(sku::Model);
crate::impl_audited_model!(supplier::Model);
