use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;

/// Closed set of attribute value types.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    #[sea_orm(string_value = "text")]
    Text,
    #[sea_orm(string_value = "integer")]
    Integer,
    #[sea_orm(string_value = "decimal")]
    Decimal,
    #[sea_orm(string_value = "boolean")]
    Boolean,
    #[sea_orm(string_value = "date")]
    Date,
    #[sea_orm(string_value = "enum")]
    Enum,
}

/// A value coerced to its attribute's declared data type.
///
/// Decimal and date variants keep their exact lexical form through storage,
/// so `19.99` reads back as `19.99`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypedValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    Choice(String),
}

impl TypedValue {
    /// Canonical string payload written to the value column.
    pub fn storage_value(&self) -> String {
        match self {
            TypedValue::Text(s) | TypedValue::Choice(s) => s.clone(),
            TypedValue::Integer(i) => i.to_string(),
            TypedValue::Decimal(d) => d.to_string(),
            TypedValue::Boolean(b) => b.to_string(),
            TypedValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Attribute definition: a typed, machine-keyed declaration that entities
/// may carry values for.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "attributes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[validate(length(min = 1, max = 50))]
    pub name: String,

    /// Stable machine key, unique across all attributes
    #[sea_orm(unique)]
    #[validate(length(min = 1, max = 50))]
    pub code: String,

    pub data_type: DataType,

    #[validate(length(max = 15))]
    pub unit_of_measure: Option<String>,

    /// Allowed values for `DataType::Enum` attributes, as a JSON array of
    /// strings; null for every other data type
    pub choices: Option<Json>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub is_active: bool,
    pub sequence: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attribute_set_attribute::Entity")]
    AttributeSetAttributes,

    #[sea_orm(has_many = "super::attribute_value::Entity")]
    AttributeValues,
}

impl Related<super::attribute_value::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttributeValues.def()
    }
}

impl Related<super::attribute_set::Entity> for Entity {
    fn to() -> RelationDef {
        super::attribute_set_attribute::Relation::AttributeSet.def()
    }

    fn via() -> Option<RelationDef> {
        Some(
            super::attribute_set_attribute::Relation::Attribute
                .def()
                .rev(),
        )
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Allowed choice values for an enum attribute.
    pub fn choice_list(&self) -> Vec<String> {
        self.choices
            .as_ref()
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Coerces a raw JSON value to this attribute's declared data type.
    ///
    /// Numbers are coerced through their lexical rendering so decimals keep
    /// their exact digits. Fails with TypeMismatch when the raw value does
    /// not fit the declared type.
    pub fn coerce(&self, raw: &serde_json::Value) -> Result<TypedValue, ServiceError> {
        match raw {
            serde_json::Value::String(s) => self.coerce_str(s),
            serde_json::Value::Number(n) => match self.data_type {
                DataType::Integer | DataType::Decimal => self.coerce_str(&n.to_string()),
                _ => Err(self.mismatch(&n.to_string())),
            },
            serde_json::Value::Bool(b) => match self.data_type {
                DataType::Boolean => Ok(TypedValue::Boolean(*b)),
                _ => Err(self.mismatch(&b.to_string())),
            },
            _ => Err(ServiceError::TypeMismatch(format!(
                "attribute '{}' does not accept {} values",
                self.code,
                json_kind(raw)
            ))),
        }
    }

    /// Coerces the stored (or raw) string payload to the declared type.
    pub fn coerce_str(&self, raw: &str) -> Result<TypedValue, ServiceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "value for attribute '{}' cannot be empty",
                self.code
            )));
        }

        match self.data_type {
            DataType::Text => Ok(TypedValue::Text(trimmed.to_string())),
            DataType::Integer => trimmed
                .parse::<i64>()
                .map(TypedValue::Integer)
                .map_err(|_| self.mismatch(trimmed)),
            DataType::Decimal => Decimal::from_str(trimmed)
                .map(TypedValue::Decimal)
                .map_err(|_| self.mismatch(trimmed)),
            DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Ok(TypedValue::Boolean(true)),
                "false" => Ok(TypedValue::Boolean(false)),
                _ => Err(self.mismatch(trimmed)),
            },
            DataType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(TypedValue::Date)
                .map_err(|_| self.mismatch(trimmed)),
            DataType::Enum => {
                let choices = self.choice_list();
                if choices.iter().any(|c| c == trimmed) {
                    Ok(TypedValue::Choice(trimmed.to_string()))
                } else {
                    Err(ServiceError::TypeMismatch(format!(
                        "'{}' is not an allowed choice for attribute '{}' (allowed: {})",
                        trimmed,
                        self.code,
                        choices.join(", ")
                    )))
                }
            }
        }
    }

    fn mismatch(&self, raw: &str) -> ServiceError {
        ServiceError::TypeMismatch(format!(
            "value '{}' cannot be coerced to {} for attribute '{}'",
            raw, self.data_type, self.code
        ))
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
