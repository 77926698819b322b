//! Generic filter/sort/pagination engine.
//!
//! A raw list request is parsed into a normalized [`QueryPlan`] (pure,
//! validated) which [`engine`] then applies against any audited entity,
//! including dotted one-hop paths and dynamic attribute fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::config::CatalogConfig;
use crate::errors::ServiceError;

pub mod engine;
pub mod targets;

pub use engine::{build_select, paginate, unresolved_names};

/// Sort direction, ascending by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Comparison operators accepted in filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive substring match
    Like,
}

impl FilterOp {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "eq" => Some(FilterOp::Eq),
            "ne" => Some(FilterOp::Ne),
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "like" => Some(FilterOp::Like),
            _ => None,
        }
    }
}

/// A parsed field path.
///
/// `Name` may address a native column or a dynamic attribute code; which one
/// is decided against the target entity at apply time. `Related` is a
/// one-hop dotted path into a related entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    Name(String),
    Related { relation: String, column: String },
}

impl FromStr for FieldPath {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(ServiceError::InvalidFilter(
                "field path cannot be empty".to_string(),
            ));
        }
        // The active-only gate is ANDed in by the engine and may not be
        // addressed by the raw expression.
        if raw == "is_active" {
            return Err(ServiceError::InvalidFilter(
                "'is_active' is not an addressable field".to_string(),
            ));
        }
        let mut parts = raw.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, _) => Ok(FieldPath::Name(name.to_string())),
            (Some(relation), Some(column), None) if !relation.is_empty() && !column.is_empty() => {
                Ok(FieldPath::Related {
                    relation: relation.to_string(),
                    column: column.to_string(),
                })
            }
            _ => Err(ServiceError::InvalidFilter(format!(
                "field path '{}' is not addressable (at most one dot)",
                raw
            ))),
        }
    }
}

/// One normalized comparison from the raw filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub path: FieldPath,
    pub op: FilterOp,
    pub value: Value,
}

/// Normalized sort request.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub path: FieldPath,
    pub order: SortOrder,
}

/// Inbound list request, as the surrounding transport layer hands it over.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    /// Field path -> literal (implicit equality) or {operator: operand}
    #[serde(default)]
    pub filter: BTreeMap<String, Value>,

    #[serde(default)]
    pub sort_field: Option<String>,

    #[serde(default)]
    pub order_rule: SortOrder,

    /// 1-indexed page number
    #[serde(default)]
    pub page: Option<u64>,

    #[serde(default)]
    pub limit: Option<u64>,
}

/// Validated, normalized query plan. Every list read goes through one.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub predicates: Vec<Predicate>,
    pub sort: Option<SortSpec>,
    pub page: u64,
    pub limit: u64,
    /// Administrative contexts only; never settable from the raw expression
    pub include_inactive: bool,
}

impl QueryPlan {
    /// Parses and validates a raw list request.
    ///
    /// Unknown operators, malformed paths and out-of-range pagination fail
    /// with InvalidFilter; the page size is clamped to the configured
    /// maximum.
    pub fn parse(params: &ListParams, catalog: &CatalogConfig) -> Result<Self, ServiceError> {
        let mut predicates = Vec::new();
        for (raw_path, raw_value) in &params.filter {
            let path = FieldPath::from_str(raw_path)?;
            match raw_value {
                Value::Object(ops) => {
                    if ops.is_empty() {
                        return Err(ServiceError::InvalidFilter(format!(
                            "filter on '{}' has no operators",
                            raw_path
                        )));
                    }
                    for (key, operand) in ops {
                        let op = FilterOp::from_key(key).ok_or_else(|| {
                            ServiceError::InvalidFilter(format!(
                                "unsupported operator '{}' on field '{}'",
                                key, raw_path
                            ))
                        })?;
                        predicates.push(Predicate {
                            path: path.clone(),
                            op,
                            value: check_scalar(raw_path, operand)?.clone(),
                        });
                    }
                }
                scalar => predicates.push(Predicate {
                    path: path.clone(),
                    op: FilterOp::Eq,
                    value: check_scalar(raw_path, scalar)?.clone(),
                }),
            }
        }

        let sort = params
            .sort_field
            .as_deref()
            .map(|raw| {
                Ok::<_, ServiceError>(SortSpec {
                    path: FieldPath::from_str(raw)?,
                    order: params.order_rule,
                })
            })
            .transpose()?;

        let page = params.page.unwrap_or(1);
        if page < 1 {
            return Err(ServiceError::InvalidFilter(
                "page must be >= 1".to_string(),
            ));
        }

        let limit = params.limit.unwrap_or(catalog.default_page_size);
        if limit < 1 {
            return Err(ServiceError::InvalidFilter(
                "limit must be >= 1".to_string(),
            ));
        }
        let limit = limit.min(catalog.max_page_size);

        Ok(Self {
            predicates,
            sort,
            page,
            limit,
            include_inactive: false,
        })
    }

    /// Administrative variant including soft-deleted rows.
    pub fn with_inactive(mut self) -> Self {
        self.include_inactive = true;
        self
    }
}

fn check_scalar<'a>(path: &str, value: &'a Value) -> Result<&'a Value, ServiceError> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => Err(ServiceError::InvalidFilter(
            format!("filter value for '{}' must be a scalar", path),
        )),
        _ => Ok(value),
    }
}

/// Pagination metadata returned with every page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl PageMeta {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(limit),
        }
    }
}

/// Result envelope: one page of data plus its metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}
