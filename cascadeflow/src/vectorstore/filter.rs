//! Chroma-style metadata filters.
//!
//! ```text
//! {"category": "Laptop"}                                  equality
//! {"price": {"$lte": 1000.0}}                             comparison
//! {"category": {"$in": ["Laptop", "Watch"]}}              membership
//! {"$and": [{...}, {...}]}, {"$or": [{...}, {...}]}       combinators
//! {"$contains": "China"}                                  document text
//! ```

use crate::errors::VectorStoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A comparison operator on a metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `$eq`
    Eq,
    /// `$ne`
    Ne,
    /// `$gt`; numbers compare numerically, strings lexically.
    Gt,
    /// `$gte`
    Gte,
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
}

impl Comparison {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "$eq" => Some(Self::Eq),
            "$ne" => Some(Self::Ne),
            "$gt" => Some(Self::Gt),
            "$gte" => Some(Self::Gte),
            "$lt" => Some(Self::Lt),
            "$lte" => Some(Self::Lte),
            _ => None,
        }
    }

    const fn operator(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }
}

/// A parsed metadata filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum MetadataFilter {
    /// Compare a metadata field to a value.
    Compare {
        /// Metadata field name.
        key: String,
        /// Operator.
        op: Comparison,
        /// Right-hand side.
        value: Value,
    },
    /// Field value is one of the listed values.
    In {
        /// Metadata field name.
        key: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Field value is none of the listed values.
    NotIn {
        /// Metadata field name.
        key: String,
        /// Rejected values.
        values: Vec<Value>,
    },
    /// Document text contains the substring.
    Contains(String),
    /// All sub-filters match.
    And(Vec<MetadataFilter>),
    /// At least one sub-filter matches.
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    /// Equality on a metadata field.
    #[must_use]
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, Comparison::Eq, value)
    }

    /// Comparison on a metadata field.
    #[must_use]
    pub fn compare(key: impl Into<String>, op: Comparison, value: impl Into<Value>) -> Self {
        Self::Compare {
            key: key.into(),
            op,
            value: value.into(),
        }
    }

    /// Document substring match.
    #[must_use]
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    /// Parses a filter from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `VectorStoreError::InvalidFilter` for unknown operators or
    /// malformed operands.
    pub fn parse(value: &Value) -> Result<Self, VectorStoreError> {
        let Value::Object(map) = value else {
            return Err(invalid("filter must be a JSON object"));
        };
        if map.is_empty() {
            return Err(invalid("filter must not be empty"));
        }

        let mut clauses = map
            .iter()
            .map(|(key, operand)| parse_clause(key, operand))
            .collect::<Result<Vec<_>, _>>()?;

        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(Self::And(clauses))
        }
    }

    /// Tests a record's metadata and document against the filter.
    ///
    /// A missing field only satisfies `$ne` and `$nin`.
    #[must_use]
    pub fn matches(&self, metadata: &Value, document: Option<&str>) -> bool {
        match self {
            Self::Compare { key, op, value } => match metadata.get(key) {
                Some(actual) => compare(actual, *op, value),
                None => *op == Comparison::Ne,
            },
            Self::In { key, values } => metadata
                .get(key)
                .is_some_and(|actual| values.iter().any(|v| loosely_equal(actual, v))),
            Self::NotIn { key, values } => metadata
                .get(key)
                .map_or(true, |actual| !values.iter().any(|v| loosely_equal(actual, v))),
            Self::Contains(text) => document.is_some_and(|doc| doc.contains(text.as_str())),
            Self::And(filters) => filters.iter().all(|f| f.matches(metadata, document)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(metadata, document)),
        }
    }

    /// Returns the JSON form of the filter.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        match self {
            Self::Compare { key, op, value } => {
                let mut inner = Map::new();
                inner.insert(op.operator().to_string(), value.clone());
                map.insert(key.clone(), Value::Object(inner));
            }
            Self::In { key, values } => {
                map.insert(key.clone(), serde_json::json!({ "$in": values }));
            }
            Self::NotIn { key, values } => {
                map.insert(key.clone(), serde_json::json!({ "$nin": values }));
            }
            Self::Contains(text) => {
                map.insert("$contains".to_string(), Value::String(text.clone()));
            }
            Self::And(filters) => {
                map.insert("$and".to_string(), Value::Array(filters.iter().map(Self::to_json).collect()));
            }
            Self::Or(filters) => {
                map.insert("$or".to_string(), Value::Array(filters.iter().map(Self::to_json).collect()));
            }
        }
        Value::Object(map)
    }
}

impl TryFrom<Value> for MetadataFilter {
    type Error = VectorStoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MetadataFilter> for Value {
    fn from(filter: MetadataFilter) -> Self {
        filter.to_json()
    }
}

fn invalid(message: impl Into<String>) -> VectorStoreError {
    VectorStoreError::InvalidFilter(message.into())
}

fn parse_clause(key: &str, operand: &Value) -> Result<MetadataFilter, VectorStoreError> {
    match key {
        "$and" | "$or" => {
            let Value::Array(items) = operand else {
                return Err(invalid(format!("{key} expects an array")));
            };
            if items.is_empty() {
                return Err(invalid(format!("{key} expects at least one filter")));
            }
            let filters = items
                .iter()
                .map(MetadataFilter::parse)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if key == "$and" {
                MetadataFilter::And(filters)
            } else {
                MetadataFilter::Or(filters)
            })
        }
        "$contains" => operand
            .as_str()
            .map(MetadataFilter::contains)
            .ok_or_else(|| invalid("$contains expects a string")),
        op if op.starts_with('$') => Err(invalid(format!("unknown operator '{op}'"))),
        field => parse_field(field, operand),
    }
}

fn parse_field(field: &str, operand: &Value) -> Result<MetadataFilter, VectorStoreError> {
    let Value::Object(ops) = operand else {
        return Ok(MetadataFilter::eq(field, operand.clone()));
    };
    if ops.len() != 1 {
        return Err(invalid(format!("field '{field}' expects exactly one operator")));
    }

    let (op, value) = ops
        .iter()
        .next()
        .ok_or_else(|| invalid(format!("field '{field}' expects exactly one operator")))?;

    match op.as_str() {
        "$in" | "$nin" => {
            let Value::Array(values) = value else {
                return Err(invalid(format!("{op} expects an array")));
            };
            Ok(if op == "$in" {
                MetadataFilter::In {
                    key: field.to_string(),
                    values: values.clone(),
                }
            } else {
                MetadataFilter::NotIn {
                    key: field.to_string(),
                    values: values.clone(),
                }
            })
        }
        other => Comparison::parse(other)
            .map(|cmp| MetadataFilter::compare(field, cmp, value.clone()))
            .ok_or_else(|| invalid(format!("unknown operator '{other}'"))),
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare(actual: &Value, op: Comparison, expected: &Value) -> bool {
    match op {
        Comparison::Eq => loosely_equal(actual, expected),
        Comparison::Ne => !loosely_equal(actual, expected),
        Comparison::Gt => ordering(actual, expected) == Some(Ordering::Greater),
        Comparison::Gte => matches!(ordering(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        Comparison::Lt => ordering(actual, expected) == Some(Ordering::Less),
        Comparison::Lte => matches!(ordering(actual, expected), Some(Ordering::Less | Ordering::Equal)),
    }
}
