//! Structural data references.
//!
//! A [`Reference`] describes *what* to watch or read: a single document, or a
//! filtered and ordered collection query. References are plain values. Two
//! references are the same subscription target exactly when they are `==`,
//! which compares collection, id, filters, ordering and limit.

use crate::error::{BindError, Result};
use crate::types::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// A document locator or a collection query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reference {
    Document { collection: String, id: String },
    Query(Query),
}

/// Collection query: filters are ANDed, ordering clauses apply in sequence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

/// A single `(field, operator, value)` clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    ArrayContains,
    In,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Reference {
    /// Locate a single document.
    pub fn document(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Reference::Document {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Start a query over a whole collection.
    pub fn collection(collection: impl Into<String>) -> Query {
        Query {
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// Name of the collection this reference points into.
    pub fn collection_name(&self) -> &str {
        match self {
            Reference::Document { collection, .. } => collection,
            Reference::Query(q) => &q.collection,
        }
    }

    /// Whether this names a single document.
    pub fn is_document(&self) -> bool {
        matches!(self, Reference::Document { .. })
    }

    /// Reject malformed locators before any watch or read is issued.
    pub fn validate(&self) -> Result<()> {
        validate_segment("collection name", self.collection_name())?;
        match self {
            Reference::Document { id, .. } => validate_segment("document id", id),
            Reference::Query(q) => {
                for filter in &q.filters {
                    if filter.field.is_empty() {
                        return Err(BindError::InvalidReference(
                            "filter field is empty".into(),
                        ));
                    }
                    if filter.op == FilterOp::In && !filter.value.is_array() {
                        return Err(BindError::InvalidReference(format!(
                            "'in' filter on {} needs an array value",
                            filter.field
                        )));
                    }
                }
                if q.order_by.iter().any(|o| o.field.is_empty()) {
                    return Err(BindError::InvalidReference(
                        "order-by field is empty".into(),
                    ));
                }
                if q.limit == Some(0) {
                    return Err(BindError::InvalidReference("limit must be positive".into()));
                }
                Ok(())
            }
        }
    }

    /// Stable hex digest of the reference's structure.
    ///
    /// Structurally equal references always share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        hex::encode(hasher.finalize())
    }

    /// Whether a record from this reference's collection belongs to its result.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Reference::Document { id, .. } => record.id == *id,
            Reference::Query(q) => q.matches(record),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Document { collection, id } => write!(f, "{}/{}", collection, id),
            Reference::Query(q) => {
                write!(f, "{}?", q.collection)?;
                for filter in &q.filters {
                    write!(f, "[{} {:?} {}]", filter.field, filter.op, filter.value)?;
                }
                for order in &q.order_by {
                    write!(f, "[order {} {:?}]", order.field, order.direction)?;
                }
                if let Some(limit) = q.limit {
                    write!(f, "[limit {}]", limit)?;
                }
                Ok(())
            }
        }
    }
}

fn validate_segment(what: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(BindError::InvalidReference(format!("{} is empty", what)));
    }
    if segment.contains('/') {
        return Err(BindError::InvalidReference(format!(
            "{} '{}' contains '/'",
            what, segment
        )));
    }
    Ok(())
}

impl Query {
    /// Add a filter clause.
    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Add an ordering clause.
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Cap the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
            && self.order_by.iter().all(|o| record.get(&o.field).is_some())
    }

    /// Apply filters, ordering and limit to a set of candidate records.
    ///
    /// Records missing an order-by field are excluded. Ties fall back to
    /// document id so results are deterministic.
    pub fn evaluate(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut result: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();

        result.sort_by(|a, b| {
            for order in &self.order_by {
                let ord = total_cmp(a.get(&order.field), b.get(&order.field));
                let ord = match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.id.cmp(&b.id)
        });

        if let Some(limit) = self.limit {
            result.truncate(limit);
        }
        result
    }
}

impl From<Query> for Reference {
    fn from(q: Query) -> Self {
        Reference::Query(q)
    }
}

impl Filter {
    fn matches(&self, record: &Record) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::NotEq => !values_equal(actual, &self.value),
            FilterOp::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Le => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => compare_values(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Ge => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::ArrayContains => actual
                .as_array()
                .map(|items| items.iter().any(|v| values_equal(v, &self.value)))
                .unwrap_or(false),
            FilterOp::In => self
                .value
                .as_array()
                .map(|items| items.iter().any(|v| values_equal(actual, v)))
                .unwrap_or(false),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Compare two values of the same kind. Mixed kinds are incomparable.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

fn total_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y)
            .unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Caches a value derived from structural inputs.
///
/// The value is recomputed only when the inputs compare unequal to the ones
/// it was last computed from, so repeated evaluation with the same inputs
/// yields the same reference and never causes a resubscribe.
#[derive(Debug)]
pub struct Memo<I, V> {
    cached: Option<(I, V)>,
}

impl<I: PartialEq + Clone, V: Clone> Memo<I, V> {
    pub fn new() -> Self {
        Self { cached: None }
    }

    /// Return the cached value for `inputs`, computing it on first use or
    /// when `inputs` changed.
    pub fn get(&mut self, inputs: &I, compute: impl FnOnce(&I) -> V) -> V {
        match &self.cached {
            Some((cached_inputs, value)) if cached_inputs == inputs => value.clone(),
            _ => {
                let value = compute(inputs);
                self.cached = Some((inputs.clone(), value.clone()));
                value
            }
        }
    }
}

impl<I: PartialEq + Clone, V: Clone> Default for Memo<I, V> {
    fn default() -> Self {
        Self::new()
    }
}
