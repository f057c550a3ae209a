//! Query specification and in-memory evaluation
//!
//! A [`Query`] describes the filter/sort/limit shape sent to a storage tier:
//! one optional `where` clause, one optional ordering field, and an optional
//! limit, all composable. Filter values are restricted to strings and
//! numbers; comparisons across types never match.
//!
//! Tiers are free to evaluate queries natively. [`Query::apply`] is the
//! reference evaluation used by in-process clients.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Doc;

/// Comparison operator for a `where` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl FilterOp {
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Ge => ordering != Ordering::Less,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Le => ordering != Ordering::Greater,
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
        };
        write!(f, "{}", symbol)
    }
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(FilterOp::Eq),
            "!=" => Ok(FilterOp::Ne),
            ">" => Ok(FilterOp::Gt),
            ">=" => Ok(FilterOp::Ge),
            "<" => Ok(FilterOp::Lt),
            "<=" => Ok(FilterOp::Le),
            other => Err(format!("unknown filter operator: '{}'", other)),
        }
    }
}

/// A filterable value: strings and numbers only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Num(f64),
}

impl FieldValue {
    /// Compare a document field against this value
    ///
    /// Returns `None` when the types differ; a mismatched comparison never
    /// matches any operator.
    fn compare(&self, field: &Value) -> Option<Ordering> {
        match (field, self) {
            (Value::String(a), FieldValue::Str(b)) => Some(a.as_str().cmp(b.as_str())),
            (Value::Number(a), FieldValue::Num(b)) => a.as_f64().and_then(|a| a.partial_cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Num(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Num(n as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Num(n as f64)
    }
}

/// A single `where` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Whether a document satisfies this clause
    pub fn matches(&self, doc: &Doc) -> bool {
        doc.lookup(&self.field)
            .and_then(|field| self.value.compare(&field))
            .map(|ordering| self.op.accepts(ordering))
            .unwrap_or(false)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filter/sort/limit specification for collection reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,

    #[serde(default)]
    pub order: SortOrder,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `where` clause
    pub fn where_field(
        mut self,
        field: impl Into<String>,
        op: FilterOp,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.filter = Some(Filter::new(field, op, value));
        self
    }

    /// Order results by a field, ascending unless [`descending`](Self::descending)
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Desc;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document satisfies the `where` clause (or there is none)
    pub fn matches(&self, doc: &Doc) -> bool {
        self.filter.as_ref().map(|f| f.matches(doc)).unwrap_or(true)
    }

    /// Reference evaluation: filter, then sort, then limit
    pub fn apply(&self, docs: Vec<Doc>) -> Vec<Doc> {
        let mut result: Vec<Doc> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some(ref field) = self.order_by {
            result.sort_by(|a, b| {
                let ordering = compare_fields(a.lookup(field), b.lookup(field));
                match self.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            result.truncate(limit);
        }

        result
    }
}

/// Total order over optional field values for sorting
///
/// Missing fields sort first; type-mismatched pairs fall back to equal,
/// keeping the sort stable.
fn compare_fields(a: Option<Value>, b: Option<Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(&a, &b).unwrap_or(Ordering::Equal),
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64().and_then(|a| b.as_f64().and_then(|b| a.partial_cmp(&b)))
        }
        _ => None,
    }
}
