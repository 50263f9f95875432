//! Query construction for document lists and counts
//!
//! A `Query` is backend-neutral: the memory store evaluates it directly
//! against documents, the SQLite store compiles it to SQL and the REST
//! store renders it as OData `$filter`/`$orderby` parameters.

use super::Document;
use chrono::SecondsFormat;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    // Comparison operators
    Eq(String, FilterValue),
    Ne(String, FilterValue),
    Gt(String, FilterValue),
    Ge(String, FilterValue),
    Lt(String, FilterValue),
    Le(String, FilterValue),

    /// Field holds an array containing the value
    ArrayContains(String, FilterValue),
    /// Field equals one of the values
    In(String, Vec<FilterValue>),

    // Logical operators
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Null,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Gt(field.into(), value.into())
    }

    pub fn ge(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Ge(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    pub fn le(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Le(field.into(), value.into())
    }

    pub fn array_contains(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::ArrayContains(field.into(), value.into())
    }

    pub fn is_in<V: Into<FilterValue>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    pub fn not(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Evaluate against a stored document
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(field, value) => compare_field(doc, field, value) == Some(Ordering::Equal),
            Filter::Ne(field, value) => compare_field(doc, field, value) != Some(Ordering::Equal),
            Filter::Gt(field, value) => compare_field(doc, field, value) == Some(Ordering::Greater),
            Filter::Ge(field, value) => matches!(
                compare_field(doc, field, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::Lt(field, value) => compare_field(doc, field, value) == Some(Ordering::Less),
            Filter::Le(field, value) => matches!(
                compare_field(doc, field, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::ArrayContains(field, value) => {
                let needle = value.to_json();
                match field_value(doc, field) {
                    Some(Value::Array(items)) => items
                        .iter()
                        .any(|item| compare_values(item, &needle) == Some(Ordering::Equal)),
                    _ => false,
                }
            }
            Filter::In(field, values) => values
                .iter()
                .any(|value| compare_field(doc, field, value) == Some(Ordering::Equal)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Not(filter) => !filter.matches(doc),
        }
    }

    /// Convert filter to OData query string
    pub fn to_odata_string(&self) -> String {
        match self {
            Filter::Eq(field, value) => format!("{} eq {}", field, value.to_odata_string()),
            Filter::Ne(field, value) => format!("{} ne {}", field, value.to_odata_string()),
            Filter::Gt(field, value) => format!("{} gt {}", field, value.to_odata_string()),
            Filter::Ge(field, value) => format!("{} ge {}", field, value.to_odata_string()),
            Filter::Lt(field, value) => format!("{} lt {}", field, value.to_odata_string()),
            Filter::Le(field, value) => format!("{} le {}", field, value.to_odata_string()),

            Filter::ArrayContains(field, value) => {
                format!("{}/any(x: x eq {})", field, value.to_odata_string())
            }
            Filter::In(field, values) => {
                let items: Vec<String> = values.iter().map(|v| v.to_odata_string()).collect();
                format!("{} in ({})", field, items.join(", "))
            }

            Filter::And(filters) => {
                let filter_strings: Vec<String> = filters.iter().map(|f| f.to_odata_string()).collect();
                format!("({})", filter_strings.join(" and "))
            }
            Filter::Or(filters) => {
                let filter_strings: Vec<String> = filters.iter().map(|f| f.to_odata_string()).collect();
                format!("({})", filter_strings.join(" or "))
            }
            Filter::Not(filter) => format!("not ({})", filter.to_odata_string()),
        }
    }
}

impl FilterValue {
    pub fn to_odata_string(&self) -> String {
        match self {
            FilterValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            FilterValue::Number(n) => n.to_string(),
            FilterValue::Integer(i) => i.to_string(),
            FilterValue::Boolean(b) => b.to_string(),
            FilterValue::Null => "null".to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::String(s) => Value::String(s.clone()),
            FilterValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FilterValue::Integer(i) => Value::from(*i),
            FilterValue::Boolean(b) => Value::Bool(*b),
            FilterValue::Null => Value::Null,
        }
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::String(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<&String> for FilterValue {
    fn from(value: &String) -> Self {
        FilterValue::String(value.clone())
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Integer(value as i64)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    Asc(String),
    Desc(String),
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self::Asc(field.into())
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::Desc(field.into())
    }

    pub fn field(&self) -> &str {
        match self {
            OrderBy::Asc(field) | OrderBy::Desc(field) => field,
        }
    }

    pub fn is_desc(&self) -> bool {
        matches!(self, OrderBy::Desc(_))
    }

    /// Convert to OData orderby string
    pub fn to_odata_string(&self) -> String {
        match self {
            OrderBy::Asc(field) => format!("{} asc", field),
            OrderBy::Desc(field) => format!("{} desc", field),
        }
    }
}

/// Helper to combine multiple OrderBy clauses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderByClause {
    clauses: Vec<OrderBy>,
}

impl OrderByClause {
    pub fn new() -> Self {
        Self { clauses: Vec::new() }
    }

    pub fn add(mut self, order: OrderBy) -> Self {
        self.clauses.push(order);
        self
    }

    pub fn clauses(&self) -> &[OrderBy] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn to_odata_string(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            let order_strings: Vec<String> = self.clauses.iter().map(|o| o.to_odata_string()).collect();
            Some(order_strings.join(", "))
        }
    }

    /// Compare two documents; ties fall back to id so ordering is total
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for clause in &self.clauses {
            let left = field_value(a, clause.field());
            let right = field_value(b, clause.field());
            let ordering = compare_optional(left.as_ref(), right.as_ref());
            let ordering = if clause.is_desc() { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    }
}

/// Filter, ordering and limit for a list or count
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub orderby: OrderByClause,
    pub limit: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match everything, unordered apart from the id tie-break
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a filter; repeated calls are combined with `and`
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            None => filter,
            Some(Filter::And(mut filters)) => {
                filters.push(filter);
                Filter::And(filters)
            }
            Some(existing) => Filter::And(vec![existing, filter]),
        });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filter(Filter::eq(field, value))
    }

    pub fn orderby(mut self, order: OrderBy) -> Self {
        self.orderby = self.orderby.add(order);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(doc))
    }

    /// OData-style query parameters for the REST backend
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(filter) = &self.filter {
            params.push(("$filter".to_string(), filter.to_odata_string()));
        }
        if let Some(orderby) = self.orderby.to_odata_string() {
            params.push(("$orderby".to_string(), orderby));
        }
        if let Some(limit) = self.limit {
            params.push(("$top".to_string(), limit.to_string()));
        }
        params
    }
}

// Convenience methods for common patterns
impl Query {
    /// Stable alphabetical listing
    pub fn by_name() -> Self {
        Self::new().orderby(OrderBy::asc("name"))
    }

    /// Recency view
    pub fn newest_first() -> Self {
        Self::new().orderby(OrderBy::desc("createdAt"))
    }
}

/// Resolve a field, including the store-owned `id`/`createdAt`/`updatedAt`
pub(crate) fn field_value(doc: &Document, field: &str) -> Option<Value> {
    match field {
        "id" => Some(Value::String(doc.id.clone())),
        "createdAt" => Some(Value::String(
            doc.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        )),
        "updatedAt" => Some(Value::String(
            doc.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        )),
        _ => doc.data.get(field).cloned(),
    }
}

fn compare_field(doc: &Document, field: &str, value: &FilterValue) -> Option<Ordering> {
    let expected = value.to_json();
    match field_value(doc, field) {
        Some(actual) => compare_values(&actual, &expected),
        None if expected.is_null() => Some(Ordering::Equal),
        None => None,
    }
}

/// Compare JSON scalars of the same kind; mixed kinds are incomparable
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Sorting order: missing and null first, then by value
fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}
