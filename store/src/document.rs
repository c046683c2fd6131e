use std::{cmp::Ordering, error::Error, future::Future};

use serde_json::{Map, Value};

pub type Document = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    In(Vec<Value>),
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.get(&self.field) else {
            return false;
        };
        match &self.op {
            FilterOp::Eq(v) => compare_values(actual, v) == Some(Ordering::Equal),
            FilterOp::In(vs) => vs
                .iter()
                .any(|v| compare_values(actual, v) == Some(Ordering::Equal)),
            FilterOp::Lt(v) => compare_values(actual, v) == Some(Ordering::Less),
            FilterOp::Le(v) => matches!(
                compare_values(actual, v),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt(v) => compare_values(actual, v) == Some(Ordering::Greater),
            FilterOp::Ge(v) => matches!(
                compare_values(actual, v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

/// Orders two field values of the same kind. Values of different kinds are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Equality/range filters, an optional ordering and an optional limit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq(value.into()))
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Number of constraints a backing index has to serve
    pub fn complexity(&self) -> usize {
        self.filters.len() + usize::from(self.order_by.is_some())
    }
}

/// A document database: documents grouped in collections and keyed by id.
pub trait DocumentStore: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send;

    /// Merges `fields` into the document, creating it when absent.
    fn set_merge(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Atomically adds `by` to a numeric field, creating document and field when absent.
    fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        by: i64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Appends a document under a store-assigned id and returns that id.
    fn add(
        &self,
        collection: &str,
        fields: Document,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;

    fn query(
        &self,
        collection: &str,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<(String, Document)>, Self::Error>> + Send;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn range_filters_compare_numbers_and_strings() {
        let d = doc(json!({ "views": 5, "userId": "bob" }));
        assert!(Filter { field: "views".into(), op: FilterOp::Ge(json!(5)) }.matches(&d));
        assert!(!Filter { field: "views".into(), op: FilterOp::Gt(json!(5.0)) }.matches(&d));
        assert!(Filter { field: "userId".into(), op: FilterOp::Lt(json!("carol")) }.matches(&d));
        assert!(Filter {
            field: "userId".into(),
            op: FilterOp::In(vec![json!("alice"), json!("bob")])
        }
        .matches(&d));
    }

    #[test]
    fn mismatched_kinds_and_missing_fields_never_match() {
        let d = doc(json!({ "views": 5 }));
        assert!(!Filter { field: "views".into(), op: FilterOp::Eq(json!("5")) }.matches(&d));
        assert!(!Filter { field: "likes".into(), op: FilterOp::Ge(json!(0)) }.matches(&d));
    }

    #[test]
    fn complexity_counts_filters_and_ordering() {
        let q = Query::new()
            .eq("isPublic", true)
            .order_by("createdAt", Direction::Descending)
            .limit(10);
        assert_eq!(q.complexity(), 2);
        assert_eq!(Query::new().limit(3).complexity(), 0);
    }
}
