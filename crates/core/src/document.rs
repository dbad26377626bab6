//! Document store trait: a hierarchical key-value store with ordered queries.
//!
//! The journal persists everything in nested collections:
//!
//! ```text
//! users/{user}/entries/{date_id}
//! users/{user}/models/{persona}/messages/{auto_id}
//! users/{user}/virtual_profile/{timestamp_iso}
//! ```
//!
//! A path alternates collection and document segments. Documents are JSON
//! objects. Queries run against a single collection and support field
//! filters, a single ordering field, and a limit: enough for "latest N" and
//! "since cutoff" reads.
//!
//! Query evaluation lives here ([`Query::apply`]) so every backend orders and
//! compares values identically. String values that parse as RFC 3339
//! timestamps compare as instants, not as text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;
use crate::error::StoreError;

/// A stored document body.
pub type Document = serde_json::Map<String, Value>;

/// Reference to a collection (odd number of path segments).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    segments: Vec<String>,
}

/// Reference to a document (even number of path segments).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    parent: CollectionRef,
    id: String,
}

impl CollectionRef {
    /// A top-level collection such as `users`.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    pub fn doc(&self, id: impl Into<String>) -> DocumentRef {
        DocumentRef {
            parent: self.clone(),
            id: id.into(),
        }
    }

    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Reject empty segments and segments containing `/`.
    pub fn validate(&self) -> Result<(), StoreError> {
        for segment in &self.segments {
            validate_segment(segment)?;
        }
        Ok(())
    }
}

impl DocumentRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> &CollectionRef {
        &self.parent
    }

    /// A nested collection under this document.
    pub fn collection(&self, name: impl Into<String>) -> CollectionRef {
        let mut segments = self.parent.segments.clone();
        segments.push(self.id.clone());
        segments.push(name.into());
        CollectionRef { segments }
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.parent.path(), self.id)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.parent.validate()?;
        validate_segment(&self.id)
    }
}

fn validate_segment(segment: &str) -> Result<(), StoreError> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StoreError::InvalidPath(format!(
            "segment {segment:?} must be non-empty and must not contain '/'"
        )));
    }
    Ok(())
}

/// How `set` treats an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole document.
    Overwrite,
    /// Deep-merge object fields into the existing document; arrays and
    /// scalars in the patch replace what was there.
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A single `field <op> value` predicate.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// A query against one collection.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluate the query over every document of a collection.
    ///
    /// Documents missing a filtered or ordered field are excluded. Ties on
    /// the ordering field are broken by document id in the same direction,
    /// so results are stable across backends.
    pub fn apply(&self, docs: Vec<Snapshot>) -> Vec<Snapshot> {
        let mut matched: Vec<Snapshot> = docs
            .into_iter()
            .filter(|snap| self.filters.iter().all(|f| f.matches(&snap.data)))
            .collect();

        if let Some((field, direction)) = &self.order_by {
            matched.retain(|snap| snap.data.get(field).is_some_and(|v| !v.is_null()));
            matched.sort_by(|a, b| {
                let ord = compare_values(&a.data[field.as_str()], &b.data[field.as_str()])
                    .then_with(|| a.id.cmp(&b.id));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

impl Filter {
    fn matches(&self, data: &Document) -> bool {
        let Some(actual) = data.get(&self.field) else {
            return false;
        };
        let Some(ord) = compare_comparable(actual, &self.value) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => ord == Ordering::Equal,
            FilterOp::Gt => ord == Ordering::Greater,
            FilterOp::Gte => ord != Ordering::Less,
            FilterOp::Lt => ord == Ordering::Less,
            FilterOp::Lte => ord != Ordering::Greater,
        }
    }
}

/// Total order over JSON values used for sorting.
///
/// Values of different types order by type rank (null < bool < number <
/// string < array < object).
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    compare_comparable(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

fn compare_comparable(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => match (parse_instant(x), parse_instant(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Deep-merge `patch` into `target`.
pub fn merge_documents(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_documents(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Serialize a value into a document body. Fails unless it is a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Storage(format!(
            "document body must be an object, got {}",
            type_name(&other)
        ))),
        Err(e) => Err(StoreError::Storage(format!("serialize document: {e}"))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One query result: the document id within its collection plus its body.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub data: Document,
}

impl Snapshot {
    pub fn new(id: impl Into<String>, data: Document) -> Self {
        Self { id: id.into(), data }
    }

    /// Deserialize the body into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| StoreError::Corrupt {
            path: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

/// The core DocumentStore trait.
///
/// Implementations: in-memory (tests, ephemeral runs) and SQLite.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Read one document.
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError>;

    /// Write one document.
    async fn set(&self, doc: &DocumentRef, data: Document, mode: WriteMode) -> Result<(), StoreError>;

    /// Write a document that must not exist yet. Fails with
    /// [`StoreError::AlreadyExists`] instead of touching an existing one.
    async fn create(&self, doc: &DocumentRef, data: Document) -> Result<(), StoreError>;

    /// Write a new document under a generated id and return the id.
    async fn add(&self, collection: &CollectionRef, data: Document) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.create(&collection.doc(id.clone()), data).await?;
        Ok(id)
    }

    /// Delete one document. Deleting a missing document succeeds.
    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError>;

    /// Run a query over the direct children of a collection.
    async fn query(&self, collection: &CollectionRef, query: &Query) -> Result<Vec<Snapshot>, StoreError>;

    /// Ids under a collection, sorted ascending, including ids that only
    /// exist as parents of nested collections.
    async fn list_ids(&self, collection: &CollectionRef) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(id: &str, body: Value) -> Snapshot {
        match body {
            Value::Object(map) => Snapshot::new(id, map),
            _ => panic!("test bodies must be objects"),
        }
    }

    #[test]
    fn paths_alternate_collections_and_documents() {
        let messages = CollectionRef::root("users")
            .doc("u1")
            .collection("models")
            .doc("fumiko")
            .collection("messages");
        assert_eq!(messages.path(), "users/u1/models/fumiko/messages");
        assert_eq!(messages.doc("abc").path(), "users/u1/models/fumiko/messages/abc");
    }

    #[test]
    fn segments_with_slashes_are_rejected() {
        let bad = CollectionRef::root("users").doc("a/b");
        assert!(matches!(bad.validate(), Err(StoreError::InvalidPath(_))));
        assert!(CollectionRef::root("users").doc("").validate().is_err());
    }

    #[test]
    fn timestamps_compare_as_instants() {
        // Lexicographically "…00Z" > "…00.500Z", chronologically it is earlier.
        let a = json!("2024-01-01T00:00:00Z");
        let b = json!("2024-01-01T00:00:00.500Z");
        assert_eq!(compare_values(&a, &b), Ordering::Less);
    }

    #[test]
    fn query_orders_filters_and_limits() {
        let docs = vec![
            snap("a", json!({"ts": "2024-01-01T00:00:00Z"})),
            snap("b", json!({"ts": "2024-01-03T00:00:00Z"})),
            snap("c", json!({"ts": "2024-01-02T00:00:00Z"})),
            snap("d", json!({"other": 1})),
        ];
        let q = Query::new()
            .filter("ts", FilterOp::Gte, "2024-01-02T00:00:00Z")
            .order_by("ts", Direction::Descending)
            .limit(5);
        let ids: Vec<String> = q.apply(docs).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn documents_without_order_field_are_excluded() {
        let docs = vec![snap("x", json!({"n": 2})), snap("y", json!({}))];
        let out = Query::new().order_by("n", Direction::Ascending).apply(docs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "x");
    }

    #[test]
    fn merge_replaces_arrays_and_keeps_absent_fields() {
        let mut target = match json!({"title": "Old", "blocks": [1, 2], "meta": {"a": 1}}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let patch = match json!({"blocks": [3], "meta": {"b": 2}}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        merge_documents(&mut target, patch);
        assert_eq!(target["title"], json!("Old"));
        assert_eq!(target["blocks"], json!([3]));
        assert_eq!(target["meta"], json!({"a": 1, "b": 2}));
    }

    #[test]
    fn to_document_rejects_non_objects() {
        assert!(to_document(&vec![1, 2, 3]).is_err());
        assert!(to_document(&json!({"k": "v"})).is_ok());
    }
}
