//! Document store capability and the backends that provide it

pub mod memory;
pub mod supabase;

use std::cmp::Ordering;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

pub use memory::MemoryStore;
pub use supabase::SupabaseClient;

/// Document fields, keyed by field name (the id is held separately)
pub type Fields = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// A single stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Field value, `Null` when absent
    pub fn value(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    /// Decode into a typed record; the id is exposed to the record as `id`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields))
    }
}

/// Full result set of a live query at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub docs: Vec<Document>,
}

impl Snapshot {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }
}

/// Equality predicate on a single field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.value(&self.field) == &self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

/// Opaque position of a document in a sort order
///
/// Positions are compared on `(sort_value, id)` so that rows sharing a price
/// still have a strict order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cursor {
    pub id: String,
    pub sort_value: Value,
}

impl Cursor {
    pub fn at(doc: &Document, field: &str) -> Self {
        Self {
            id: doc.id.clone(),
            sort_value: doc.value(field).clone(),
        }
    }

    /// Bound selecting rows strictly after `doc` in ascending key order
    pub fn after(doc: &Document, field: &str) -> Bound {
        Bound::After(Self::at(doc, field))
    }

    /// Bound selecting rows strictly before `doc` in ascending key order
    pub fn before(doc: &Document, field: &str) -> Bound {
        Bound::Before(Self::at(doc, field))
    }

    /// Compare a document's position against this cursor
    pub fn compare(&self, doc: &Document, field: &str) -> Ordering {
        compare_values(doc.value(field), &self.sort_value).then_with(|| doc.id.cmp(&self.id))
    }
}

/// Query bound relative to the ascending `(sort value, id)` order, whatever
/// direction the query itself is read in
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    After(Cursor),
    Before(Cursor),
}

/// A filtered, optionally ordered and bounded query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Filter,
    pub order: Option<OrderBy>,
    pub bound: Option<Bound>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>, filter: Filter) -> Self {
        Self {
            collection: collection.into(),
            filter,
            order: None,
            bound: None,
            limit: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order = Some(OrderBy {
            field: field.into(),
            order,
        });
        self
    }

    pub fn bounded(mut self, bound: Bound) -> Self {
        self.bound = Some(bound);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Field the query is ordered (and bounded) on
    pub fn sort_field(&self) -> Option<&str> {
        self.order.as_ref().map(|o| o.field.as_str())
    }

    /// Run the query over an in-memory set of documents
    pub fn evaluate<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = docs
            .into_iter()
            .filter(|doc| self.filter.matches(doc))
            .cloned()
            .collect();

        if let Some(order) = &self.order {
            matched.sort_by(|a, b| {
                compare_values(a.value(&order.field), b.value(&order.field))
                    .then_with(|| a.id.cmp(&b.id))
            });
            if let Some(bound) = &self.bound {
                matched.retain(|doc| match bound {
                    Bound::After(cursor) => cursor.compare(doc, &order.field) == Ordering::Greater,
                    Bound::Before(cursor) => cursor.compare(doc, &order.field) == Ordering::Less,
                });
            }
            if order.order == SortOrder::Descending {
                matched.reverse();
            }
        } else {
            matched.sort_by(|a, b| a.id.cmp(&b.id));
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// Total order over JSON values used for sort keys
///
/// Numbers and numeric strings compare as decimals.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (as_decimal(a), as_decimal(b)) {
        return x.cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// A live query: snapshots arrive in store order until cancelled
pub struct Subscription {
    snapshots: mpsc::UnboundedReceiver<StoreResult<Snapshot>>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        snapshots: mpsc::UnboundedReceiver<StoreResult<Snapshot>>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            snapshots,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Next snapshot, or `None` once the store closed the feed
    pub async fn next(&mut self) -> Option<StoreResult<Snapshot>> {
        self.snapshots.recv().await
    }

    /// Unsubscribe. Dropping the subscription does the same.
    pub fn cancel(mut self) {
        self.unsubscribe();
    }

    fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
        self.snapshots.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Capability surface of the document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One-shot read of a document; `None` when it does not exist
    async fn get_one(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Open a live query. Fails if the subscription cannot be established.
    async fn subscribe(&self, query: Query) -> StoreResult<Subscription>;

    /// Number of documents matching `filter` (eventually consistent)
    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Failures worth surfacing as "try again" rather than as a bug
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Request(_) | StoreError::Unavailable(_) => true,
            StoreError::Api { status, .. } => *status >= 500 || *status == 429,
            StoreError::Decode(_) | StoreError::Malformed(_) => false,
        }
    }
}
