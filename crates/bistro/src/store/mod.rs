//! Document store gateway.
//!
//! Recipes, user documents, favorites and feedback live in a schema-less
//! document store. [`DocumentStore`] is the port the rest of the crate talks
//! to; [`SqliteStore`] is the embedded implementation.
//!
//! Collections are addressed by path. Top-level collections are plain names
//! (`recipes`, `users`, `feedback`); subcollections hang off a document
//! (`users/<uid>/favorites`), see [`subcollection`].

pub mod migrations;
pub mod schema;
mod sqlite;

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;

use crate::error::Result;

pub use sqlite::SqliteStore;

/// Flat collection of every recipe, owned or predefined.
pub const RECIPES: &str = "recipes";

/// One document per user, carrying the `favorites` array field.
pub const USERS: &str = "users";

/// Name of the per-user favorites subcollection (and of the array field).
pub const FAVORITES: &str = "favorites";

/// Append-only feedback sink.
pub const FEEDBACK: &str = "feedback";

/// Marker key of the server-timestamp sentinel value.
const SERVER_TIMESTAMP_KEY: &str = "$serverTimestamp";

/// Length of store-assigned document ids.
pub const DOCUMENT_ID_LEN: usize = 20;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// The fields of a document.
pub type Fields = Map<String, Value>;

/// A document read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id, unique within its collection.
    pub id: String,
    /// The document's fields.
    pub fields: Fields,
}

impl Document {
    /// Get a single field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Deserialize the fields into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields don't match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

/// How [`DocumentStore::set`] treats an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    /// Replace the whole document.
    #[default]
    Overwrite,
    /// Replace only the given top-level fields, keeping the rest.
    Merge,
}

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// A query filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value.
    Eq {
        /// Top-level field name.
        field: String,
        /// Value to compare with.
        value: Value,
    },
    /// Field equals one of the values.
    In {
        /// Top-level field name.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Document id is one of the ids.
    IdIn(Vec<String>),
}

/// A query against one collection.
///
/// Without an ordering, documents come back in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Filters, all of which must match.
    pub filters: Vec<Filter>,
    /// Optional ordering field and direction.
    pub order_by: Option<(String, Direction)>,
    /// Optional maximum number of documents.
    pub limit: Option<usize>,
}

impl Query {
    /// A query matching every document in the collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Require `field` to be one of `values`.
    #[must_use]
    pub fn where_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filters.push(Filter::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Require the document id to be one of `ids`.
    #[must_use]
    pub fn where_id_in<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.filters
            .push(Filter::IdIn(ids.into_iter().map(Into::into).collect()));
        self
    }

    /// Order results by a field.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Return at most `limit` documents.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether some filter can never match (an empty `in` list).
    #[must_use]
    pub fn is_empty_match(&self) -> bool {
        self.filters.iter().any(|filter| match filter {
            Filter::In { values, .. } => values.is_empty(),
            Filter::IdIn(ids) => ids.is_empty(),
            Filter::Eq { .. } => false,
        })
    }
}

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The document was created or replaced.
    Written,
    /// The document was deleted.
    Deleted,
}

/// A change notification broadcast after every successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Collection path of the changed document.
    pub collection: String,
    /// Id of the changed document.
    pub id: String,
    /// Kind of change.
    pub kind: ChangeKind,
}

/// Port to a document database.
///
/// Single-document writes are atomic; nothing else is. Every successful write
/// is announced on the [`changes`](DocumentStore::changes) channel, which is
/// what live subscriptions are built on.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Add a document with a store-assigned id, returning the id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String>;

    /// Create or update the document `id`.
    async fn set(&self, collection: &str, id: &str, fields: Fields, mode: SetMode) -> Result<()>;

    /// Read a single document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Delete a document. Returns `true` if it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Run a query against a collection.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Count the documents in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Subscribe to change events.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Path of a subcollection under a document.
///
/// ```
/// assert_eq!(bistro::store::subcollection("users", "u1", "favorites"), "users/u1/favorites");
/// ```
#[must_use]
pub fn subcollection(collection: &str, id: &str, name: &str) -> String {
    format!("{collection}/{id}/{name}")
}

/// A field value the store replaces with its own clock at write time.
#[must_use]
pub fn server_timestamp() -> Value {
    json!({ SERVER_TIMESTAMP_KEY: true })
}

/// Whether a value is the server-timestamp sentinel.
#[must_use]
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.len() == 1 && obj.get(SERVER_TIMESTAMP_KEY) == Some(&Value::Bool(true)))
}

/// Fixed-width RFC 3339 text for a timestamp, so stored timestamps sort
/// lexicographically.
#[must_use]
pub fn timestamp_text(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generate a random-looking alphanumeric id.
///
/// Ids are derived by hashing the current time, the process id and a
/// process-wide counter, so two calls never return the same id.
#[must_use]
pub fn generate_id(len: usize) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let mut hasher = blake3::Hasher::new();
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());

    let mut output = hasher.finalize_xof();
    let mut bytes = vec![0u8; len];
    output.fill(&mut bytes);

    bytes
        .iter()
        .map(|b| char::from(ID_ALPHABET[usize::from(*b) % ID_ALPHABET.len()]))
        .collect()
}

/// Generate a document id.
#[must_use]
pub fn new_document_id() -> String {
    generate_id(DOCUMENT_ID_LEN)
}

/// Convert a serializable value into document fields.
///
/// # Errors
///
/// Returns an error if `value` doesn't serialize to a JSON object.
pub fn to_fields<T: serde::Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(crate::Error::internal(format!(
            "expected a JSON object for document fields, got {other}"
        ))),
    }
}
