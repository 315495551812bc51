//! Embedded `SQLite` implementation of [`DocumentStore`].
//!
//! All collections share one `documents` table. Field filters and ordering
//! are evaluated with `json_extract`, so queries behave like the hosted store
//! for the flat, top-level fields this crate uses.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::schema::DOCUMENT_SCHEMA;
use super::{
    is_server_timestamp, migrations, new_document_id, timestamp_text, ChangeEvent, ChangeKind,
    Direction, Document, DocumentStore, Fields, Filter, Query, SetMode,
};

/// Number of change events buffered per subscriber before it lags.
const CHANGE_BUFFER: usize = 256;

/// Document store backed by a local `SQLite` database.
#[derive(Debug)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
    /// Change notifications, one event per successful write.
    changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteStore {
    /// Open or create a document database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening document database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn, &DOCUMENT_SCHEMA)?;

        info!("Document database opened at {}", path.display());
        Ok(Self::with_connection(path, conn))
    }

    /// Create an in-memory document store.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn, &DOCUMENT_SCHEMA)?;

        Ok(Self::with_connection(PathBuf::from(":memory:"), conn))
    }

    fn with_connection(path: PathBuf, conn: Connection) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            path,
            conn: Mutex::new(conn),
            changes,
        }
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("document database lock poisoned"))
    }

    fn notify(&self, collection: &str, id: &str, kind: ChangeKind) {
        // Sending only fails when nobody is subscribed.
        let _ = self.changes.send(ChangeEvent {
            collection: collection.to_string(),
            id: id.to_string(),
            kind,
        });
    }

    /// Add a document under a freshly generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn add_document(&self, collection: &str, fields: Fields) -> Result<String> {
        let id = new_document_id();
        self.set_document(collection, &id, fields, SetMode::Overwrite)?;
        Ok(id)
    }

    /// Create or update a document.
    ///
    /// Server-timestamp sentinels anywhere in `fields` are replaced with the
    /// current time. With [`SetMode::Merge`] the given top-level fields are
    /// laid over the stored ones under the connection lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: SetMode,
    ) -> Result<()> {
        let now = timestamp_text(Utc::now());
        let mut fields = Value::Object(fields);
        resolve_server_timestamps(&mut fields, &now);
        let Value::Object(fields) = fields else {
            return Err(Error::internal("document fields are not an object"));
        };

        let conn = self.lock()?;
        let data = match mode {
            SetMode::Overwrite => fields,
            SetMode::Merge => {
                let mut merged = load_fields(&conn, collection, id)?.unwrap_or_default();
                merged.extend(fields);
                merged
            }
        };

        let data = serde_json::to_string(&Value::Object(data))?;
        conn.execute(
            r"
            INSERT INTO documents (collection, id, data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT (collection, id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            ",
            params![collection, id, data, now],
        )?;
        drop(conn);

        debug!("Wrote document {}/{}", collection, id);
        self.notify(collection, id, ChangeKind::Written);
        Ok(())
    }

    /// Read a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored data is
    /// not a JSON object.
    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let conn = self.lock()?;
        let fields = load_fields(&conn, collection, id)?;
        Ok(fields.map(|fields| Document {
            id: id.to_string(),
            fields,
        }))
    }

    /// Delete a document.
    ///
    /// Returns `true` if a document was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        let affected = self.lock()?.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;

        if affected > 0 {
            debug!("Deleted document {}/{}", collection, id);
            self.notify(collection, id, ChangeKind::Deleted);
        }
        Ok(affected > 0)
    }

    /// Run a query against a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn query_documents(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        if query.is_empty_match() {
            return Ok(Vec::new());
        }

        let (sql, bindings) = build_query_sql(collection, query);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bindings.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, data)| {
                let fields = parse_fields(collection, &id, &data)?;
                Ok(Document { id, fields })
            })
            .collect()
    }

    /// Count the documents in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_documents(&self, collection: &str) -> Result<usize> {
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqliteStore {
    async fn add(&self, collection: &str, fields: Fields) -> Result<String> {
        self.add_document(collection, fields)
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields, mode: SetMode) -> Result<()> {
        self.set_document(collection, id, fields, mode)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.get_document(collection, id)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        self.delete_document(collection, id)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        self.query_documents(collection, query)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.count_documents(collection)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

fn load_fields(conn: &Connection, collection: &str, id: &str) -> Result<Option<Fields>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;

    data.map(|data| parse_fields(collection, id, &data))
        .transpose()
}

fn parse_fields(collection: &str, id: &str, data: &str) -> Result<Fields> {
    match serde_json::from_str(data)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(Error::store(format!(
            "document {collection}/{id} is not a JSON object"
        ))),
    }
}

fn resolve_server_timestamps(value: &mut Value, now: &str) {
    if is_server_timestamp(value) {
        *value = Value::String(now.to_string());
        return;
    }
    match value {
        Value::Object(map) => map
            .values_mut()
            .for_each(|v| resolve_server_timestamps(v, now)),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|v| resolve_server_timestamps(v, now)),
        _ => {}
    }
}

/// JSON path of a top-level field.
fn field_path(field: &str) -> String {
    format!("$.\"{field}\"")
}

/// Convert a JSON value to the SQL value `json_extract` yields for it.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn build_query_sql(collection: &str, query: &Query) -> (String, Vec<SqlValue>) {
    let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?");
    let mut bindings = vec![SqlValue::Text(collection.to_string())];

    for filter in &query.filters {
        match filter {
            Filter::Eq { field, value } => {
                sql.push_str(" AND json_extract(data, ?) IS ?");
                bindings.push(SqlValue::Text(field_path(field)));
                bindings.push(to_sql_value(value));
            }
            Filter::In { field, values } => {
                sql.push_str(" AND json_extract(data, ?) IN (");
                sql.push_str(&placeholders(values.len()));
                sql.push(')');
                bindings.push(SqlValue::Text(field_path(field)));
                bindings.extend(values.iter().map(to_sql_value));
            }
            Filter::IdIn(ids) => {
                sql.push_str(" AND id IN (");
                sql.push_str(&placeholders(ids.len()));
                sql.push(')');
                bindings.extend(ids.iter().cloned().map(SqlValue::Text));
            }
        }
    }

    match &query.order_by {
        Some((field, direction)) => {
            let direction = match direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            sql.push_str(&format!(
                " ORDER BY json_extract(data, ?) {direction}, rowid ASC"
            ));
            bindings.push(SqlValue::Text(field_path(field)));
        }
        None => sql.push_str(" ORDER BY rowid ASC"),
    }

    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        bindings.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    (sql, bindings)
}
