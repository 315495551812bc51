//! `SQLite` schema definitions for bistro.
//!
//! Two databases are kept: the document store (recipes, users, favorites,
//! feedback) and the identity database behind the embedded identity
//! provider. Both share the `metadata` table layout for schema versioning.

use rusqlite::Connection;

use crate::error::Result;

/// A step from one schema version to the next.
pub type Migration = fn(&Connection) -> Result<()>;

/// Tables, indexes and migration steps of one database.
#[derive(Clone, Copy)]
pub struct Schema {
    /// Name used in log and error messages.
    pub name: &'static str,
    /// Statements creating tables and indexes, run in order.
    pub statements: &'static [&'static str],
    /// `migrations[n]` takes the database from version `n` to `n + 1`.
    pub migrations: &'static [Migration],
}

impl Schema {
    /// The version a database is at once every migration has run.
    #[must_use]
    pub fn version(&self) -> usize {
        self.migrations.len()
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("statements", &self.statements.len())
            .field("version", &self.version())
            .finish()
    }
}

/// The base tables are created by the schema statements; nothing to alter.
fn base_tables(_conn: &Connection) -> Result<()> {
    Ok(())
}

/// SQL statement to create the documents table.
///
/// Every collection path (`recipes`, `users`, `users/<uid>/favorites`, ...)
/// shares this table; `data` holds the document fields as a JSON object.
pub const CREATE_DOCUMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (collection, id)
)
";

/// SQL statement to index documents by collection in insertion order.
pub const CREATE_COLLECTION_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)
";

/// SQL statement to index the owner field used by recipe queries.
pub const CREATE_OWNER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_documents_owner
ON documents(collection, json_extract(data, '$.userId'))
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the accounts table.
pub const CREATE_ACCOUNTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS accounts (
    uid TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    display_name TEXT,
    password_salt TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    disabled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the single-row session table.
pub const CREATE_SESSION_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS session (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    uid TEXT NOT NULL,
    signed_in_at TEXT NOT NULL
)
";

/// SQL statement to create the password reset outbox.
pub const CREATE_PASSWORD_RESETS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS password_resets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL,
    requested_at TEXT NOT NULL
)
";

/// SQL statement to index reset requests for rate limiting.
pub const CREATE_RESETS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_password_resets_email
ON password_resets(email, requested_at)
";

/// Schema of the document store database.
pub const DOCUMENT_SCHEMA: Schema = Schema {
    name: "documents",
    statements: &[
        CREATE_DOCUMENTS_TABLE,
        CREATE_COLLECTION_INDEX,
        CREATE_OWNER_INDEX,
        CREATE_METADATA_TABLE,
    ],
    migrations: &[base_tables],
};

/// Schema of the identity database.
pub const IDENTITY_SCHEMA: Schema = Schema {
    name: "identity",
    statements: &[
        CREATE_ACCOUNTS_TABLE,
        CREATE_SESSION_TABLE,
        CREATE_PASSWORD_RESETS_TABLE,
        CREATE_RESETS_INDEX,
        CREATE_METADATA_TABLE,
    ],
    migrations: &[base_tables],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        for schema in [DOCUMENT_SCHEMA, IDENTITY_SCHEMA] {
            assert!(!schema.statements.is_empty());
            for stmt in schema.statements {
                assert!(!stmt.is_empty());
            }
        }
    }

    #[test]
    fn test_documents_table_keyed_by_collection_and_id() {
        assert!(CREATE_DOCUMENTS_TABLE.contains("PRIMARY KEY (collection, id)"));
        assert!(CREATE_DOCUMENTS_TABLE.contains("data TEXT NOT NULL"));
    }

    #[test]
    fn test_schema_versions() {
        assert_eq!(DOCUMENT_SCHEMA.version(), 1);
        assert_eq!(IDENTITY_SCHEMA.version(), 1);
        assert!(format!("{DOCUMENT_SCHEMA:?}").contains("documents"));
    }

    #[test]
    fn test_accounts_email_unique() {
        assert!(CREATE_ACCOUNTS_TABLE.contains("email TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn test_both_schemas_carry_metadata_table() {
        assert!(DOCUMENT_SCHEMA.statements.contains(&CREATE_METADATA_TABLE));
        assert!(IDENTITY_SCHEMA.statements.contains(&CREATE_METADATA_TABLE));
    }
}
