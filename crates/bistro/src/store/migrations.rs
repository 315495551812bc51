//! Schema versioning for the bistro databases.
//!
//! Both the document database and the identity database record their version
//! under `schema_version` in the `metadata` table. Opening a database runs
//! the pending steps of its [`Schema`] in one transaction.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::schema::Schema;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Create the schema's tables and bring the database to its version.
///
/// # Errors
///
/// Returns an error if a statement or migration fails, or if the database
/// was written by a newer schema version.
pub fn initialize_schema(conn: &Connection, schema: &Schema) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for statement in schema.statements {
        tx.execute(statement, [])?;
    }

    let target = schema.version();
    let found = stored_version(&tx)?;
    if found > target {
        return Err(Error::DatabaseMigration {
            message: format!(
                "{} database is at version {found}, newer than supported version {target}",
                schema.name
            ),
        });
    }

    for (from, migration) in schema.migrations.iter().enumerate().skip(found) {
        debug!("Migrating {} database to version {}", schema.name, from + 1);
        migration(&*tx)?;
    }
    if found < target {
        store_version(&tx, target)?;
        info!(
            "{} database migrated from version {} to {}",
            schema.name, found, target
        );
    }

    tx.commit()?;
    Ok(())
}

/// The recorded schema version, 0 for a fresh database.
fn stored_version(conn: &Connection) -> Result<usize> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn store_version(conn: &Connection, version: usize) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::{
        Migration, CREATE_METADATA_TABLE, DOCUMENT_SCHEMA, IDENTITY_SCHEMA,
    };

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    fn add_notes_column(conn: &Connection) -> Result<()> {
        conn.execute("ALTER TABLE notes ADD COLUMN body TEXT", [])?;
        Ok(())
    }

    fn create_notes(_conn: &Connection) -> Result<()> {
        Ok(())
    }

    fn broken(_conn: &Connection) -> Result<()> {
        Err(Error::DatabaseMigration {
            message: "step failed".to_string(),
        })
    }

    const NOTES_V1: &[Migration] = &[create_notes];
    const NOTES_V2: &[Migration] = &[create_notes, add_notes_column];

    fn notes_schema(migrations: &'static [Migration]) -> Schema {
        Schema {
            name: "notes",
            statements: &[
                "CREATE TABLE IF NOT EXISTS notes (id INTEGER PRIMARY KEY)",
                CREATE_METADATA_TABLE,
            ],
            migrations,
        }
    }

    #[test]
    fn test_document_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn, &DOCUMENT_SCHEMA).unwrap();

        assert!(table_exists(&conn, "documents"));
        assert!(table_exists(&conn, "metadata"));
        assert!(!table_exists(&conn, "accounts"));
        assert_eq!(stored_version(&conn).unwrap(), DOCUMENT_SCHEMA.version());
    }

    #[test]
    fn test_identity_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn, &IDENTITY_SCHEMA).unwrap();

        assert!(table_exists(&conn, "accounts"));
        assert!(table_exists(&conn, "session"));
        assert!(table_exists(&conn, "password_resets"));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn, &DOCUMENT_SCHEMA).unwrap();
        initialize_schema(&conn, &DOCUMENT_SCHEMA).unwrap();

        assert_eq!(stored_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_pending_migrations_run_once() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn, &notes_schema(NOTES_V1)).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), 1);

        initialize_schema(&conn, &notes_schema(NOTES_V2)).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), 2);
        conn.execute("INSERT INTO notes (body) VALUES ('hi')", []).unwrap();

        // Re-running would fail on the duplicate column if the step ran again.
        initialize_schema(&conn, &notes_schema(NOTES_V2)).unwrap();
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        static FAILING: &[Migration] = &[broken];
        let conn = Connection::open_in_memory().unwrap();

        let err = initialize_schema(&conn, &notes_schema(FAILING)).unwrap_err();
        assert!(err.to_string().contains("step failed"));
        assert!(!table_exists(&conn, "notes"));
    }

    #[test]
    fn test_newer_database_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn, &DOCUMENT_SCHEMA).unwrap();
        store_version(&conn, 99).unwrap();

        let err = initialize_schema(&conn, &DOCUMENT_SCHEMA).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn test_fresh_metadata_reads_version_zero() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(CREATE_METADATA_TABLE, []).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_invalid_version_value() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(CREATE_METADATA_TABLE, []).unwrap();
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES ('schema_version', 'abc')",
            [],
        )
        .unwrap();

        let err = stored_version(&conn).unwrap_err();
        assert!(err.to_string().contains("invalid schema version"));
    }
}
