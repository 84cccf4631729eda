//! Database schema definitions and the startup schema check
//!
//! Both engines share one conceptual layout; only column types differ.

use log::info;
use rusqlite::OptionalExtension;

use super::connection::Connection;
use super::migrations;
use crate::error::SchemaError;

/// SQLite: notes table
pub const SQLITE_CREATE_NOTES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS notes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    text        TEXT    NOT NULL DEFAULT '',
    x           INTEGER NOT NULL DEFAULT 0,
    y           INTEGER NOT NULL DEFAULT 0,
    width       INTEGER NOT NULL DEFAULT 256 CHECK (width > 0),
    height      INTEGER NOT NULL DEFAULT 256 CHECK (height > 0),
    color       TEXT,
    font_color  TEXT,
    font_family TEXT,
    font_size   INTEGER,
    z_order     INTEGER NOT NULL DEFAULT 0,
    visible     INTEGER NOT NULL DEFAULT 1
)
"#;

/// SQLite: stacking order index used by `list_all`.
/// Created after the column upgrade, since older layouts lack `z_order`.
pub const SQLITE_CREATE_NOTES_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_notes_z_order ON notes (z_order, id)";

/// SQLite: singleton preferences row
pub const SQLITE_CREATE_PREFERENCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS preferences (
    id              INTEGER PRIMARY KEY CHECK (id = 1),
    color           TEXT,
    font_color      TEXT,
    font_family     TEXT,
    font_size       INTEGER,
    apply_globally  INTEGER NOT NULL DEFAULT 0
)
"#;

/// SQLite: key/value metadata (schema version)
pub const SQLITE_CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS qsticky_meta (
    key     TEXT PRIMARY KEY NOT NULL,
    value   TEXT
)
"#;

/// SQLite table creation statements in order
pub const SQLITE_CREATE_ALL: &[&str] = &[
    SQLITE_CREATE_NOTES_TABLE,
    SQLITE_CREATE_PREFERENCES_TABLE,
    SQLITE_CREATE_META_TABLE,
];

/// PostgreSQL: notes table
pub const PG_CREATE_NOTES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS notes (
    id          BIGSERIAL PRIMARY KEY,
    text        TEXT    NOT NULL DEFAULT '',
    x           INTEGER NOT NULL DEFAULT 0,
    y           INTEGER NOT NULL DEFAULT 0,
    width       INTEGER NOT NULL DEFAULT 256 CHECK (width > 0),
    height      INTEGER NOT NULL DEFAULT 256 CHECK (height > 0),
    color       TEXT,
    font_color  TEXT,
    font_family TEXT,
    font_size   INTEGER,
    z_order     BIGINT  NOT NULL DEFAULT 0,
    visible     BOOLEAN NOT NULL DEFAULT TRUE
)
"#;

/// PostgreSQL: stacking order index used by `list_all`.
/// Created after the column upgrade, since older layouts lack `z_order`.
pub const PG_CREATE_NOTES_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_notes_z_order ON notes (z_order, id)";

/// PostgreSQL: singleton preferences row
pub const PG_CREATE_PREFERENCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS preferences (
    id              INTEGER PRIMARY KEY CHECK (id = 1),
    color           TEXT,
    font_color      TEXT,
    font_family     TEXT,
    font_size       INTEGER,
    apply_globally  BOOLEAN NOT NULL DEFAULT FALSE
)
"#;

/// PostgreSQL: key/value metadata (schema version)
pub const PG_CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS qsticky_meta (
    key     TEXT PRIMARY KEY,
    value   TEXT
)
"#;

/// PostgreSQL table creation statements in order
pub const PG_CREATE_ALL: &[&str] = &[
    PG_CREATE_NOTES_TABLE,
    PG_CREATE_PREFERENCES_TABLE,
    PG_CREATE_META_TABLE,
];

/// Create missing tables and columns. Idempotent; never drops or retypes.
///
/// Runs once per process before any repository call.
pub fn ensure_schema(conn: &mut Connection) -> Result<(), SchemaError> {
    match conn {
        Connection::Sqlite(store) => ensure_sqlite_schema(store.connection()),
        Connection::Postgres(store) => ensure_postgres_schema(store.client_mut()),
        Connection::Memory(_) => Ok(()),
    }
}

/// SQLite half of [`ensure_schema`], in one transaction
pub fn ensure_sqlite_schema(conn: &rusqlite::Connection) -> Result<(), SchemaError> {
    let tx = conn.unchecked_transaction()?;

    for sql in SQLITE_CREATE_ALL {
        tx.execute(sql, [])?;
    }
    let stored = tx
        .query_row(
            "SELECT value FROM qsticky_meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    let version = migrations::parse_version(stored.as_deref());
    migrations::upgrade_sqlite(&tx, version)?;
    tx.execute(SQLITE_CREATE_NOTES_INDEX, [])?;

    tx.commit()?;
    info!("SQLite schema ready (version {})", crate::SCHEMA_VERSION);
    Ok(())
}

/// PostgreSQL half of [`ensure_schema`], in one transaction
pub fn ensure_postgres_schema(client: &mut postgres::Client) -> Result<(), SchemaError> {
    let mut tx = client.transaction()?;

    for sql in PG_CREATE_ALL {
        tx.batch_execute(sql)?;
    }
    let stored: Option<String> = tx
        .query_opt(
            "SELECT value FROM qsticky_meta WHERE key = 'schema_version'",
            &[],
        )?
        .map(|row| row.try_get(0))
        .transpose()?;
    let version = migrations::parse_version(stored.as_deref());
    migrations::upgrade_postgres(&mut tx, version)?;
    tx.batch_execute(PG_CREATE_NOTES_INDEX)?;

    tx.commit()?;
    info!("PostgreSQL schema ready (version {})", crate::SCHEMA_VERSION);
    Ok(())
}
