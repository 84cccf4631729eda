//! Additive migrations for version upgrades
//!
//! Version 1 stored notes and preferences without a text color and without
//! the apply-globally flag. Every upgrade only adds columns; existing data and
//! column types are left alone.

use chrono::{SecondsFormat, Utc};
use log::info;

use crate::SCHEMA_VERSION;
use crate::error::SchemaError;

/// A column the current layout expects, with the definitions used to add it
pub struct ColumnSpec {
    pub table: &'static str,
    pub name: &'static str,
    pub sqlite_definition: &'static str,
    pub pg_definition: &'static str,
}

/// Columns introduced after version 1
pub const ADDED_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        table: "notes",
        name: "font_color",
        sqlite_definition: "TEXT",
        pg_definition: "TEXT",
    },
    ColumnSpec {
        table: "notes",
        name: "z_order",
        sqlite_definition: "INTEGER NOT NULL DEFAULT 0",
        pg_definition: "BIGINT NOT NULL DEFAULT 0",
    },
    ColumnSpec {
        table: "notes",
        name: "visible",
        sqlite_definition: "INTEGER NOT NULL DEFAULT 1",
        pg_definition: "BOOLEAN NOT NULL DEFAULT TRUE",
    },
    ColumnSpec {
        table: "preferences",
        name: "font_color",
        sqlite_definition: "TEXT",
        pg_definition: "TEXT",
    },
    ColumnSpec {
        table: "preferences",
        name: "apply_globally",
        sqlite_definition: "INTEGER NOT NULL DEFAULT 0",
        pg_definition: "BOOLEAN NOT NULL DEFAULT FALSE",
    },
];

/// Stored version string to number; absent means a fresh or version 1 store
pub fn parse_version(stored: Option<&str>) -> u32 {
    stored.and_then(|v| v.trim().parse().ok()).unwrap_or(1)
}

/// Check if the stored version can be handled by this build
pub fn is_version_compatible(version: u32) -> bool {
    version <= SCHEMA_VERSION
}

/// Upgrade a SQLite store to the latest version
pub fn upgrade_sqlite(conn: &rusqlite::Connection, from: u32) -> Result<(), SchemaError> {
    if !is_version_compatible(from) {
        return Err(SchemaError(format!(
            "database schema version {} is newer than supported version {}",
            from, SCHEMA_VERSION
        )));
    }

    for column in ADDED_COLUMNS {
        if !sqlite_has_column(conn, column.table, column.name)? {
            conn.execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    column.table, column.name, column.sqlite_definition
                ),
                [],
            )?;
            info!("Added column {}.{}", column.table, column.name);
        }
    }

    conn.execute(
        "INSERT INTO qsticky_meta (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [SCHEMA_VERSION.to_string()],
    )?;
    conn.execute(
        "INSERT INTO qsticky_meta (key, value) VALUES ('migrated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [migrated_at()],
    )?;
    Ok(())
}

/// Upgrade a PostgreSQL store to the latest version
pub fn upgrade_postgres(tx: &mut postgres::Transaction<'_>, from: u32) -> Result<(), SchemaError> {
    if !is_version_compatible(from) {
        return Err(SchemaError(format!(
            "database schema version {} is newer than supported version {}",
            from, SCHEMA_VERSION
        )));
    }

    for column in ADDED_COLUMNS {
        tx.batch_execute(&format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
            column.table, column.name, column.pg_definition
        ))?;
    }

    let version = SCHEMA_VERSION.to_string();
    let stamp = migrated_at();
    tx.execute(
        "INSERT INTO qsticky_meta (key, value) VALUES ('schema_version', $1)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        &[&version],
    )?;
    tx.execute(
        "INSERT INTO qsticky_meta (key, value) VALUES ('migrated_at', $1)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        &[&stamp],
    )?;
    Ok(())
}

/// UTC time recorded as `migrated_at`
fn migrated_at() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn sqlite_has_column(
    conn: &rusqlite::Connection,
    table: &str,
    column: &str,
) -> Result<bool, SchemaError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
