//! Preferences store: the singleton global-settings row
//!
//! Reads merge stored values over the built-in defaults, so a fresh store
//! answers with defaults. Writes are single-statement upserts on the fixed
//! key. The row is never deleted.

use log::debug;
use rusqlite::OptionalExtension;

use super::models::{Preferences, RawPreferences};
use crate::PREFERENCES_ROW_ID;
use crate::error::StoreError;

const SQLITE_SELECT: &str = "SELECT color, font_color, font_family, font_size, apply_globally
     FROM preferences WHERE id = ?1";

const SQLITE_UPSERT: &str = "INSERT INTO preferences (id, color, font_color, font_family, font_size, apply_globally)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(id) DO UPDATE SET
        color = excluded.color,
        font_color = excluded.font_color,
        font_family = excluded.font_family,
        font_size = excluded.font_size,
        apply_globally = excluded.apply_globally";

const PG_SELECT: &str = "SELECT color, font_color, font_family, font_size, apply_globally
     FROM preferences WHERE id = $1";

const PG_UPSERT: &str = "INSERT INTO preferences (id, color, font_color, font_family, font_size, apply_globally)
     VALUES ($1, $2, $3, $4, $5, $6)
     ON CONFLICT (id) DO UPDATE SET
        color = EXCLUDED.color,
        font_color = EXCLUDED.font_color,
        font_family = EXCLUDED.font_family,
        font_size = EXCLUDED.font_size,
        apply_globally = EXCLUDED.apply_globally";

/// Stored preferences, or built-in defaults when the row is absent
pub fn sqlite_load(conn: &rusqlite::Connection) -> Result<Preferences, StoreError> {
    debug!("SQLite: load preferences");
    let raw = conn
        .query_row(SQLITE_SELECT, [PREFERENCES_ROW_ID], |row| {
            Ok(RawPreferences {
                color: row.get(0)?,
                font_color: row.get(1)?,
                font_family: row.get(2)?,
                font_size: row.get(3)?,
                apply_globally: row.get(4)?,
            })
        })
        .optional()?;
    Ok(raw.unwrap_or_default().merge_defaults())
}

/// Insert the row if absent, else overwrite it
pub fn sqlite_save(conn: &rusqlite::Connection, prefs: &Preferences) -> Result<(), StoreError> {
    validate(prefs)?;
    debug!("SQLite: save preferences");
    conn.execute(
        SQLITE_UPSERT,
        rusqlite::params![
            PREFERENCES_ROW_ID,
            prefs.color.to_string(),
            prefs.font_color.to_string(),
            prefs.font.family,
            prefs.font.size,
            prefs.apply_globally,
        ],
    )?;
    Ok(())
}

/// PostgreSQL counterpart of [`sqlite_load`]
pub fn pg_load(client: &mut postgres::Client) -> Result<Preferences, StoreError> {
    debug!("PostgreSQL: load preferences");
    // The column is INTEGER on both engines
    let key = PREFERENCES_ROW_ID as i32;
    let raw = match client.query_opt(PG_SELECT, &[&key])? {
        Some(row) => RawPreferences {
            color: row.try_get(0)?,
            font_color: row.try_get(1)?,
            font_family: row.try_get(2)?,
            font_size: row.try_get(3)?,
            apply_globally: row.try_get(4)?,
        },
        None => RawPreferences::default(),
    };
    Ok(raw.merge_defaults())
}

/// PostgreSQL counterpart of [`sqlite_save`]
pub fn pg_save(client: &mut postgres::Client, prefs: &Preferences) -> Result<(), StoreError> {
    validate(prefs)?;
    debug!("PostgreSQL: save preferences");
    let key = PREFERENCES_ROW_ID as i32;
    let color = prefs.color.to_string();
    let font_color = prefs.font_color.to_string();
    client.execute(
        PG_UPSERT,
        &[
            &key,
            &color,
            &font_color,
            &prefs.font.family,
            &prefs.font.size,
            &prefs.apply_globally,
        ],
    )?;
    Ok(())
}

/// Shared write-side checks
pub fn validate(prefs: &Preferences) -> Result<(), StoreError> {
    if prefs.font.size <= 0 {
        return Err(StoreError::ConstraintViolation(format!(
            "font size must be positive, got {}",
            prefs.font.size
        )));
    }
    Ok(())
}
