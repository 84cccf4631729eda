//! SQL query operations for the SQLite engine
//!
//! Low-level note functions over a bare `rusqlite::Connection`. Each is a
//! single statement and therefore its own transaction. For the engine-neutral
//! contract, use [`NoteRepository`](super::NoteRepository).

use log::debug;
use rusqlite::{Connection, Row, params};

use super::models::{Note, NoteId, RawNote};
use crate::error::StoreError;

/// Column list shared by every note SELECT
pub const NOTE_COLUMNS: &str =
    "id, text, x, y, width, height, color, font_color, font_family, font_size, z_order, visible";

fn raw_note(row: &Row<'_>) -> rusqlite::Result<RawNote> {
    Ok(RawNote {
        id: row.get(0)?,
        text: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        x: row.get(2)?,
        y: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        color: row.get(6)?,
        font_color: row.get(7)?,
        font_family: row.get(8)?,
        font_size: row.get(9)?,
        z_order: row.get(10)?,
        visible: row.get(11)?,
    })
}

/// Insert a note and return it with the assigned id
pub fn insert_note(conn: &Connection, note: &Note) -> Result<Note, StoreError> {
    note.validate()?;
    debug!("SQLite: insert note z={}", note.z_order);
    conn.execute(
        "INSERT INTO notes (text, x, y, width, height, color, font_color, font_family, font_size, z_order, visible)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            note.text,
            note.x,
            note.y,
            note.width,
            note.height,
            note.color.to_string(),
            note.font_color.to_string(),
            note.font.family,
            note.font.size,
            note.z_order,
            note.visible,
        ],
    )?;
    Ok(note.with_id(conn.last_insert_rowid()))
}

/// Overwrite every column of an existing note
pub fn update_note(conn: &Connection, note: &Note) -> Result<(), StoreError> {
    let id = note
        .id
        .ok_or_else(|| StoreError::ConstraintViolation("cannot update an unsaved note".into()))?;
    note.validate()?;
    debug!("SQLite: update note {}", id);
    let changed = conn.execute(
        "UPDATE notes SET text = ?1, x = ?2, y = ?3, width = ?4, height = ?5, color = ?6,
         font_color = ?7, font_family = ?8, font_size = ?9, z_order = ?10, visible = ?11
         WHERE id = ?12",
        params![
            note.text,
            note.x,
            note.y,
            note.width,
            note.height,
            note.color.to_string(),
            note.font_color.to_string(),
            note.font.family,
            note.font.size,
            note.z_order,
            note.visible,
            id,
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

/// Delete a note; a missing id is not an error
pub fn delete_note(conn: &Connection, id: NoteId) -> Result<(), StoreError> {
    debug!("SQLite: delete note {}", id);
    conn.execute("DELETE FROM notes WHERE id = ?1", [id])?;
    Ok(())
}

/// All notes, bottom of the stack first
pub fn list_notes(conn: &Connection) -> Result<Vec<Note>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NOTE_COLUMNS} FROM notes ORDER BY z_order ASC, id ASC"
    ))?;

    let notes = stmt.query_map([], raw_note)?;

    notes
        .map(|raw| raw.map(RawNote::into_note).map_err(StoreError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Font, Rgba};
    use crate::database::schema::ensure_sqlite_schema;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_sqlite_schema(&conn).unwrap();
        conn
    }

    fn sample(text: &str, z: i64) -> Note {
        Note {
            id: None,
            text: text.to_string(),
            x: 10,
            y: 10,
            width: 100,
            height: 100,
            color: Rgba::WHITE,
            font_color: Rgba::BLACK,
            font: Font::new("Sans", 12),
            z_order: z,
            visible: true,
        }
    }

    #[test]
    fn test_insert_assigns_id() {
        let conn = test_conn();
        let saved = insert_note(&conn, &sample("hi", 0)).unwrap();
        assert!(saved.id.unwrap() >= 1);

        let notes = list_notes(&conn).unwrap();
        assert_eq!(notes, vec![saved]);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let conn = test_conn();
        let ghost = sample("ghost", 0).with_id(99);
        assert_eq!(update_note(&conn, &ghost), Err(StoreError::NotFound(99)));
    }

    #[test]
    fn test_update_unsaved_is_rejected() {
        let conn = test_conn();
        assert!(matches!(
            update_note(&conn, &sample("new", 0)),
            Err(StoreError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_insert_rejects_zero_size() {
        let conn = test_conn();
        let mut note = sample("flat", 0);
        note.height = 0;
        assert!(matches!(
            insert_note(&conn, &note),
            Err(StoreError::ConstraintViolation(_))
        ));
        assert!(list_notes(&conn).unwrap().is_empty());
    }
}
