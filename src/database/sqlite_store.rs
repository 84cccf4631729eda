//! Embedded SQLite engine

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use super::models::{Note, NoteId, Preferences};
use super::preferences;
use super::queries;
use super::repository::NoteRepository;
use crate::error::{ConnectFailure, ConnectionError, StoreError};

/// Single-file database session
pub struct SqliteStore {
    /// Path to the database file, `None` for in-memory
    path: Option<PathBuf>,
    conn: rusqlite::Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and its parent directory.
    ///
    /// `busy_timeout` bounds how long a write waits for another process that
    /// holds the file lock before failing with a busy error.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, ConnectionError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConnectionError::new(
                    ConnectFailure::InvalidPath,
                    format!("{}: {}", parent.display(), e),
                )
            })?;
        }

        let conn = rusqlite::Connection::open(path).map_err(|e| invalid_path(path, e))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| invalid_path(path, e))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA foreign_keys=ON;\
             PRAGMA synchronous=NORMAL;",
        )
        .map_err(|e| invalid_path(path, e))?;

        info!("Connected to SQLite database {}", path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn,
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, ConnectionError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| ConnectionError::new(ConnectFailure::InvalidPath, e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| ConnectionError::new(ConnectFailure::InvalidPath, e.to_string()))?;
        Ok(Self { path: None, conn })
    }

    /// Get a reference to the connection
    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Get the database path
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn ping(&self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    /// Force a WAL checkpoint to write all data to the main database file
    ///
    /// Uses TRUNCATE mode which checkpoints all frames and truncates the WAL file.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")?;
        Ok(())
    }

    /// Checkpoint and release the file
    pub fn close(self) {
        if self.path.is_some() {
            if let Err(e) = self.checkpoint() {
                warn!("WAL checkpoint on close failed: {}", e);
            }
        }
        if let Err((_, e)) = self.conn.close() {
            warn!("Closing SQLite database failed: {}", e);
        }
    }
}

fn invalid_path(path: &Path, err: rusqlite::Error) -> ConnectionError {
    ConnectionError::new(
        ConnectFailure::InvalidPath,
        format!("{}: {}", path.display(), err),
    )
}

impl NoteRepository for SqliteStore {
    fn insert(&mut self, note: &Note) -> Result<Note, StoreError> {
        queries::insert_note(&self.conn, note)
    }

    fn update(&mut self, note: &Note) -> Result<(), StoreError> {
        queries::update_note(&self.conn, note)
    }

    fn delete(&mut self, id: NoteId) -> Result<(), StoreError> {
        queries::delete_note(&self.conn, id)
    }

    fn list_all(&mut self) -> Result<Vec<Note>, StoreError> {
        queries::list_notes(&self.conn)
    }

    fn get_preferences(&mut self) -> Result<Preferences, StoreError> {
        preferences::sqlite_load(&self.conn)
    }

    fn save_preferences(&mut self, prefs: &Preferences) -> Result<(), StoreError> {
        preferences::sqlite_save(&self.conn, prefs)
    }
}
