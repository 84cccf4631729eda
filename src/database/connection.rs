//! Database connection management
//!
//! The process holds exactly one session, owned by a [`ConnectionManager`]
//! built at startup and closed at shutdown.

use log::{info, warn};

use super::memory_store::MemoryStore;
use super::models::{Note, NoteId, Preferences};
use super::postgres_store::{PgParams, PostgresStore};
use super::repository::{NoteRepository, Session};
use super::sqlite_store::SqliteStore;
use crate::config::{ConnectionConfig, Engine, SyncSettings};
use crate::error::{ConnectionError, StoreError};

/// An open session on one of the supported engines
pub enum Connection {
    Sqlite(SqliteStore),
    Postgres(PostgresStore),
    Memory(MemoryStore),
}

impl Connection {
    /// Open a session for the given config. Never retries.
    pub fn open(
        config: &ConnectionConfig,
        settings: &SyncSettings,
    ) -> Result<Self, ConnectionError> {
        match config {
            ConnectionConfig::Sqlite { path } => {
                // A busy file waits at most as long as a networked query would
                SqliteStore::open(path, settings.query_timeout).map(Connection::Sqlite)
            }
            ConnectionConfig::Postgres {
                host,
                port,
                dbname,
                user,
                password,
            } => {
                let params = PgParams {
                    host: host.as_deref(),
                    port: *port,
                    dbname,
                    user,
                    password,
                };
                PostgresStore::open(&params, settings).map(Connection::Postgres)
            }
            ConnectionConfig::Memory => {
                info!("Persistence disabled, notes are kept in memory");
                Ok(Connection::Memory(MemoryStore::new()))
            }
        }
    }

    pub fn engine(&self) -> Engine {
        match self {
            Connection::Sqlite(_) => Engine::Sqlite,
            Connection::Postgres(_) => Engine::Postgres,
            Connection::Memory(_) => Engine::None,
        }
    }

    /// Check the session is still usable
    pub fn ping(&mut self) -> bool {
        match self {
            Connection::Sqlite(store) => store.ping(),
            Connection::Postgres(store) => store.ping(),
            Connection::Memory(_) => true,
        }
    }

    /// Close the session
    pub fn close(self) {
        let engine = self.engine();
        match self {
            Connection::Sqlite(store) => store.close(),
            Connection::Postgres(store) => store.close(),
            Connection::Memory(_) => {}
        }
        info!("Closed {} session", engine.as_str());
    }

    fn repository(&mut self) -> &mut dyn NoteRepository {
        match self {
            Connection::Sqlite(store) => store,
            Connection::Postgres(store) => store,
            Connection::Memory(store) => store,
        }
    }
}

impl NoteRepository for Connection {
    fn insert(&mut self, note: &Note) -> Result<Note, StoreError> {
        self.repository().insert(note)
    }

    fn update(&mut self, note: &Note) -> Result<(), StoreError> {
        self.repository().update(note)
    }

    fn delete(&mut self, id: NoteId) -> Result<(), StoreError> {
        self.repository().delete(id)
    }

    fn list_all(&mut self) -> Result<Vec<Note>, StoreError> {
        self.repository().list_all()
    }

    fn get_preferences(&mut self) -> Result<Preferences, StoreError> {
        self.repository().get_preferences()
    }

    fn save_preferences(&mut self, prefs: &Preferences) -> Result<(), StoreError> {
        self.repository().save_preferences(prefs)
    }
}

/// Process-wide owner of the single session
pub struct ConnectionManager {
    config: ConnectionConfig,
    settings: SyncSettings,
    conn: Option<Connection>,
}

impl ConnectionManager {
    /// Open the session described by `config`
    pub fn open(config: &ConnectionConfig, settings: SyncSettings) -> Result<Self, ConnectionError> {
        let conn = Connection::open(config, &settings)?;
        Ok(Self {
            config: config.clone(),
            settings,
            conn: Some(conn),
        })
    }

    /// Get a mutable reference to the connection
    pub fn connection_mut(&mut self) -> Result<&mut Connection, StoreError> {
        self.conn
            .as_mut()
            .ok_or_else(|| StoreError::ConnectionLost("Database not open".to_string()))
    }

    /// Check if a session is held
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }
}

impl NoteRepository for ConnectionManager {
    fn insert(&mut self, note: &Note) -> Result<Note, StoreError> {
        self.connection_mut()?.insert(note)
    }

    fn update(&mut self, note: &Note) -> Result<(), StoreError> {
        self.connection_mut()?.update(note)
    }

    fn delete(&mut self, id: NoteId) -> Result<(), StoreError> {
        self.connection_mut()?.delete(id)
    }

    fn list_all(&mut self) -> Result<Vec<Note>, StoreError> {
        self.connection_mut()?.list_all()
    }

    fn get_preferences(&mut self) -> Result<Preferences, StoreError> {
        self.connection_mut()?.get_preferences()
    }

    fn save_preferences(&mut self, prefs: &Preferences) -> Result<(), StoreError> {
        self.connection_mut()?.save_preferences(prefs)
    }
}

impl Session for ConnectionManager {
    fn ping(&mut self) -> bool {
        self.conn.as_mut().is_some_and(Connection::ping)
    }

    fn reconnect(&mut self) -> Result<(), ConnectionError> {
        // The in-memory engine has nothing to re-establish and must keep its notes
        if matches!(self.conn, Some(Connection::Memory(_))) {
            return Ok(());
        }
        if let Some(old) = self.conn.take() {
            old.close();
        }
        warn!("Reconnecting to {} database", self.config.engine().as_str());
        let conn = Connection::open(&self.config, &self.settings)?;
        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        Session::close(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::ensure_schema;
    use tempfile::TempDir;

    fn sqlite_manager(temp_dir: &TempDir) -> ConnectionManager {
        let config = ConnectionConfig::sqlite(temp_dir.path().join("notes.db"));
        let mut manager = ConnectionManager::open(&config, SyncSettings::default()).unwrap();
        ensure_schema(manager.connection_mut().unwrap()).unwrap();
        manager
    }

    #[test]
    fn test_open_sqlite() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = sqlite_manager(&temp_dir);
        assert!(manager.is_open());
        assert!(manager.ping());
        assert_eq!(manager.connection_mut().unwrap().engine(), Engine::Sqlite);
    }

    #[test]
    fn test_close_then_operations_fail_with_connection_lost() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = sqlite_manager(&temp_dir);
        Session::close(&mut manager);

        assert!(!manager.is_open());
        assert!(!manager.ping());
        assert!(matches!(
            manager.list_all(),
            Err(StoreError::ConnectionLost(_))
        ));
    }

    #[test]
    fn test_reconnect_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = sqlite_manager(&temp_dir);
        manager.insert(&Note::default()).unwrap();

        Session::close(&mut manager);
        manager.reconnect().unwrap();

        assert!(manager.ping());
        assert_eq!(manager.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_reconnect_keeps_notes() {
        let mut manager =
            ConnectionManager::open(&ConnectionConfig::Memory, SyncSettings::default()).unwrap();
        manager.insert(&Note::default()).unwrap();
        manager.reconnect().unwrap();
        assert_eq!(manager.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_open_invalid_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // A regular file cannot be used as a parent directory
        let config = ConnectionConfig::sqlite(blocker.join("notes.db"));
        let result = ConnectionManager::open(&config, SyncSettings::default());
        assert!(result.is_err());
    }
}
