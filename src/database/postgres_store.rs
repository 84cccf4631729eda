//! Networked PostgreSQL engine

use std::time::Duration;

use log::{debug, info};
use postgres::{Client, NoTls, Row};

use super::models::{Note, NoteId, Preferences, RawNote};
use super::preferences;
use super::queries::NOTE_COLUMNS;
use super::repository::NoteRepository;
use crate::config::SyncSettings;
use crate::error::{ConnectionError, StoreError};

/// Socket directories tried, in order, when no host is configured
#[cfg(unix)]
pub const LOCAL_SOCKET_DIRS: &[&str] = &["/var/run/postgresql", "/tmp"];

/// Parameters for one server session
#[derive(Debug, Clone)]
pub struct PgParams<'a> {
    /// `None` uses the local socket transport
    pub host: Option<&'a str>,
    pub port: u16,
    pub dbname: &'a str,
    pub user: &'a str,
    pub password: &'a str,
}

/// Server database session
pub struct PostgresStore {
    client: Client,
    ping_timeout: Duration,
}

impl PostgresStore {
    /// Connect with bounded connect and statement time
    pub fn open(params: &PgParams<'_>, settings: &SyncSettings) -> Result<Self, ConnectionError> {
        let mut config = postgres::Config::new();
        match params.host {
            Some(host) => {
                config.host(host);
            }
            None => use_local_socket(&mut config),
        }
        config
            .port(params.port)
            .dbname(params.dbname)
            .user(params.user)
            .application_name("qsticky")
            .connect_timeout(settings.connect_timeout)
            .options(&format!(
                "-c statement_timeout={}",
                settings.query_timeout.as_millis()
            ));
        if !params.password.is_empty() {
            config.password(params.password);
        }

        // statement_timeout is enforced by the server; a dead link needs a
        // client-side bound so reads fail with an IO error instead of blocking
        let keepalive = Keepalive::for_query_timeout(settings.query_timeout);
        config
            .keepalives(true)
            .keepalives_idle(keepalive.idle)
            .keepalives_interval(keepalive.interval)
            .keepalives_retries(keepalive.retries)
            .tcp_user_timeout(keepalive.user_timeout);

        let mut client = config.connect(NoTls)?;

        let version: String = client.query_one("SELECT version()", &[])?.try_get(0)?;
        info!(
            "Connected to {} at {}:{}/{}",
            version,
            params.host.unwrap_or("local socket"),
            params.port,
            params.dbname
        );

        Ok(Self {
            client,
            ping_timeout: settings.query_timeout,
        })
    }

    /// Get a mutable reference to the client
    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    pub fn ping(&mut self) -> bool {
        self.client.is_valid(self.ping_timeout).is_ok()
    }

    pub fn close(self) {
        if let Err(e) = self.client.close() {
            debug!("Closing PostgreSQL session: {}", e);
        }
    }
}

/// TCP keepalive settings derived from the query timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Keepalive {
    idle: Duration,
    interval: Duration,
    retries: u32,
    /// Upper bound on unacknowledged writes (Linux only)
    user_timeout: Duration,
}

impl Keepalive {
    const RETRIES: u32 = 3;
    const MIN_STEP: Duration = Duration::from_secs(1);

    /// A silent peer is declared dead within about twice `query_timeout`
    fn for_query_timeout(query_timeout: Duration) -> Self {
        let idle = query_timeout.max(Self::MIN_STEP);
        let interval = (idle / (Self::RETRIES + 1)).max(Self::MIN_STEP);
        Self {
            idle,
            interval,
            retries: Self::RETRIES,
            user_timeout: idle,
        }
    }
}

#[cfg(unix)]
fn use_local_socket(config: &mut postgres::Config) {
    for dir in LOCAL_SOCKET_DIRS {
        config.host_path(dir);
    }
}

#[cfg(not(unix))]
fn use_local_socket(config: &mut postgres::Config) {
    config.host("localhost");
}

fn raw_note(row: &Row) -> Result<RawNote, postgres::Error> {
    Ok(RawNote {
        id: row.try_get(0)?,
        text: row.try_get(1)?,
        x: row.try_get(2)?,
        y: row.try_get(3)?,
        width: row.try_get(4)?,
        height: row.try_get(5)?,
        color: row.try_get(6)?,
        font_color: row.try_get(7)?,
        font_family: row.try_get(8)?,
        font_size: row.try_get(9)?,
        z_order: row.try_get(10)?,
        visible: row.try_get(11)?,
    })
}

impl NoteRepository for PostgresStore {
    fn insert(&mut self, note: &Note) -> Result<Note, StoreError> {
        note.validate()?;
        debug!("PostgreSQL: insert note z={}", note.z_order);
        let color = note.color.to_string();
        let font_color = note.font_color.to_string();
        let row = self.client.query_one(
            "INSERT INTO notes (text, x, y, width, height, color, font_color, font_family, font_size, z_order, visible)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING id",
            &[
                &note.text,
                &note.x,
                &note.y,
                &note.width,
                &note.height,
                &color,
                &font_color,
                &note.font.family,
                &note.font.size,
                &note.z_order,
                &note.visible,
            ],
        )?;
        let id: NoteId = row.try_get(0)?;
        Ok(note.with_id(id))
    }

    fn update(&mut self, note: &Note) -> Result<(), StoreError> {
        let id = note.id.ok_or_else(|| {
            StoreError::ConstraintViolation("cannot update an unsaved note".into())
        })?;
        note.validate()?;
        debug!("PostgreSQL: update note {}", id);
        let color = note.color.to_string();
        let font_color = note.font_color.to_string();
        let changed = self.client.execute(
            "UPDATE notes SET text = $1, x = $2, y = $3, width = $4, height = $5, color = $6,
             font_color = $7, font_family = $8, font_size = $9, z_order = $10, visible = $11
             WHERE id = $12",
            &[
                &note.text,
                &note.x,
                &note.y,
                &note.width,
                &note.height,
                &color,
                &font_color,
                &note.font.family,
                &note.font.size,
                &note.z_order,
                &note.visible,
                &id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn delete(&mut self, id: NoteId) -> Result<(), StoreError> {
        debug!("PostgreSQL: delete note {}", id);
        self.client
            .execute("DELETE FROM notes WHERE id = $1", &[&id])?;
        Ok(())
    }

    fn list_all(&mut self) -> Result<Vec<Note>, StoreError> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY z_order ASC, id ASC");
        let rows = self.client.query(sql.as_str(), &[])?;
        rows.iter()
            .map(|row| raw_note(row).map(RawNote::into_note).map_err(StoreError::from))
            .collect()
    }

    fn get_preferences(&mut self) -> Result<Preferences, StoreError> {
        preferences::pg_load(&mut self.client)
    }

    fn save_preferences(&mut self, prefs: &Preferences) -> Result<(), StoreError> {
        preferences::pg_save(&mut self.client, prefs)
    }
}
