//! # QSticky Core
//!
//! Persistence and synchronization layer for desktop sticky notes.
//!
//! ## Features
//!
//! - Embedded SQLite or networked PostgreSQL storage behind one repository contract
//! - Idempotent, additive schema migration on startup
//! - Per-note sync state machine with debounced writes
//! - One-shot reconnect-and-retry when the session drops
//! - Global preferences (default colors and font) stored alongside the notes
//!
//! ## Example
//!
//! ```no_run
//! use qsticky::{ConnectionConfig, SyncCoordinator, SyncSettings};
//! use std::time::Instant;
//!
//! let config = ConnectionConfig::sqlite("/tmp/qsticky.db");
//! let mut sync = SyncCoordinator::connect(&config, SyncSettings::default()).unwrap();
//! let loaded = sync.load().unwrap();
//! for (key, note) in loaded {
//!     println!("{key}: {}", note.text);
//! }
//!
//! let key = sync.create_note();
//! let now = Instant::now();
//! sync.set_text(key, "remember the milk", now);
//! if let Some(deadline) = sync.next_deadline() {
//!     sync.tick(deadline);
//! }
//! sync.shutdown();
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod sync;

// Re-export main types
pub use config::{ConnectionConfig, Engine, SyncSettings};
pub use database::{
    Connection, ConnectionManager, Font, MemoryStore, Note, NoteId, NoteRepository, Preferences,
    Rgba, Session,
};
pub use error::{
    ConfigError, ConnectFailure, ConnectionError, Result, SchemaError, StickyError, StoreError,
};
pub use sync::{NoteEvent, NoteKey, NoteState, Notification, SyncCoordinator};

/// Current schema version recorded in `qsticky_meta`
pub const SCHEMA_VERSION: u32 = 2;

/// Default SQLite database filename
pub const DATABASE_FILENAME: &str = "qsticky.db";

/// Default PostgreSQL port
pub const DEFAULT_PG_PORT: u16 = 5432;

/// Default PostgreSQL database name
pub const DEFAULT_PG_DBNAME: &str = "qsticky";

/// Geometry of a freshly created note
pub const DEFAULT_NOTE_X: i32 = 10;
pub const DEFAULT_NOTE_Y: i32 = 10;
pub const DEFAULT_NOTE_WIDTH: i32 = 256;
pub const DEFAULT_NOTE_HEIGHT: i32 = 256;

/// Built-in default background color
pub const DEFAULT_BACKGROUND: &str = "lemonchiffon";

/// Built-in default text color
pub const DEFAULT_FOREGROUND: &str = "black";

/// Built-in default font family
pub const DEFAULT_FONT_FAMILY: &str = "Sans";

/// Built-in default font size in points
pub const DEFAULT_FONT_SIZE: i32 = 12;

/// Fixed key of the singleton preferences row
pub const PREFERENCES_ROW_ID: i64 = 1;
