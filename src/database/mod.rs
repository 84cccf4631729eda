//! Database layer for QSticky
//!
//! Handles storage for both supported engines, including:
//! - Opening, probing and closing the single process-wide session
//! - Schema creation and additive migrations
//! - CRUD operations for notes and the preferences row

pub mod models;
pub mod schema;
pub mod connection;
pub mod migrations;
pub mod queries;
pub mod preferences;
pub mod repository;
pub mod sqlite_store;
pub mod postgres_store;
pub mod memory_store;

pub use connection::{Connection, ConnectionManager};
pub use memory_store::MemoryStore;
pub use models::*;
pub use postgres_store::PostgresStore;
pub use repository::{NoteRepository, Session};
pub use sqlite_store::SqliteStore;
