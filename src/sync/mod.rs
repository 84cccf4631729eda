//! Note synchronization
//!
//! Tracks every open note, decides when local edits reach the repository,
//! and reports store outcomes back to the UI.

pub mod coordinator;
pub mod debounce;
pub mod events;
pub mod state;

pub use coordinator::SyncCoordinator;
pub use events::{NoteEvent, Notification};
pub use state::{NoteKey, NoteState};
