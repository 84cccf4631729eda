//! Engine-neutral data-access contract

use super::models::{Note, NoteId, Preferences};
use crate::error::{ConnectionError, StoreError};

/// CRUD over notes and the preferences row.
///
/// Every operation is one short transaction; none is held across calls.
/// Engine failures arrive classified as [`StoreError`].
pub trait NoteRepository {
    /// Persist a note that has no id yet and return it with the assigned id
    fn insert(&mut self, note: &Note) -> Result<Note, StoreError>;

    /// Overwrite the full row; `NotFound` when the id is gone
    fn update(&mut self, note: &Note) -> Result<(), StoreError>;

    /// Remove the row; deleting a missing id succeeds
    fn delete(&mut self, id: NoteId) -> Result<(), StoreError>;

    /// Every note, ordered by z-order ascending
    fn list_all(&mut self) -> Result<Vec<Note>, StoreError>;

    /// Stored preferences merged over the built-in defaults
    fn get_preferences(&mut self) -> Result<Preferences, StoreError>;

    /// Insert the preferences row if absent, else overwrite it
    fn save_preferences(&mut self, prefs: &Preferences) -> Result<(), StoreError>;
}

/// A repository bound to a live session that can be checked and re-established
pub trait Session: NoteRepository {
    /// Cheap liveness check
    fn ping(&mut self) -> bool;

    /// Drop the current session and open a fresh one with the same parameters
    fn reconnect(&mut self) -> Result<(), ConnectionError>;

    /// Release the session; later calls fail with `ConnectionLost`
    fn close(&mut self);
}
