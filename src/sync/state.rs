//! Per-note sync state

use std::fmt;

use crate::database::Note;

/// Client-side handle for a note window, valid before the store assigns an id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteKey(pub(crate) u64);

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "note#{}", self.0)
    }
}

/// Where a note stands relative to the store
///
/// `Unsaved -> Persisted -> Dirty -> Persisted ... -> Deleted`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteState {
    /// Created client-side, no id yet
    Unsaved,
    /// Store matches memory
    Persisted,
    /// Changed since the last successful write
    Dirty,
    /// Terminal; later writes for this note are dropped
    Deleted,
}

impl NoteState {
    pub fn is_live(&self) -> bool {
        !matches!(self, NoteState::Deleted)
    }

    /// True when memory holds something the store does not
    pub fn needs_flush(&self) -> bool {
        matches!(self, NoteState::Unsaved | NoteState::Dirty)
    }
}

/// A note window's record plus its sync state
#[derive(Debug, Clone)]
pub struct TrackedNote {
    pub note: Note,
    pub state: NoteState,
}

impl TrackedNote {
    pub fn unsaved(note: Note) -> Self {
        Self {
            note,
            state: NoteState::Unsaved,
        }
    }

    pub fn persisted(note: Note) -> Self {
        Self {
            note,
            state: NoteState::Persisted,
        }
    }

    /// Record a local change. An unsaved note stays unsaved until its insert.
    pub fn mark_dirty(&mut self) {
        if self.state == NoteState::Persisted {
            self.state = NoteState::Dirty;
        }
    }

    /// A write succeeded
    pub fn mark_persisted(&mut self) {
        if self.state.is_live() {
            self.state = NoteState::Persisted;
        }
    }

    pub fn mark_deleted(&mut self) {
        self.state = NoteState::Deleted;
    }
}
