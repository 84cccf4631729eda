//! Events consumed from, and notifications emitted to, the widget layer

use crate::database::{Font, Note, NoteId, Preferences, Rgba};

use super::state::NoteKey;

/// A change reported by a note window or the preferences dialog
#[derive(Debug, Clone, PartialEq)]
pub enum NoteEvent {
    NoteCreated,
    NoteTextChanged { key: NoteKey, text: String },
    NoteMoved { key: NoteKey, x: i32, y: i32 },
    NoteResized { key: NoteKey, width: i32, height: i32 },
    NoteRecolored {
        key: NoteKey,
        color: Rgba,
        font_color: Rgba,
    },
    NoteRefonted { key: NoteKey, font: Font },
    /// The window gained focus and moves to the top of the stack
    NoteFocused { key: NoteKey },
    NoteHidden { key: NoteKey },
    NoteShown { key: NoteKey },
    NoteDeleted { key: NoteKey },
    ShowAllRequested,
    PreferencesSaved(Preferences),
}

/// Something the widget layer must apply or display
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A write for this note reached the store
    NotePersisted { key: NoteKey, id: NoteId },
    /// Reading notes from the store failed
    NoteLoadFailed(String),
    /// The note vanished from the store; close its window
    NoteExternallyRemoved { key: NoteKey, id: NoteId },
    /// A write failed; the in-memory note is kept
    StoreUnavailable(String),
    /// A stored note with no open window; open one
    NoteLoaded { key: NoteKey, note: Note },
    /// Another instance changed a note this window had not modified
    NoteExternallyUpdated { key: NoteKey, note: Note },
}
