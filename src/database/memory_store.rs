//! In-process store for the `none` engine

use std::collections::BTreeMap;

use log::debug;

use super::models::{Note, NoteId, Preferences};
use super::preferences;
use super::repository::{NoteRepository, Session};
use crate::error::{ConnectionError, StoreError};

/// Notes held in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    notes: BTreeMap<NoteId, Note>,
    last_id: NoteId,
    preferences: Option<Preferences>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl NoteRepository for MemoryStore {
    fn insert(&mut self, note: &Note) -> Result<Note, StoreError> {
        note.validate()?;
        self.last_id += 1;
        let saved = note.with_id(self.last_id);
        debug!("Memory: insert note {}", self.last_id);
        self.notes.insert(self.last_id, saved.clone());
        Ok(saved)
    }

    fn update(&mut self, note: &Note) -> Result<(), StoreError> {
        let id = note.id.ok_or_else(|| {
            StoreError::ConstraintViolation("cannot update an unsaved note".into())
        })?;
        note.validate()?;
        match self.notes.get_mut(&id) {
            Some(stored) => {
                *stored = note.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn delete(&mut self, id: NoteId) -> Result<(), StoreError> {
        self.notes.remove(&id);
        Ok(())
    }

    fn list_all(&mut self) -> Result<Vec<Note>, StoreError> {
        let mut notes: Vec<Note> = self.notes.values().cloned().collect();
        notes.sort_by_key(|n| (n.z_order, n.id));
        Ok(notes)
    }

    fn get_preferences(&mut self) -> Result<Preferences, StoreError> {
        Ok(self.preferences.clone().unwrap_or_default())
    }

    fn save_preferences(&mut self, prefs: &Preferences) -> Result<(), StoreError> {
        preferences::validate(prefs)?;
        self.preferences = Some(prefs.clone());
        Ok(())
    }
}

impl Session for MemoryStore {
    fn ping(&mut self) -> bool {
        true
    }

    fn reconnect(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn close(&mut self) {}
}
