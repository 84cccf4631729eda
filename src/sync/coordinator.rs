//! Sync coordinator
//!
//! The only component that writes to the repository on behalf of the UI.
//! It owns the per-note state machine, debounces continuous edits, reloads
//! on "show all", and applies the one-shot reconnect-and-retry policy. All
//! calls happen on the UI thread; nothing here spawns threads.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use log::{debug, error, info, warn};

use super::debounce::FlushQueue;
use super::events::{NoteEvent, Notification};
use super::state::{NoteKey, NoteState, TrackedNote};
use crate::config::{ConnectionConfig, SyncSettings};
use crate::database::{ConnectionManager, Font, Note, NoteId, Preferences, Rgba, Session, schema};
use crate::error::{Result, StoreError};

type StoreResult<T> = std::result::Result<T, StoreError>;

pub struct SyncCoordinator<S: Session = ConnectionManager> {
    session: S,
    settings: SyncSettings,
    /// Every note this process has seen. Deleted notes stay as tombstones
    /// until [`forget`](Self::forget) so late widget events are recognised.
    notes: HashMap<NoteKey, TrackedNote>,
    ids: HashMap<NoteId, NoteKey>,
    queue: FlushQueue,
    outbox: VecDeque<Notification>,
    preferences: Preferences,
    last_key: u64,
    reload_pending: bool,
}

impl SyncCoordinator<ConnectionManager> {
    /// Open the session and migrate the schema. Every error here is fatal.
    pub fn connect(config: &ConnectionConfig, settings: SyncSettings) -> Result<Self> {
        config.validate()?;
        let mut manager = ConnectionManager::open(config, settings)?;
        schema::ensure_schema(manager.connection_mut()?)?;
        Ok(Self::new(manager, settings))
    }
}

impl<S: Session> SyncCoordinator<S> {
    pub fn new(session: S, settings: SyncSettings) -> Self {
        Self {
            session,
            settings,
            notes: HashMap::new(),
            ids: HashMap::new(),
            queue: FlushQueue::new(),
            outbox: VecDeque::new(),
            preferences: Preferences::default(),
            last_key: 0,
            reload_pending: false,
        }
    }

    /// Startup load: preferences, then every stored note in stacking order.
    ///
    /// An empty store gets one fresh note.
    pub fn load(&mut self) -> Result<Vec<(NoteKey, Note)>> {
        match self.with_retry(|s| s.get_preferences()) {
            Ok(prefs) => self.preferences = prefs,
            Err(e) => warn!("Using default preferences: {}", e),
        }

        let stored = match self.with_retry(|s| s.list_all()) {
            Ok(notes) => notes,
            Err(e) => {
                error!("Loading notes failed: {}", e);
                self.outbox
                    .push_back(Notification::NoteLoadFailed(e.to_string()));
                return Err(e.into());
            }
        };

        let mut keys = Vec::with_capacity(stored.len());
        for note in stored {
            let Some(id) = note.id else { continue };
            if self.ids.contains_key(&id) {
                continue;
            }
            let key = self.track(TrackedNote::persisted(note));
            self.ids.insert(id, key);
            keys.push(key);
        }

        if self.preferences.apply_globally {
            debug!("Applying global preferences to loaded notes");
            self.restyle_all();
        }

        if keys.is_empty() && self.live_keys().is_empty() {
            info!("No stored notes, creating the first one");
            keys.push(self.create_note());
        }

        let loaded: Vec<(NoteKey, Note)> = keys
            .into_iter()
            .filter_map(|key| self.note(key).map(|note| (key, note.clone())))
            .collect();
        info!("Loaded {} notes", loaded.len());
        Ok(loaded)
    }

    /// Dispatch a widget event. Returns the new key for `NoteCreated`.
    pub fn handle(&mut self, event: NoteEvent, now: Instant) -> Option<NoteKey> {
        match event {
            NoteEvent::NoteCreated => return Some(self.create_note()),
            NoteEvent::NoteTextChanged { key, text } => {
                self.set_text(key, text, now);
            }
            NoteEvent::NoteMoved { key, x, y } => {
                self.move_note(key, x, y, now);
            }
            NoteEvent::NoteResized { key, width, height } => {
                self.resize_note(key, width, height, now);
            }
            NoteEvent::NoteRecolored {
                key,
                color,
                font_color,
            } => {
                self.recolor_note(key, color, font_color);
            }
            NoteEvent::NoteRefonted { key, font } => {
                self.refont_note(key, font);
            }
            NoteEvent::NoteFocused { key } => {
                self.focus_note(key, now);
            }
            NoteEvent::NoteHidden { key } => {
                self.hide_note(key);
            }
            NoteEvent::NoteShown { key } => {
                self.show_note(key);
            }
            NoteEvent::NoteDeleted { key } => {
                // failure is reported through the outbox
                let _ = self.delete_note(key);
            }
            NoteEvent::ShowAllRequested => self.request_show_all(),
            NoteEvent::PreferencesSaved(prefs) => {
                let _ = self.save_preferences(prefs);
            }
        }
        None
    }

    /// New note styled with the current preferences, placed on top and inserted at once
    pub fn create_note(&mut self) -> NoteKey {
        let mut note = Note::with_preferences(&self.preferences);
        note.z_order = self.top_z(None) + 1;
        let key = self.track(TrackedNote::unsaved(note));
        debug!("Created {}", key);
        // an insert failure leaves the note Unsaved and is reported through the outbox
        let _ = self.flush_key(key);
        key
    }

    /// Edits return true when the note changed. No-op edits, unknown keys
    /// and deleted notes return false and write nothing.
    pub fn set_text(&mut self, key: NoteKey, text: impl Into<String>, now: Instant) -> bool {
        let text = text.into();
        self.edit(key, Some(now), |note| {
            if note.text == text {
                return false;
            }
            note.text = text;
            true
        })
    }

    pub fn move_note(&mut self, key: NoteKey, x: i32, y: i32, now: Instant) -> bool {
        self.edit(key, Some(now), |note| {
            if (note.x, note.y) == (x, y) {
                return false;
            }
            note.x = x;
            note.y = y;
            true
        })
    }

    /// Sizes below one pixel are clamped to one
    pub fn resize_note(&mut self, key: NoteKey, width: i32, height: i32, now: Instant) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        self.edit(key, Some(now), |note| {
            if (note.width, note.height) == (width, height) {
                return false;
            }
            note.width = width;
            note.height = height;
            true
        })
    }

    /// Raise the note above every other live note
    pub fn focus_note(&mut self, key: NoteKey, now: Instant) -> bool {
        let top = self.top_z(Some(key));
        self.edit(key, Some(now), |note| {
            if note.z_order > top {
                return false;
            }
            note.z_order = top + 1;
            true
        })
    }

    pub fn recolor_note(&mut self, key: NoteKey, color: Rgba, font_color: Rgba) -> bool {
        self.edit(key, None, |note| {
            if (note.color, note.font_color) == (color, font_color) {
                return false;
            }
            note.color = color;
            note.font_color = font_color;
            true
        })
    }

    pub fn refont_note(&mut self, key: NoteKey, font: Font) -> bool {
        self.edit(key, None, |note| {
            if note.font == font {
                return false;
            }
            note.font = font;
            true
        })
    }

    /// Hide the window; the row stays
    pub fn hide_note(&mut self, key: NoteKey) -> bool {
        self.edit(key, None, |note| std::mem::replace(&mut note.visible, false))
    }

    pub fn show_note(&mut self, key: NoteKey) -> bool {
        self.edit(key, None, |note| !std::mem::replace(&mut note.visible, true))
    }

    /// Remove the note from the store. Deleted is terminal.
    pub fn delete_note(&mut self, key: NoteKey) -> StoreResult<()> {
        let Some(tracked) = self.notes.get(&key) else {
            warn!("Delete for unknown {}", key);
            return Ok(());
        };
        let id = match (tracked.state, tracked.note.id) {
            (NoteState::Deleted, _) => return Ok(()),
            (_, None) => {
                // never reached the store
                self.finish_delete(key);
                return Ok(());
            }
            (_, Some(id)) => id,
        };

        match self.with_retry(|s| s.delete(id)) {
            Ok(()) => {
                info!("Deleted note {}", id);
                self.finish_delete(key);
                Ok(())
            }
            Err(e) => Err(self.write_failed(key, e)),
        }
    }

    /// Drop the tombstone of a deleted note once its window is gone.
    /// Later events for the key are ignored as unknown.
    pub fn forget(&mut self, key: NoteKey) -> bool {
        match self.notes.get(&key) {
            Some(tracked) if tracked.state == NoteState::Deleted => {
                self.notes.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Coalesce "show all" requests; the reload runs once on the next tick
    pub fn request_show_all(&mut self) {
        self.reload_pending = true;
    }

    /// Reload from the store and show every note.
    ///
    /// Stored notes without a window are opened, open notes missing from the
    /// store are closed as externally removed, and clean notes adopt the
    /// stored row. Dirty notes keep their local state and overwrite the store.
    pub fn show_all(&mut self) -> StoreResult<()> {
        self.reload_pending = false;
        if !self.ensure_session() {
            return Err(StoreError::ConnectionLost("session unavailable".into()));
        }
        self.flush_all();

        let stored = match self.with_retry(|s| s.list_all()) {
            Ok(notes) => notes,
            Err(e) => {
                error!("Reloading notes failed: {}", e);
                self.outbox
                    .push_back(Notification::NoteLoadFailed(e.to_string()));
                return Err(e);
            }
        };
        let stored_ids: HashSet<NoteId> = stored.iter().filter_map(|n| n.id).collect();

        for note in stored {
            let Some(id) = note.id else { continue };
            match self.ids.get(&id).copied() {
                None => {
                    let mut tracked = TrackedNote::persisted(note);
                    if !tracked.note.visible {
                        tracked.note.visible = true;
                        tracked.mark_dirty();
                    }
                    let note = tracked.note.clone();
                    let key = self.track(tracked);
                    self.ids.insert(id, key);
                    info!("Opened note {} created elsewhere", id);
                    self.outbox.push_back(Notification::NoteLoaded { key, note });
                }
                Some(key) => {
                    if let Some(tracked) = self.notes.get_mut(&key) {
                        if tracked.state == NoteState::Persisted && tracked.note != note {
                            debug!("Note {} changed elsewhere", id);
                            tracked.note = note.clone();
                            self.outbox
                                .push_back(Notification::NoteExternallyUpdated { key, note });
                        }
                    }
                }
            }
        }

        let missing: Vec<(NoteKey, NoteId)> = self
            .notes
            .iter()
            .filter(|(_, t)| matches!(t.state, NoteState::Persisted | NoteState::Dirty))
            .filter_map(|(key, t)| {
                t.note
                    .id
                    .filter(|id| !stored_ids.contains(id))
                    .map(|id| (*key, id))
            })
            .collect();
        for (key, id) in missing {
            self.externally_removed(key, id);
        }

        for tracked in self.notes.values_mut() {
            if tracked.state.is_live() && !tracked.note.visible {
                tracked.note.visible = true;
                tracked.mark_dirty();
            }
        }
        self.flush_all();
        Ok(())
    }

    /// Store the global preferences and, when they apply globally, restyle every note
    pub fn save_preferences(&mut self, prefs: Preferences) -> StoreResult<()> {
        self.preferences = prefs.clone();
        let result = self.with_retry(|s| s.save_preferences(&prefs));
        if let Err(e) = &result {
            error!("Saving preferences failed: {}", e);
            self.outbox
                .push_back(Notification::StoreUnavailable(e.to_string()));
        }

        if prefs.apply_globally {
            self.restyle_all();
        }
        result
    }

    /// Give every live note the colors and font of the current preferences
    fn restyle_all(&mut self) {
        let (color, font_color) = (self.preferences.color, self.preferences.font_color);
        for key in self.live_keys() {
            let font = self.preferences.font.clone();
            self.edit(key, None, |note| {
                if (note.color, note.font_color, &note.font) == (color, font_color, &font) {
                    return false;
                }
                note.color = color;
                note.font_color = font_color;
                note.font = font;
                true
            });
        }
    }

    /// Run due debounced writes and a pending "show all" reload
    pub fn tick(&mut self, now: Instant) {
        if self.reload_pending {
            let _ = self.show_all();
        }

        let due = self.queue.pop_due(now);
        if due.is_empty() {
            return;
        }
        // Notes stay Dirty until the next sync point if the session is gone
        if !self.ensure_session() {
            return;
        }
        for key in due {
            let _ = self.flush_key(key);
        }
    }

    /// Write every unsaved or dirty note now. Returns how many remain unwritten.
    pub fn flush_all(&mut self) -> usize {
        let mut keys: Vec<NoteKey> = self
            .notes
            .iter()
            .filter(|(_, t)| t.state.needs_flush())
            .map(|(key, _)| *key)
            .collect();
        if keys.is_empty() {
            return 0;
        }
        keys.sort();
        if !self.ensure_session() {
            return keys.len();
        }
        keys.into_iter()
            .filter(|key| {
                self.queue.cancel(*key);
                self.flush_key(*key).is_err()
            })
            .count()
    }

    /// Best-effort flush, then close the session
    pub fn shutdown(mut self) -> usize {
        let unwritten = self.flush_all();
        if unwritten > 0 {
            warn!("{} notes could not be saved before shutdown", unwritten);
        }
        self.session.close();
        info!("Sync coordinator shut down");
        unwritten
    }

    /// Take the queued notifications, oldest first
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.outbox.drain(..).collect()
    }

    /// When the UI loop should call [`tick`](Self::tick) next
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.queue.next_deadline()
    }

    pub fn note(&self, key: NoteKey) -> Option<&Note> {
        self.notes
            .get(&key)
            .filter(|t| t.state.is_live())
            .map(|t| &t.note)
    }

    pub fn state(&self, key: NoteKey) -> Option<NoteState> {
        self.notes.get(&key).map(|t| t.state)
    }

    pub fn key_for_id(&self, id: NoteId) -> Option<NoteKey> {
        self.ids.get(&id).copied()
    }

    /// Live notes, bottom of the stack first
    pub fn notes(&self) -> Vec<(NoteKey, &Note)> {
        let mut live: Vec<(NoteKey, &Note)> = self
            .notes
            .iter()
            .filter(|(_, t)| t.state.is_live())
            .map(|(key, t)| (*key, &t.note))
            .collect();
        live.sort_by_key(|(key, note)| (note.z_order, *key));
        live
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// True when no live note is visible, so the application may quit
    pub fn all_hidden(&self) -> bool {
        !self
            .notes
            .values()
            .any(|t| t.state.is_live() && t.note.visible)
    }

    pub fn pending_flushes(&self) -> usize {
        self.queue.len()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    fn track(&mut self, tracked: TrackedNote) -> NoteKey {
        self.last_key += 1;
        let key = NoteKey(self.last_key);
        self.notes.insert(key, tracked);
        key
    }

    fn live_keys(&self) -> Vec<NoteKey> {
        let mut keys: Vec<NoteKey> = self
            .notes
            .iter()
            .filter(|(_, t)| t.state.is_live())
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }

    /// Highest z-order among live notes, optionally ignoring one
    fn top_z(&self, except: Option<NoteKey>) -> i64 {
        self.notes
            .iter()
            .filter(|(key, t)| t.state.is_live() && Some(**key) != except)
            .map(|(_, t)| t.note.z_order)
            .max()
            .unwrap_or(0)
    }

    /// Apply `change` to a live note. `Some(now)` debounces the write, `None`
    /// writes at once. `change` returns false when nothing changed.
    ///
    /// Returns true only when the note changed and a write was scheduled or made.
    fn edit(
        &mut self,
        key: NoteKey,
        now: Option<Instant>,
        change: impl FnOnce(&mut Note) -> bool,
    ) -> bool {
        let Some(tracked) = self.notes.get_mut(&key) else {
            warn!("Edit for unknown {}", key);
            return false;
        };
        if !tracked.state.is_live() {
            debug!("Dropping late edit for deleted {}", key);
            return false;
        }
        if !change(&mut tracked.note) {
            return false;
        }
        tracked.mark_dirty();

        match now {
            Some(now) => self.queue.schedule(key, now + self.settings.debounce),
            None => {
                self.queue.cancel(key);
                let _ = self.flush_key(key);
            }
        }
        true
    }

    /// Write one note according to its state
    fn flush_key(&mut self, key: NoteKey) -> StoreResult<()> {
        let Some(tracked) = self.notes.get(&key) else {
            return Ok(());
        };
        let state = tracked.state;
        let note = tracked.note.clone();

        match state {
            NoteState::Unsaved => match self.with_retry(|s| s.insert(&note)) {
                Ok(saved) => {
                    let Some(id) = saved.id else {
                        return Err(self.write_failed(
                            key,
                            StoreError::Unknown("store returned no id".into()),
                        ));
                    };
                    if let Some(tracked) = self.notes.get_mut(&key) {
                        tracked.note.id = Some(id);
                        tracked.mark_persisted();
                    }
                    self.ids.insert(id, key);
                    debug!("{} persisted as note {}", key, id);
                    self.outbox
                        .push_back(Notification::NotePersisted { key, id });
                    Ok(())
                }
                Err(e) => Err(self.write_failed(key, e)),
            },
            NoteState::Dirty => match self.with_retry(|s| s.update(&note)) {
                Ok(()) => {
                    if let Some(tracked) = self.notes.get_mut(&key) {
                        tracked.mark_persisted();
                    }
                    if let Some(id) = note.id {
                        debug!("Note {} updated", id);
                        self.outbox
                            .push_back(Notification::NotePersisted { key, id });
                    }
                    Ok(())
                }
                Err(StoreError::NotFound(id)) => {
                    self.externally_removed(key, id);
                    Err(StoreError::NotFound(id))
                }
                Err(e) => Err(self.write_failed(key, e)),
            },
            NoteState::Persisted | NoteState::Deleted => Ok(()),
        }
    }

    /// Run `op`; on `ConnectionLost` reconnect once and run it once more
    fn with_retry<T>(&mut self, mut op: impl FnMut(&mut S) -> StoreResult<T>) -> StoreResult<T> {
        match op(&mut self.session) {
            Err(err) if err.is_retryable() => {
                warn!("{}; reconnecting and retrying once", err);
                if let Err(conn_err) = self.session.reconnect() {
                    error!("Reconnect failed: {}", conn_err);
                    return Err(StoreError::ConnectionLost(conn_err.to_string()));
                }
                op(&mut self.session)
            }
            result => result,
        }
    }

    /// Ping the session before a batch; one reconnect if it dropped
    fn ensure_session(&mut self) -> bool {
        if self.session.ping() {
            return true;
        }
        warn!("Database session dropped, reconnecting");
        match self.session.reconnect() {
            Ok(()) => true,
            Err(e) => {
                error!("Reconnect failed: {}", e);
                self.outbox
                    .push_back(Notification::StoreUnavailable(e.to_string()));
                false
            }
        }
    }

    fn write_failed(&mut self, key: NoteKey, err: StoreError) -> StoreError {
        error!("Saving {} failed: {}", key, err);
        self.outbox
            .push_back(Notification::StoreUnavailable(err.to_string()));
        err
    }

    fn externally_removed(&mut self, key: NoteKey, id: NoteId) {
        warn!("Note {} was removed by another instance", id);
        self.finish_delete(key);
        self.outbox
            .push_back(Notification::NoteExternallyRemoved { key, id });
    }

    fn finish_delete(&mut self, key: NoteKey) {
        self.queue.cancel(key);
        if let Some(tracked) = self.notes.get_mut(&key) {
            if let Some(id) = tracked.note.id {
                self.ids.remove(&id);
            }
            tracked.mark_deleted();
        }
    }
}
