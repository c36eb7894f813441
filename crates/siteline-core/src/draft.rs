//! Local draft store
//!
//! Holds the latest user-typed body per note, decoupled from the
//! authoritative server copy. Typing is never blocked on network latency:
//! the UI always renders the draft, and the two copies converge only after
//! a successful autosave round-trip.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

use crate::models::{Note, NoteId};
use crate::util::bodies_match_ignoring_whitespace;

#[derive(Debug, Clone)]
struct DraftEntry {
    /// Latest user-typed text
    text: String,
    /// Last body acknowledged by the backend
    last_synced: String,
    /// Whether the user has typed since the last sync
    edited: bool,
}

/// Explicit draft store shared between the editor surface and autosave.
///
/// Not a hidden singleton: callers construct one and pass it around.
/// Views subscribe to a revision counter and re-read on change.
#[derive(Debug)]
pub struct DraftStore {
    entries: Mutex<HashMap<NoteId, DraftEntry>>,
    revision: watch::Sender<u64>,
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DraftStore {
    #[must_use]
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            entries: Mutex::new(HashMap::new()),
            revision,
        }
    }

    /// Overwrite the draft for a note. No validation; always succeeds.
    pub fn set_draft(&self, note_id: NoteId, text: impl Into<String>) {
        let mut entries = self.lock();
        let entry = entries.entry(note_id).or_insert_with(|| DraftEntry {
            text: String::new(),
            last_synced: String::new(),
            edited: false,
        });
        entry.text = text.into();
        entry.edited = true;
        drop(entries);
        self.bump();
    }

    /// Current draft text, or the last-synced body if no edit has occurred.
    ///
    /// Returns `None` for notes the store has never seen.
    #[must_use]
    pub fn draft(&self, note_id: &NoteId) -> Option<String> {
        self.lock().get(note_id).map(|entry| entry.text.clone())
    }

    /// The body the UI should display for a note.
    ///
    /// Always the latest local draft; falls back to the note's own body for
    /// notes the store has never seen.
    #[must_use]
    pub fn display_body(&self, note: &Note) -> String {
        self.draft(&note.id).unwrap_or_else(|| note.body.clone())
    }

    /// Whether the user has typed into this note since the last sync.
    #[must_use]
    pub fn is_edited(&self, note_id: &NoteId) -> bool {
        self.lock().get(note_id).is_some_and(|entry| entry.edited)
    }

    /// Absorb a fresh note from the backend.
    ///
    /// Unedited drafts reset to the server value so external updates are not
    /// silently clobbered. An in-progress edit always wins locally; only the
    /// last-synced baseline is refreshed.
    pub fn absorb_remote(&self, note: &Note) {
        let mut entries = self.lock();
        match entries.get_mut(&note.id) {
            Some(entry) if entry.edited => {
                entry.last_synced = note.body.clone();
            }
            Some(entry) => {
                entry.text = note.body.clone();
                entry.last_synced = note.body.clone();
            }
            None => {
                entries.insert(
                    note.id,
                    DraftEntry {
                        text: note.body.clone(),
                        last_synced: note.body.clone(),
                        edited: false,
                    },
                );
            }
        }
        drop(entries);
        self.bump();
    }

    /// Record a successful save round-trip.
    ///
    /// Clears the edited flag only when the acknowledged body still matches
    /// the draft; a keystroke that raced the save keeps the note dirty.
    pub fn mark_synced(&self, note_id: &NoteId, body: &str) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(note_id) {
            entry.last_synced = body.to_string();
            if entry.text == body {
                entry.edited = false;
            }
        }
        drop(entries);
        self.bump();
    }

    /// The draft text that needs saving, if any.
    ///
    /// `None` when the note is unedited or the draft differs from the
    /// last-synced body only by surrounding whitespace.
    #[must_use]
    pub fn dirty_text(&self, note_id: &NoteId) -> Option<String> {
        let entries = self.lock();
        let entry = entries.get(note_id)?;
        if !entry.edited {
            return None;
        }
        if bodies_match_ignoring_whitespace(&entry.text, &entry.last_synced) {
            return None;
        }
        Some(entry.text.clone())
    }

    /// Drop all local state for a note (after a delete).
    pub fn forget(&self, note_id: &NoteId) {
        self.lock().remove(note_id);
        self.bump();
    }

    /// Subscribe to draft changes.
    ///
    /// The value is a revision counter; subscribers re-read whatever drafts
    /// they display when it changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<NoteId, DraftEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectId, RoomId};
    use pretty_assertions::assert_eq;

    fn note_with_body(body: &str) -> Note {
        Note::with_body(ProjectId::new(), RoomId::new(), body)
    }

    #[test]
    fn test_set_and_get_draft() {
        let store = DraftStore::new();
        let note = note_with_body("server copy");

        store.absorb_remote(&note);
        assert_eq!(store.draft(&note.id).as_deref(), Some("server copy"));

        store.set_draft(note.id, "local edit");
        assert_eq!(store.draft(&note.id).as_deref(), Some("local edit"));
    }

    #[test]
    fn test_display_body_prefers_draft() {
        let store = DraftStore::new();
        let note = note_with_body("server copy");

        assert_eq!(store.display_body(&note), "server copy");

        store.set_draft(note.id, "typing...");
        assert_eq!(store.display_body(&note), "typing...");
    }

    #[test]
    fn test_absorb_remote_resets_unedited_draft() {
        let store = DraftStore::new();
        let mut note = note_with_body("v1");
        store.absorb_remote(&note);

        note.body = "v2 from another device".to_string();
        store.absorb_remote(&note);

        assert_eq!(
            store.draft(&note.id).as_deref(),
            Some("v2 from another device")
        );
    }

    #[test]
    fn test_absorb_remote_never_clobbers_edit_in_progress() {
        let store = DraftStore::new();
        let mut note = note_with_body("v1");
        store.absorb_remote(&note);
        store.set_draft(note.id, "mid-edit");

        note.body = "v2".to_string();
        store.absorb_remote(&note);

        assert_eq!(store.draft(&note.id).as_deref(), Some("mid-edit"));
        assert!(store.is_edited(&note.id));
    }

    #[test]
    fn test_mark_synced_clears_edited_flag() {
        let store = DraftStore::new();
        let note = note_with_body("v1");
        store.absorb_remote(&note);
        store.set_draft(note.id, "v2");

        store.mark_synced(&note.id, "v2");
        assert!(!store.is_edited(&note.id));
        assert_eq!(store.dirty_text(&note.id), None);
    }

    #[test]
    fn test_mark_synced_keeps_racing_keystroke_dirty() {
        let store = DraftStore::new();
        let note = note_with_body("v1");
        store.absorb_remote(&note);
        store.set_draft(note.id, "v2");
        store.set_draft(note.id, "v2 plus more");

        // Ack for the older text arrives after the user kept typing
        store.mark_synced(&note.id, "v2");
        assert!(store.is_edited(&note.id));
        assert_eq!(store.dirty_text(&note.id).as_deref(), Some("v2 plus more"));
    }

    #[test]
    fn test_dirty_text_ignores_whitespace_only_changes() {
        let store = DraftStore::new();
        let note = note_with_body("Water damage");
        store.absorb_remote(&note);

        store.set_draft(note.id, "Water damage \n");
        assert_eq!(store.dirty_text(&note.id), None);

        store.set_draft(note.id, "Water damage worsening");
        assert_eq!(
            store.dirty_text(&note.id).as_deref(),
            Some("Water damage worsening")
        );
    }

    #[test]
    fn test_forget_drops_state() {
        let store = DraftStore::new();
        let note = note_with_body("v1");
        store.absorb_remote(&note);
        store.forget(&note.id);
        assert_eq!(store.draft(&note.id), None);
    }

    #[test]
    fn test_subscribe_sees_revisions() {
        let store = DraftStore::new();
        let rx = store.subscribe();
        let before = *rx.borrow();

        store.set_draft(NoteId::new(), "x");
        assert!(*rx.borrow() > before);
    }
}
