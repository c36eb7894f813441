//! Debounced autosave controller
//!
//! Converts a rapidly-changing draft into at most one save call per quiet
//! period. Modeled as an explicit per-note state machine
//! (`Idle -> Pending -> Saving -> Idle`) so cancellation and coalescing are
//! testable, rather than ad hoc timer handles.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::draft::DraftStore;
use crate::error::Result;
use crate::models::NoteId;

/// Quiet period observed in the product's editor flow.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1500);

/// Seam through which the controller issues save calls.
///
/// In production this is the sync coordinator's note-update path; tests
/// substitute a recording stub.
pub trait SaveDrafts: Send + Sync + 'static {
    fn save(&self, note_id: NoteId, body: String) -> impl Future<Output = Result<()>> + Send;
}

impl<S: SaveDrafts> SaveDrafts for Arc<S> {
    fn save(&self, note_id: NoteId, body: String) -> impl Future<Output = Result<()>> + Send {
        S::save(self, note_id, body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Nothing scheduled
    Idle,
    /// A timer is running; only the matching generation may fire
    Pending { generation: u64 },
    /// A save call is in flight; `dirty` records edits that arrived meanwhile
    Saving { dirty: bool },
}

#[derive(Debug)]
struct NoteState {
    phase: Phase,
    generation: u64,
}

impl Default for NoteState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            generation: 0,
        }
    }
}

/// Per-note debounce and save serialization.
///
/// Every edit restarts the note's timer; when the quiet period elapses with
/// no further edits and the draft differs from the last-synced body
/// (ignoring pure whitespace), exactly one save is issued. At most one save
/// is ever in flight per note; edits during a save coalesce into a single
/// follow-up cycle.
pub struct AutosaveController<S: SaveDrafts> {
    inner: Arc<Inner<S>>,
}

impl<S: SaveDrafts> Clone for AutosaveController<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S> {
    saver: S,
    drafts: Arc<DraftStore>,
    quiet_period: Duration,
    notes: Mutex<HashMap<NoteId, NoteState>>,
}

impl<S: SaveDrafts> AutosaveController<S> {
    #[must_use]
    pub fn new(saver: S, drafts: Arc<DraftStore>, quiet_period: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                saver,
                drafts,
                quiet_period,
                notes: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn with_default_quiet_period(saver: S, drafts: Arc<DraftStore>) -> Self {
        Self::new(saver, drafts, DEFAULT_QUIET_PERIOD)
    }

    /// Record an edit: update the draft and restart the note's quiet timer.
    pub fn note_edited(&self, note_id: NoteId, text: impl Into<String>) {
        self.inner.drafts.set_draft(note_id, text);
        Inner::schedule(&self.inner, note_id);
    }

    /// Save the note's draft immediately (blur-triggered save).
    ///
    /// If a save is already in flight the edit is coalesced into its
    /// follow-up cycle instead of overlapping it.
    pub async fn flush_now(&self, note_id: NoteId) {
        Inner::flush(Arc::clone(&self.inner), note_id, None).await;
    }

    /// Whether the note has no timer running and no save in flight.
    #[must_use]
    pub fn is_idle(&self, note_id: &NoteId) -> bool {
        self.inner
            .lock()
            .get(note_id)
            .map_or(true, |state| state.phase == Phase::Idle)
    }
}

impl<S: SaveDrafts> Inner<S> {
    fn lock(&self) -> MutexGuard<'_, HashMap<NoteId, NoteState>> {
        self.notes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restart the quiet timer for a note, or mark an in-flight save dirty.
    fn schedule(inner: &Arc<Self>, note_id: NoteId) {
        let generation = {
            let mut notes = inner.lock();
            let state = notes.entry(note_id).or_default();
            state.generation += 1;
            if let Phase::Saving { ref mut dirty } = state.phase {
                *dirty = true;
                return;
            }
            state.phase = Phase::Pending {
                generation: state.generation,
            };
            state.generation
        };
        Self::spawn_timer(Arc::clone(inner), note_id, generation);
    }

    fn spawn_timer(inner: Arc<Self>, note_id: NoteId, generation: u64) {
        tokio::spawn(async move {
            tokio::time::sleep(inner.quiet_period).await;
            // Boxed to break the flush -> timer -> flush future cycle
            let flush: Pin<Box<dyn Future<Output = ()> + Send>> =
                Box::pin(Self::flush(inner, note_id, Some(generation)));
            flush.await;
        });
    }

    /// Issue a save if the note still needs one.
    ///
    /// `expected` carries the timer generation; a stale timer (superseded by
    /// a later edit) finds a newer generation and does nothing. `None` means
    /// an explicit flush that bypasses the timer.
    async fn flush(inner: Arc<Self>, note_id: NoteId, expected: Option<u64>) {
        let Some(body) = inner.try_begin_save(note_id, expected) else {
            return;
        };

        match inner.saver.save(note_id, body.clone()).await {
            Ok(()) => inner.drafts.mark_synced(&note_id, &body),
            Err(error) => {
                tracing::warn!(%note_id, %error, "autosave failed; draft retained for retry");
            }
        }

        let reschedule = {
            let mut notes = inner.lock();
            let state = notes.entry(note_id).or_default();
            match state.phase {
                Phase::Saving { dirty: true } => {
                    state.generation += 1;
                    state.phase = Phase::Pending {
                        generation: state.generation,
                    };
                    Some(state.generation)
                }
                _ => {
                    state.phase = Phase::Idle;
                    None
                }
            }
        };

        if let Some(generation) = reschedule {
            Self::spawn_timer(inner, note_id, generation);
        }
    }

    /// Transition `Pending -> Saving` and return the body to save, or `None`
    /// when the timer is stale or the draft has nothing worth saving.
    fn try_begin_save(&self, note_id: NoteId, expected: Option<u64>) -> Option<String> {
        let mut notes = self.lock();
        let state = notes.entry(note_id).or_default();

        match (expected, &mut state.phase) {
            (Some(generation), Phase::Pending { generation: current })
                if *current == generation => {}
            (Some(_), _) => return None,
            (None, Phase::Saving { dirty }) => {
                *dirty = true;
                return None;
            }
            (None, _) => {}
        }

        match self.drafts.dirty_text(&note_id) {
            Some(body) => {
                state.phase = Phase::Saving { dirty: false };
                Some(body)
            }
            None => {
                state.phase = Phase::Idle;
                None
            }
        }
    }
}
