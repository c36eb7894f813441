//! Note model

use serde::{Deserialize, Serialize};

use super::ids::{NoteId, ProjectId, RoomId};
use super::image::NoteImage;

/// A field note attached to a room within a restoration project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    /// Owning project identifier
    pub project_id: ProjectId,
    /// Owning room identifier
    pub room_id: RoomId,
    /// Free-text body
    pub body: String,
    /// Attached images, in display order
    #[serde(default)]
    pub images: Vec<NoteImage>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Soft delete flag
    pub is_deleted: bool,
}

impl Note {
    /// Create a new empty note for a room.
    ///
    /// Notes start with an empty body; the body is filled in by local edits
    /// and persisted through autosave.
    #[must_use]
    pub fn new(project_id: ProjectId, room_id: RoomId) -> Self {
        Self::with_body(project_id, room_id, "")
    }

    /// Create a new note with an initial body.
    #[must_use]
    pub fn with_body(project_id: ProjectId, room_id: RoomId, body: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: NoteId::new(),
            project_id,
            room_id,
            body: body.into(),
            images: Vec::new(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }

    /// Check if the note body is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }

    /// Get the first line as a title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.body
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }
}
