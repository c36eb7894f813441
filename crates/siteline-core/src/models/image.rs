//! Note image model

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::is_http_url;

use super::ids::{ImageId, NoteId};

/// An uploaded image registered against a note.
///
/// Created only once the upload to the blob host has completed; the `url`
/// always points at the hosted copy, never at a device-local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteImage {
    /// Unique image identifier
    pub id: ImageId,
    /// Parent note identifier
    pub note_id: NoteId,
    /// Public URL on the blob host
    pub url: String,
    /// Upload timestamp (Unix ms)
    pub uploaded_at: i64,
}

impl NoteImage {
    /// Create image metadata for a completed upload.
    pub fn new(note_id: NoteId, url: impl Into<String>) -> Result<Self> {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            return Err(Error::InvalidInput(
                "Image url cannot be empty".to_string(),
            ));
        }
        if !is_http_url(&url) {
            return Err(Error::InvalidInput(
                "Image url must include http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            id: ImageId::new(),
            note_id,
            url,
            uploaded_at: chrono::Utc::now().timestamp_millis(),
        })
    }
}
