//! Project/room scope used to key queued mutations and view invalidation

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ProjectId, RoomId};

/// The project/room a mutation belongs to.
///
/// Queue entries are scoped so a UI refresh after a drain can invalidate
/// exactly the affected room views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Owning project identifier
    pub project_id: ProjectId,
    /// Owning room identifier
    pub room_id: RoomId,
}

impl Scope {
    #[must_use]
    pub const fn new(project_id: ProjectId, room_id: RoomId) -> Self {
        Self {
            project_id,
            room_id,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.room_id)
    }
}
