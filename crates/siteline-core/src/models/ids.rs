//! Entity identifiers
//!
//! All ids are UUID v7 (time-sortable) so that client-generated ids remain
//! stable across offline creation and later replay against the backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new unique id using UUID v7
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Get the string representation of this id
            #[must_use]
            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id! {
    /// A unique identifier for a restoration project
    ProjectId
}

uuid_id! {
    /// A unique identifier for a room within a project
    RoomId
}

uuid_id! {
    /// A unique identifier for a note
    NoteId
}

uuid_id! {
    /// A unique identifier for an image attached to a note
    ImageId
}

uuid_id! {
    /// A unique identifier for a room reading
    ReadingId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_are_time_sortable() {
        let earlier = ReadingId::new();
        let later = ReadingId::new();
        // UUID v7 encodes the timestamp in the leading bits
        assert!(earlier.as_str() <= later.as_str());
    }
}
