//! Data models for Siteline

mod ids;
mod image;
mod note;
mod reading;
mod scope;

pub use ids::{ImageId, NoteId, ProjectId, ReadingId, RoomId};
pub use image::NoteImage;
pub use note::Note;
pub use reading::{Reading, ReadingKind};
pub use scope::Scope;
