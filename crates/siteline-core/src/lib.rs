//! siteline-core - Core library for Siteline
//!
//! This crate contains the offline-first sync engine shared by all Siteline
//! interfaces: draft tracking, debounced autosave, the offline mutation
//! queue, the image upload pipeline, and the coordinator that ties them to
//! the backend API.

pub mod autosave;
pub mod db;
pub mod draft;
pub mod error;
pub mod models;
pub mod net;
pub mod queue;
pub mod remote;
pub mod state;
pub mod sync;
pub mod upload;
pub mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
pub use state::SyncState;
