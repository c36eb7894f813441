//! Local database layer for Siteline
//!
//! Backs the offline mutation queue with a durable on-device store.

mod connection;
mod migrations;

pub use connection::Database;
