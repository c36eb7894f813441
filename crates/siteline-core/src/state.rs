//! Shared cross-platform state types.

/// Unified sync state surfaced to status UIs and the CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No connectivity; mutations are being queued
    Offline,
    /// Online with queued mutations awaiting a drain
    Queued,
    /// A drain is replaying queued mutations
    Draining,
    /// Online with an empty queue
    Synced,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Offline => "offline",
            Self::Queued => "queued",
            Self::Draining => "draining",
            Self::Synced => "synced",
        };
        write!(f, "{label}")
    }
}
