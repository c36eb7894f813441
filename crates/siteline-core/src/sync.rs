//! Sync coordinator
//!
//! Owns the queue-vs-send decision: every mutation consults the network
//! gate, goes straight to the backend when online, and falls back into the
//! offline queue on lost connectivity or transport failure. The caller
//! always gets an optimistic local result; only validation rejections
//! surface as errors.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::autosave::SaveDrafts;
use crate::draft::DraftStore;
use crate::error::Result;
use crate::models::{ImageId, Note, NoteId, NoteImage, ProjectId, Reading, RoomId, Scope};
use crate::net::NetworkMonitor;
use crate::queue::{DrainReport, OfflineQueue, QueueOp};
use crate::remote::{ApiError, RemoteMutations};
use crate::state::SyncState;

/// How a mutation was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    /// Accepted by the backend
    Sent(T),
    /// Held in the offline queue for a later drain
    Queued(T),
}

impl<T> Delivery<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Sent(value) | Self::Queued(value) => value,
        }
    }

    #[must_use]
    pub const fn was_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// Composition of the network gate, offline queue, remote client, and
/// draft store.
pub struct SyncCoordinator<C: RemoteMutations> {
    client: C,
    queue: OfflineQueue,
    network: NetworkMonitor,
    drafts: Arc<DraftStore>,
    state: watch::Sender<SyncState>,
}

impl<C: RemoteMutations> SyncCoordinator<C> {
    #[must_use]
    pub fn new(
        client: C,
        queue: OfflineQueue,
        network: NetworkMonitor,
        drafts: Arc<DraftStore>,
    ) -> Self {
        let initial = if network.is_offline() {
            SyncState::Offline
        } else {
            SyncState::Synced
        };
        let (state, _) = watch::channel(initial);
        Self {
            client,
            queue,
            network,
            drafts,
            state,
        }
    }

    #[cfg(test)]
    pub(crate) const fn client(&self) -> &C {
        &self.client
    }

    #[must_use]
    pub const fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    #[must_use]
    pub const fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    #[must_use]
    pub fn drafts(&self) -> Arc<DraftStore> {
        Arc::clone(&self.drafts)
    }

    /// Current sync state for status surfaces.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Create a note for a room, empty-bodied unless an initial body is given.
    pub async fn create_note(
        &self,
        project_id: ProjectId,
        room_id: RoomId,
        body: Option<String>,
    ) -> Result<Delivery<Note>> {
        let note = body.map_or_else(
            || Note::new(project_id, room_id),
            |body| Note::with_body(project_id, room_id, body),
        );
        self.drafts.absorb_remote(&note);
        let scope = Scope::new(project_id, room_id);

        if !self.can_send_direct().await? {
            return self.enqueue_mutation(scope, QueueOp::CreateNote { note }).await;
        }

        match self.client.create_note(&note).await {
            Ok(saved) => {
                self.drafts.absorb_remote(&saved);
                self.refresh_state().await?;
                Ok(Delivery::Sent(saved))
            }
            Err(error) => {
                self.queue_on_transport_failure(scope, QueueOp::CreateNote { note }, error)
                    .await
            }
        }
    }

    /// Persist a note body (the autosave path).
    pub async fn update_note_body(
        &self,
        scope: Scope,
        note_id: NoteId,
        body: &str,
    ) -> Result<Delivery<()>> {
        let updated_at = crate::util::unix_timestamp_millis();
        let op = QueueOp::UpdateNote {
            note_id,
            body: body.to_string(),
            updated_at,
        };

        let delivery = if !self.can_send_direct().await? {
            self.enqueue_mutation(scope, op).await?
        } else {
            match self.client.update_note(note_id, body, updated_at).await {
                Ok(_) => {
                    self.refresh_state().await?;
                    Delivery::Sent(())
                }
                Err(error) => self.queue_on_transport_failure(scope, op, error).await?,
            }
        };

        // Queued updates count as locally accepted: the queue now owns the
        // snapshot, so autosave must not keep re-submitting the same text.
        self.drafts.mark_synced(&note_id, body);
        Ok(delivery)
    }

    /// Soft-delete a note.
    pub async fn delete_note(&self, scope: Scope, note_id: NoteId) -> Result<Delivery<()>> {
        let delivery = if !self.can_send_direct().await? {
            self.enqueue_mutation(scope, QueueOp::DeleteNote { note_id })
                .await?
        } else {
            match self.client.delete_note(note_id).await {
                Ok(()) => {
                    self.refresh_state().await?;
                    Delivery::Sent(())
                }
                Err(error) => {
                    self.queue_on_transport_failure(scope, QueueOp::DeleteNote { note_id }, error)
                        .await?
                }
            }
        };

        self.drafts.forget(&note_id);
        Ok(delivery)
    }

    /// Attach an already-uploaded image to its note.
    pub async fn register_image(
        &self,
        scope: Scope,
        image: NoteImage,
    ) -> Result<Delivery<NoteImage>> {
        let note_id = image.note_id;
        if !self.can_send_direct().await? {
            return self
                .enqueue_mutation(scope, QueueOp::RegisterImage { note_id, image })
                .await;
        }

        match self.client.add_image(note_id, &image).await {
            Ok(saved) => {
                self.refresh_state().await?;
                Ok(Delivery::Sent(saved))
            }
            Err(error) => {
                self.queue_on_transport_failure(
                    scope,
                    QueueOp::RegisterImage { note_id, image },
                    error,
                )
                .await
            }
        }
    }

    /// Detach an image from its note.
    pub async fn remove_image(
        &self,
        scope: Scope,
        note_id: NoteId,
        image_id: ImageId,
    ) -> Result<Delivery<()>> {
        let op = QueueOp::RemoveImage { note_id, image_id };
        if !self.can_send_direct().await? {
            return self.enqueue_mutation(scope, op).await;
        }

        match self.client.remove_image(note_id, image_id).await {
            Ok(()) => {
                self.refresh_state().await?;
                Ok(Delivery::Sent(()))
            }
            Err(error) => self.queue_on_transport_failure(scope, op, error).await,
        }
    }

    /// Record an environmental reading for a room.
    pub async fn add_reading(&self, reading: Reading) -> Result<Delivery<Reading>> {
        let scope = Scope::new(reading.project_id, reading.room_id);
        if !self.can_send_direct().await? {
            return self
                .enqueue_mutation(scope, QueueOp::AddReading { reading })
                .await;
        }

        match self.client.add_reading(&reading).await {
            Ok(saved) => {
                self.refresh_state().await?;
                Ok(Delivery::Sent(saved))
            }
            Err(error) => {
                self.queue_on_transport_failure(scope, QueueOp::AddReading { reading }, error)
                    .await
            }
        }
    }

    /// Replay queued mutations against the backend.
    ///
    /// A no-op while offline; drains are triggered by reconnection (see
    /// [`Self::watch_reconnect`]) or an explicit user action.
    pub async fn drain(&self) -> Result<DrainReport> {
        if self.network.is_offline() {
            let remaining = self.queue.len().await?;
            return Ok(DrainReport {
                remaining,
                ..DrainReport::default()
            });
        }

        self.state.send_replace(SyncState::Draining);
        let report = self.queue.drain(&self.client).await;
        self.refresh_state().await?;
        report
    }

    /// Whether a new mutation may bypass the queue.
    ///
    /// A queued backlog must replay first, otherwise a fresh call could
    /// apply ahead of an older queued one for the same note. If the backlog
    /// cannot fully drain, the new mutation joins the queue behind it.
    async fn can_send_direct(&self) -> Result<bool> {
        if self.network.is_offline() {
            return Ok(false);
        }
        if self.queue.is_empty().await? {
            return Ok(true);
        }
        Ok(self.drain().await?.is_complete())
    }

    async fn enqueue_mutation<T>(&self, scope: Scope, op: QueueOp) -> Result<Delivery<T>>
    where
        T: FromQueuedOp,
    {
        let value = T::from_queued_op(&op);
        self.queue.enqueue(scope, &op).await?;
        self.refresh_state().await?;
        Ok(Delivery::Queued(value))
    }

    async fn queue_on_transport_failure<T>(
        &self,
        scope: Scope,
        op: QueueOp,
        error: ApiError,
    ) -> Result<Delivery<T>>
    where
        T: FromQueuedOp,
    {
        if !error.is_transport() {
            return Err(error.into());
        }
        tracing::warn!(kind = op.kind(), %scope, %error, "remote call failed; queuing mutation");
        self.enqueue_mutation(scope, op).await
    }

    async fn refresh_state(&self) -> Result<()> {
        let state = if self.network.is_offline() {
            SyncState::Offline
        } else if self.queue.is_empty().await? {
            SyncState::Synced
        } else {
            SyncState::Queued
        };
        self.state.send_replace(state);
        Ok(())
    }
}

impl<C> SyncCoordinator<C>
where
    C: RemoteMutations + Send + Sync + 'static,
{
    /// Drain automatically whenever connectivity comes back.
    pub fn watch_reconnect(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut rx = coordinator.network.subscribe();
        // Sample before spawning: if connectivity flips before the task's
        // first poll, sampling inside the task would see the new value and
        // miss the transition.
        let mut was_online = *rx.borrow();
        tokio::spawn(async move {
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let online = *rx.borrow();
                if online && !was_online {
                    tracing::debug!("connectivity restored; draining offline queue");
                    if let Err(error) = coordinator.drain().await {
                        tracing::warn!(%error, "reconnect drain failed");
                    }
                }
                was_online = online;
            }
        })
    }
}

/// Reconstruct the optimistic local value handed back for a queued mutation.
trait FromQueuedOp: Sized {
    fn from_queued_op(op: &QueueOp) -> Self;
}

impl FromQueuedOp for () {
    fn from_queued_op(_: &QueueOp) -> Self {}
}

impl FromQueuedOp for Note {
    fn from_queued_op(op: &QueueOp) -> Self {
        match op {
            QueueOp::CreateNote { note } => note.clone(),
            _ => unreachable!("queued note delivery built from a non-note op"),
        }
    }
}

impl FromQueuedOp for NoteImage {
    fn from_queued_op(op: &QueueOp) -> Self {
        match op {
            QueueOp::RegisterImage { image, .. } => image.clone(),
            _ => unreachable!("queued image delivery built from a non-image op"),
        }
    }
}

impl FromQueuedOp for Reading {
    fn from_queued_op(op: &QueueOp) -> Self {
        match op {
            QueueOp::AddReading { reading } => reading.clone(),
            _ => unreachable!("queued reading delivery built from a non-reading op"),
        }
    }
}

/// Adapter that lets the autosave controller save through the coordinator.
pub struct NoteSaver<C: RemoteMutations> {
    coordinator: Arc<SyncCoordinator<C>>,
    scope: Scope,
}

impl<C: RemoteMutations> NoteSaver<C> {
    #[must_use]
    pub const fn new(coordinator: Arc<SyncCoordinator<C>>, scope: Scope) -> Self {
        Self { coordinator, scope }
    }
}

impl<C> SaveDrafts for NoteSaver<C>
where
    C: RemoteMutations + Send + Sync + 'static,
{
    fn save(&self, note_id: NoteId, body: String) -> impl Future<Output = Result<()>> + Send {
        let coordinator = Arc::clone(&self.coordinator);
        let scope = self.scope;
        async move {
            coordinator
                .update_note_body(scope, note_id, &body)
                .await?;
            Ok(())
        }
    }
}
