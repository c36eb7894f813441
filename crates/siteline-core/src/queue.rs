//! Offline mutation queue
//!
//! Durably holds mutations that could not be sent immediately and replays
//! them FIFO once connectivity returns. An entry is removed only after the
//! corresponding remote call succeeds; the first failure stops the drain so
//! later entries for the same note never apply before earlier ones.

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{ImageId, Note, NoteId, NoteImage, Reading, Scope};
use crate::remote::RemoteMutations;
use crate::util::unix_timestamp_millis;

/// A queued mutation with its payload snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueOp {
    CreateNote {
        note: Note,
    },
    UpdateNote {
        note_id: NoteId,
        body: String,
        updated_at: i64,
    },
    DeleteNote {
        note_id: NoteId,
    },
    RegisterImage {
        note_id: NoteId,
        image: NoteImage,
    },
    RemoveImage {
        note_id: NoteId,
        image_id: ImageId,
    },
    AddReading {
        reading: Reading,
    },
}

impl QueueOp {
    /// Stable operation label stored alongside the payload.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CreateNote { .. } => "create_note",
            Self::UpdateNote { .. } => "update_note",
            Self::DeleteNote { .. } => "delete_note",
            Self::RegisterImage { .. } => "register_image",
            Self::RemoveImage { .. } => "remove_image",
            Self::AddReading { .. } => "add_reading",
        }
    }
}

/// A persisted queue entry.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Rowid; FIFO replay order
    pub id: i64,
    /// Project/room the mutation belongs to
    pub scope: Scope,
    /// The mutation and its payload snapshot
    pub op: QueueOp,
    /// When the entry was queued (Unix ms)
    pub created_at: i64,
}

/// Result of a drain pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Entries successfully replayed and removed
    pub replayed: usize,
    /// Entries still queued (first failure stops the drain)
    pub remaining: usize,
    /// Scopes whose views should be invalidated after the drain
    pub touched: Vec<Scope>,
}

impl DrainReport {
    /// Whether every queued entry was replayed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// libSQL-backed FIFO of pending mutations.
pub struct OfflineQueue {
    db: Database,
}

impl OfflineQueue {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a mutation to persisted storage.
    ///
    /// Returns as soon as the row is written; the caller never waits on the
    /// network.
    pub async fn enqueue(&self, scope: Scope, op: &QueueOp) -> Result<()> {
        let payload = serde_json::to_string(op)?;
        self.db
            .connection()
            .execute(
                "INSERT INTO offline_queue (project_id, room_id, kind, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                libsql::params![
                    scope.project_id.as_str(),
                    scope.room_id.as_str(),
                    op.kind(),
                    payload,
                    unix_timestamp_millis()
                ],
            )
            .await?;
        tracing::debug!(kind = op.kind(), %scope, "queued offline mutation");
        Ok(())
    }

    /// All queued entries in FIFO order.
    pub async fn pending(&self) -> Result<Vec<QueueEntry>> {
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT id, project_id, room_id, payload, created_at
                 FROM offline_queue ORDER BY id ASC",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(parse_entry(&row)?);
        }
        Ok(entries)
    }

    /// Queued entries for one project/room, in FIFO order.
    pub async fn pending_for(&self, scope: Scope) -> Result<Vec<QueueEntry>> {
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT id, project_id, room_id, payload, created_at
                 FROM offline_queue
                 WHERE project_id = ?1 AND room_id = ?2
                 ORDER BY id ASC",
                libsql::params![scope.project_id.as_str(), scope.room_id.as_str()],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(parse_entry(&row)?);
        }
        Ok(entries)
    }

    /// Number of queued entries.
    pub async fn len(&self) -> Result<usize> {
        let mut rows = self
            .db
            .connection()
            .query("SELECT COUNT(*) FROM offline_queue", ())
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Replay queued entries against the backend, FIFO.
    ///
    /// Each success removes its entry. The first remote failure stops the
    /// drain and is swallowed into the report; the entry (and everything
    /// after it) stays queued for a later attempt. Only local storage
    /// problems surface as `Err`.
    pub async fn drain<C: RemoteMutations>(&self, client: &C) -> Result<DrainReport> {
        let entries = self.pending().await?;
        let total = entries.len();
        let mut report = DrainReport::default();

        for entry in entries {
            match replay(client, &entry.op).await {
                Ok(()) => {
                    self.remove(entry.id).await?;
                    if !report.touched.contains(&entry.scope) {
                        report.touched.push(entry.scope);
                    }
                    report.replayed += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        kind = entry.op.kind(),
                        scope = %entry.scope,
                        %error,
                        "drain stopped; mutation left queued"
                    );
                    break;
                }
            }
        }

        report.remaining = total - report.replayed;
        tracing::debug!(
            replayed = report.replayed,
            remaining = report.remaining,
            "drain finished"
        );
        Ok(report)
    }

    async fn remove(&self, id: i64) -> Result<()> {
        self.db
            .connection()
            .execute(
                "DELETE FROM offline_queue WHERE id = ?1",
                libsql::params![id],
            )
            .await?;
        Ok(())
    }
}

/// Issue the remote call corresponding to a queued mutation.
async fn replay<C: RemoteMutations>(client: &C, op: &QueueOp) -> crate::remote::ApiResult<()> {
    match op {
        QueueOp::CreateNote { note } => {
            client.create_note(note).await?;
        }
        QueueOp::UpdateNote {
            note_id,
            body,
            updated_at,
        } => {
            client.update_note(*note_id, body, *updated_at).await?;
        }
        QueueOp::DeleteNote { note_id } => client.delete_note(*note_id).await?,
        QueueOp::RegisterImage { note_id, image } => {
            client.add_image(*note_id, image).await?;
        }
        QueueOp::RemoveImage { note_id, image_id } => {
            client.remove_image(*note_id, *image_id).await?;
        }
        QueueOp::AddReading { reading } => {
            client.add_reading(reading).await?;
        }
    }
    Ok(())
}

fn parse_entry(row: &libsql::Row) -> Result<QueueEntry> {
    let id: i64 = row.get(0)?;
    let project_id: String = row.get(1)?;
    let room_id: String = row.get(2)?;
    let payload: String = row.get(3)?;
    let created_at: i64 = row.get(4)?;

    let scope = Scope::new(
        project_id
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid project id: {project_id}")))?,
        room_id
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid room id: {room_id}")))?,
    );
    let op: QueueOp = serde_json::from_str(&payload)?;

    Ok(QueueEntry {
        id,
        scope,
        op,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectId, ReadingKind, RoomId};
    use crate::remote::testing::{Call, RecordingClient};
    use pretty_assertions::assert_eq;

    async fn setup() -> OfflineQueue {
        OfflineQueue::new(Database::open_in_memory().await.unwrap())
    }

    fn scope() -> Scope {
        Scope::new(ProjectId::new(), RoomId::new())
    }

    fn update_op(note: &Note, body: &str) -> QueueOp {
        QueueOp::UpdateNote {
            note_id: note.id,
            body: body.to_string(),
            updated_at: note.updated_at,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_and_pending_fifo() {
        let queue = setup().await;
        let scope = scope();
        let note = Note::new(scope.project_id, scope.room_id);

        queue
            .enqueue(scope, &QueueOp::CreateNote { note: note.clone() })
            .await
            .unwrap();
        queue.enqueue(scope, &update_op(&note, "first")).await.unwrap();
        queue.enqueue(scope, &update_op(&note, "second")).await.unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].op.kind(), "create_note");
        assert!(matches!(&pending[1].op, QueueOp::UpdateNote { body, .. } if body == "first"));
        assert!(matches!(&pending[2].op, QueueOp::UpdateNote { body, .. } if body == "second"));
        assert!(pending[0].id < pending[1].id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_for_scopes_entries() {
        let queue = setup().await;
        let kitchen = scope();
        let basement = scope();
        let note = Note::new(kitchen.project_id, kitchen.room_id);

        queue
            .enqueue(kitchen, &QueueOp::CreateNote { note: note.clone() })
            .await
            .unwrap();
        let other = Note::new(basement.project_id, basement.room_id);
        queue
            .enqueue(basement, &QueueOp::CreateNote { note: other })
            .await
            .unwrap();

        let entries = queue.pending_for(kitchen).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].scope, kitchen);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drain_replays_in_order_and_empties_queue() {
        let queue = setup().await;
        let scope = scope();
        let note = Note::new(scope.project_id, scope.room_id);

        queue
            .enqueue(scope, &QueueOp::CreateNote { note: note.clone() })
            .await
            .unwrap();
        queue.enqueue(scope, &update_op(&note, "final")).await.unwrap();

        let client = RecordingClient::new();
        let report = queue.drain(&client).await.unwrap();

        assert_eq!(report.replayed, 2);
        assert_eq!(report.remaining, 0);
        assert!(report.is_complete());
        assert_eq!(report.touched, vec![scope]);
        assert!(queue.is_empty().await.unwrap());

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::CreateNote(note.id));
        assert_eq!(calls[1], Call::UpdateNote(note.id, "final".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drain_stops_at_first_failure() {
        let queue = setup().await;
        let scope = scope();
        let note = Note::new(scope.project_id, scope.room_id);

        queue
            .enqueue(scope, &QueueOp::CreateNote { note: note.clone() })
            .await
            .unwrap();
        queue.enqueue(scope, &update_op(&note, "v2")).await.unwrap();
        queue.enqueue(scope, &update_op(&note, "v3")).await.unwrap();

        let client = RecordingClient::new();
        // First call succeeds, second fails
        client.fail_nth(2);

        let report = queue.drain(&client).await.unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 2);
        assert!(!report.is_complete());

        // Entries after the failure were never attempted
        assert_eq!(client.calls().len(), 2);

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(matches!(&pending[0].op, QueueOp::UpdateNote { body, .. } if body == "v2"));

        // A later drain picks up exactly where it stopped
        let report = queue.drain(&client).await.unwrap();
        assert_eq!(report.replayed, 2);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drain_replays_every_op_kind() {
        let queue = setup().await;
        let scope = scope();
        let note = Note::new(scope.project_id, scope.room_id);
        let image = NoteImage::new(note.id, "https://cdn.example.com/a.jpg").unwrap();
        let reading = Reading::new(
            scope.project_id,
            scope.room_id,
            ReadingKind::MoistureContent,
            18.0,
        )
        .unwrap();

        let ops = [
            QueueOp::CreateNote { note: note.clone() },
            QueueOp::RegisterImage {
                note_id: note.id,
                image: image.clone(),
            },
            QueueOp::RemoveImage {
                note_id: note.id,
                image_id: image.id,
            },
            QueueOp::AddReading {
                reading: reading.clone(),
            },
            QueueOp::DeleteNote { note_id: note.id },
        ];
        for op in &ops {
            queue.enqueue(scope, op).await.unwrap();
        }

        let client = RecordingClient::new();
        let report = queue.drain(&client).await.unwrap();
        assert_eq!(report.replayed, ops.len());

        let calls = client.calls();
        assert_eq!(calls[1], Call::AddImage(note.id, image.id));
        assert_eq!(calls[2], Call::RemoveImage(note.id, image.id));
        assert_eq!(calls[3], Call::AddReading(reading.id));
        assert_eq!(calls[4], Call::DeleteNote(note.id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_op_roundtrip() {
        let scope = scope();
        let note = Note::with_body(scope.project_id, scope.room_id, "Water damage");
        let op = QueueOp::CreateNote { note };

        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"kind\":\"create_note\""));
        let parsed: QueueOp = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, op);
    }
}
