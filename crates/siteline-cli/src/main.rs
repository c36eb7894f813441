//! Siteline CLI - field documentation from the terminal
//!
//! Capture notes, photos, and readings for a restoration project room.
//! Works offline: anything the backend cannot take right now lands in the
//! local queue and replays on the next drain.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use siteline_core::db::Database;
use siteline_core::draft::DraftStore;
use siteline_core::models::{
    ImageId, NoteId, ProjectId, Reading, ReadingKind, RoomId, Scope,
};
use siteline_core::net::NetworkMonitor;
use siteline_core::queue::{OfflineQueue, QueueEntry, QueueOp};
use siteline_core::remote::ApiClient;
use siteline_core::sync::{Delivery, SyncCoordinator};
use siteline_core::upload::{BlobClient, ImagePipeline, LocalAsset, UploadOutcome};
use serde::Serialize;
use thiserror::Error;

const DEFAULT_API_URL: &str = "http://localhost:8787";

#[derive(Parser)]
#[command(name = "siteline")]
#[command(about = "Document field restoration work, online or off")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Backend API base URL
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,

    /// Skip the connectivity probe and queue everything locally
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with room notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Attach photos to a note
    Photo {
        #[command(subcommand)]
        command: PhotoCommands,
    },
    /// Record environmental readings
    Reading {
        #[command(subcommand)]
        command: ReadingCommands,
    },
    /// Inspect or drain the offline queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Show sync state and queue depth
    Status,
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Create a note in a project room
    #[command(alias = "new")]
    Add {
        /// Project ID
        #[arg(long)]
        project: String,
        /// Room ID
        #[arg(long)]
        room: String,
        /// Note body (empty creates a blank note)
        body: Vec<String>,
    },
    /// Replace a note's body
    Edit {
        /// Project ID
        #[arg(long)]
        project: String,
        /// Room ID
        #[arg(long)]
        room: String,
        /// Note ID
        id: String,
        /// New body
        body: Vec<String>,
    },
    /// Delete a note
    Delete {
        /// Project ID
        #[arg(long)]
        project: String,
        /// Room ID
        #[arg(long)]
        room: String,
        /// Note ID
        id: String,
    },
}

#[derive(Subcommand)]
enum PhotoCommands {
    /// Upload image files and attach them to a note
    Attach {
        /// Project ID
        #[arg(long)]
        project: String,
        /// Room ID
        #[arg(long)]
        room: String,
        /// Note ID
        #[arg(long)]
        note: String,
        /// Image files, attached in the order given
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Detach an image from a note
    Remove {
        /// Project ID
        #[arg(long)]
        project: String,
        /// Room ID
        #[arg(long)]
        room: String,
        /// Note ID
        #[arg(long)]
        note: String,
        /// Image ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ReadingCommands {
    /// Record a reading for a room
    Add {
        /// Project ID
        #[arg(long)]
        project: String,
        /// Room ID
        #[arg(long)]
        room: String,
        /// What was measured
        #[arg(long, value_enum)]
        kind: ReadingKindArg,
        /// Measured value
        value: f64,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// List queued mutations in replay order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay queued mutations against the backend
    Drain,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ReadingKindArg {
    Temperature,
    Humidity,
    Moisture,
}

impl From<ReadingKindArg> for ReadingKind {
    fn from(kind: ReadingKindArg) -> Self {
        match kind {
            ReadingKindArg::Temperature => Self::Temperature,
            ReadingKindArg::Humidity => Self::RelativeHumidity,
            ReadingKindArg::Moisture => Self::MoistureContent,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] siteline_core::Error),
    #[error(transparent)]
    Api(#[from] siteline_core::remote::ApiError),
    #[error(transparent)]
    Upload(#[from] siteline_core::upload::UploadError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid {0} ID: {1}")]
    InvalidId(&'static str, String),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("siteline=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let api_url = resolve_api_url(cli.api_url);

    let coordinator = build_coordinator(&db_path, &api_url, cli.offline).await?;

    match cli.command {
        Commands::Note { command } => run_note(command, &coordinator).await?,
        Commands::Photo { command } => run_photo(command, &coordinator, &api_url).await?,
        Commands::Reading { command } => run_reading(command, &coordinator).await?,
        Commands::Queue { command } => run_queue(command, &coordinator).await?,
        Commands::Status => run_status(&coordinator).await?,
    }

    Ok(())
}

async fn run_note(
    command: NoteCommands,
    coordinator: &Arc<SyncCoordinator<ApiClient>>,
) -> Result<(), CliError> {
    match command {
        NoteCommands::Add {
            project,
            room,
            body,
        } => {
            let scope = parse_scope(&project, &room)?;
            let body = join_body(&body);
            let delivery = coordinator
                .create_note(scope.project_id, scope.room_id, body)
                .await?;
            report_delivery(&delivery, "Created note");
            println!("{}", delivery.into_inner().id);
        }
        NoteCommands::Edit {
            project,
            room,
            id,
            body,
        } => {
            let scope = parse_scope(&project, &room)?;
            let note_id = parse_id::<NoteId>("note", &id)?;
            let body = join_body(&body).unwrap_or_default();
            let delivery = coordinator.update_note_body(scope, note_id, &body).await?;
            report_delivery(&delivery, "Updated note");
        }
        NoteCommands::Delete { project, room, id } => {
            let scope = parse_scope(&project, &room)?;
            let note_id = parse_id::<NoteId>("note", &id)?;
            let delivery = coordinator.delete_note(scope, note_id).await?;
            report_delivery(&delivery, "Deleted note");
        }
    }
    Ok(())
}

async fn run_photo(
    command: PhotoCommands,
    coordinator: &Arc<SyncCoordinator<ApiClient>>,
    api_url: &str,
) -> Result<(), CliError> {
    match command {
        PhotoCommands::Attach {
            project,
            room,
            note,
            paths,
        } => {
            let scope = parse_scope(&project, &room)?;
            let note_id = parse_id::<NoteId>("note", &note)?;
            let assets = paths
                .into_iter()
                .map(LocalAsset::from_path)
                .collect::<Result<Vec<_>, _>>()?;

            let blob_url = env::var("SITELINE_BLOB_URL").unwrap_or_else(|_| api_url.to_string());
            let pipeline = ImagePipeline::new(BlobClient::new(blob_url)?);
            let report = pipeline
                .upload_batch(coordinator, scope, note_id, assets)
                .await;

            for outcome in &report.outcomes {
                match outcome {
                    UploadOutcome::Registered { asset, image } => {
                        println!("{}: attached as {}", asset.file_name, image.id);
                    }
                    UploadOutcome::QueuedRegistration { asset, image } => {
                        println!("{}: uploaded, attachment queued ({})", asset.file_name, image.id);
                    }
                    UploadOutcome::UploadFailed { asset, reason } => {
                        println!("{}: failed ({reason})", asset.file_name);
                    }
                }
            }
            println!(
                "{} attached, {} queued, {} failed",
                report.registered(),
                report.queued(),
                report.failed()
            );
        }
        PhotoCommands::Remove {
            project,
            room,
            note,
            id,
        } => {
            let scope = parse_scope(&project, &room)?;
            let note_id = parse_id::<NoteId>("note", &note)?;
            let image_id = parse_id::<ImageId>("image", &id)?;
            let delivery = coordinator.remove_image(scope, note_id, image_id).await?;
            report_delivery(&delivery, "Removed image");
        }
    }
    Ok(())
}

async fn run_reading(
    command: ReadingCommands,
    coordinator: &Arc<SyncCoordinator<ApiClient>>,
) -> Result<(), CliError> {
    match command {
        ReadingCommands::Add {
            project,
            room,
            kind,
            value,
        } => {
            let scope = parse_scope(&project, &room)?;
            let reading = Reading::new(scope.project_id, scope.room_id, kind.into(), value)?;
            let delivery = coordinator.add_reading(reading).await?;
            report_delivery(&delivery, "Recorded reading");
            println!("{}", delivery.into_inner().id);
        }
    }
    Ok(())
}

async fn run_queue(
    command: QueueCommands,
    coordinator: &Arc<SyncCoordinator<ApiClient>>,
) -> Result<(), CliError> {
    match command {
        QueueCommands::List { json } => {
            let entries = coordinator.queue().pending().await?;
            if json {
                let items = entries
                    .iter()
                    .map(queue_entry_to_item)
                    .collect::<Vec<QueueListItem>>();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if entries.is_empty() {
                println!("Queue is empty");
            } else {
                for line in format_queue_lines(&entries) {
                    println!("{line}");
                }
            }
        }
        QueueCommands::Drain => {
            let report = coordinator.drain().await?;
            if report.is_complete() {
                println!("Replayed {} queued mutations", report.replayed);
            } else {
                println!(
                    "Replayed {}, {} still queued",
                    report.replayed, report.remaining
                );
            }
        }
    }
    Ok(())
}

async fn run_status(coordinator: &Arc<SyncCoordinator<ApiClient>>) -> Result<(), CliError> {
    let queued = coordinator.queue().len().await?;
    let connectivity = if coordinator.network().is_online() {
        "online"
    } else {
        "offline"
    };
    println!("Connectivity: {connectivity}");
    println!("Sync state:   {}", coordinator.sync_state());
    println!("Queued:       {queued}");
    Ok(())
}

#[derive(Debug, Serialize)]
struct QueueListItem {
    id: i64,
    project_id: String,
    room_id: String,
    kind: String,
    created_at: i64,
}

fn queue_entry_to_item(entry: &QueueEntry) -> QueueListItem {
    QueueListItem {
        id: entry.id,
        project_id: entry.scope.project_id.to_string(),
        room_id: entry.scope.room_id.to_string(),
        kind: entry.op.kind().to_string(),
        created_at: entry.created_at,
    }
}

fn format_queue_lines(entries: &[QueueEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!("#{:<4} {:<16} {}", entry.id, entry.op.kind(), entry.scope);
            if let QueueOp::CreateNote { note } = &entry.op {
                if !note.is_blank() {
                    line.push_str("  ");
                    line.push_str(&note.title_preview(40));
                }
            }
            line
        })
        .collect()
}

fn report_delivery<T>(delivery: &Delivery<T>, verb: &str) {
    if delivery.was_queued() {
        println!("{verb} (queued for sync)");
    } else {
        println!("{verb}");
    }
}

fn parse_scope(project: &str, room: &str) -> Result<Scope, CliError> {
    Ok(Scope::new(
        parse_id::<ProjectId>("project", project)?,
        parse_id::<RoomId>("room", room)?,
    ))
}

fn parse_id<T: FromStr>(label: &'static str, raw: &str) -> Result<T, CliError> {
    raw.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(label, raw.to_string()))
}

fn join_body(parts: &[String]) -> Option<String> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("SITELINE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("siteline")
        .join("siteline.db")
}

fn resolve_api_url(cli_api_url: Option<String>) -> String {
    cli_api_url
        .or_else(|| env::var("SITELINE_API_URL").ok())
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

async fn build_coordinator(
    db_path: &Path,
    api_url: &str,
    force_offline: bool,
) -> Result<Arc<SyncCoordinator<ApiClient>>, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(db_path).await?;
    let queue = OfflineQueue::new(db);

    let token = env::var("SITELINE_API_TOKEN").ok();
    let client = ApiClient::new(api_url, token)?;

    let online = if force_offline {
        false
    } else {
        match client.ping().await {
            Ok(()) => true,
            Err(error) => {
                tracing::info!(%error, "backend unreachable, working offline");
                false
            }
        }
    };

    Ok(Arc::new(SyncCoordinator::new(
        client,
        queue,
        NetworkMonitor::new(online),
        Arc::new(DraftStore::new()),
    )))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use siteline_core::models::{ProjectId, RoomId};
    use siteline_core::queue::QueueOp;

    use super::{
        build_coordinator, format_queue_lines, join_body, parse_id, parse_scope,
        queue_entry_to_item, resolve_api_url, run_note, NoteCommands, ReadingKindArg,
        DEFAULT_API_URL,
    };
    use siteline_core::models::ReadingKind;

    #[test]
    fn join_body_trims_and_rejects_empty() {
        assert_eq!(
            join_body(&["wet".to_string(), "drywall".to_string()]),
            Some("wet drywall".to_string())
        );
        assert_eq!(join_body(&[" ".to_string()]), None);
        assert_eq!(join_body(&[]), None);
    }

    #[test]
    fn parse_scope_rejects_garbage() {
        let project = ProjectId::new().to_string();
        assert!(parse_scope(&project, "not-a-uuid").is_err());
        assert!(parse_scope(&project, &RoomId::new().to_string()).is_ok());
    }

    #[test]
    fn parse_id_trims_whitespace() {
        let id = ProjectId::new();
        let padded = format!("  {id}  ");
        assert_eq!(parse_id::<ProjectId>("project", &padded).unwrap(), id);
    }

    #[test]
    fn reading_kind_arg_maps_to_model_kind() {
        assert_eq!(
            ReadingKind::from(ReadingKindArg::Humidity),
            ReadingKind::RelativeHumidity
        );
        assert_eq!(
            ReadingKind::from(ReadingKindArg::Moisture),
            ReadingKind::MoistureContent
        );
    }

    #[test]
    fn resolve_api_url_falls_back_to_default() {
        assert_eq!(resolve_api_url(None), DEFAULT_API_URL);
        assert_eq!(
            resolve_api_url(Some("https://api.example.com".to_string())),
            "https://api.example.com"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_note_add_lands_in_queue() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("siteline.db");
        let coordinator = build_coordinator(&db_path, DEFAULT_API_URL, true)
            .await
            .unwrap();

        let command = NoteCommands::Add {
            project: ProjectId::new().to_string(),
            room: RoomId::new().to_string(),
            body: vec!["standing water in crawlspace".to_string()],
        };
        run_note(command, &coordinator).await.unwrap();

        let entries = coordinator.queue().pending().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0].op, QueueOp::CreateNote { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_listing_round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("siteline.db");
        let coordinator = build_coordinator(&db_path, DEFAULT_API_URL, true)
            .await
            .unwrap();
        coordinator
            .create_note(
                ProjectId::new(),
                RoomId::new(),
                Some("Burst pipe behind vanity\nPlumber scheduled".to_string()),
            )
            .await
            .unwrap();

        let entries = coordinator.queue().pending().await.unwrap();
        let item = queue_entry_to_item(&entries[0]);
        assert_eq!(item.kind, "create_note");

        let lines = format_queue_lines(&entries);
        assert!(lines[0].contains("create_note"));
        // First line of the note body shown as a preview
        assert!(lines[0].contains("Burst pipe behind vanity"));
        assert!(!lines[0].contains("Plumber"));
    }

    #[test]
    fn default_db_path_is_under_data_dir() {
        let path = super::default_db_path();
        assert!(path.ends_with(PathBuf::from("siteline/siteline.db")));
    }
}
