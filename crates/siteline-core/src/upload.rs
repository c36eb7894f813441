//! Image capture and upload pipeline
//!
//! Uploads run concurrently per batch; registration against the note is
//! sequential in pick order so the server sees attachments in the order
//! the user chose them. A failed upload never blocks the rest of the
//! batch, and a failed or offline registration falls back to the queue.

use std::future::Future;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use serde::Deserialize;

use crate::models::{NoteId, NoteImage, Scope};
use crate::remote::RemoteMutations;
use crate::sync::{Delivery, SyncCoordinator};
use crate::util::is_http_url;

/// Upload pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("cannot read asset: {0}")]
    Read(#[from] std::io::Error),

    #[error("asset path has no file name: {0}")]
    MissingFileName(PathBuf),

    #[error("blob upload failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("blob host returned {status}: {message}")]
    Host { status: u16, message: String },

    #[error("blob host returned an invalid URL: {0}")]
    InvalidUrl(String),
}

/// Where an image sits in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Capturing,
    Uploading,
    Registering,
    Done,
    Failed,
}

impl std::fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Uploading => "uploading",
            Self::Registering => "registering",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A captured image waiting on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
}

impl LocalAsset {
    /// Describe a file on disk, guessing the MIME type from its extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToString::to_string)
            .ok_or_else(|| UploadError::MissingFileName(path.clone()))?;
        let mime_type = guess_mime(&path).to_string();
        Ok(Self {
            path,
            file_name,
            mime_type,
        })
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("heic") => "image/heic",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Backend that accepts raw image bytes and hands back a public URL.
pub trait BlobHost: Send + Sync {
    fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<String, UploadError>> + Send;
}

#[derive(Debug, Deserialize)]
struct BlobUploadResponse {
    url: String,
}

/// HTTP blob host client.
#[derive(Debug, Clone)]
pub struct BlobClient {
    base_url: String,
    client: reqwest::Client,
}

impl BlobClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UploadError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(UploadError::InvalidUrl(base_url));
        }
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
        })
    }
}

impl BlobHost for BlobClient {
    async fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/v1/blobs", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UploadError::Host {
                status: status.as_u16(),
                message: crate::util::compact_text(&message),
            });
        }

        let parsed: BlobUploadResponse = response.json().await?;
        if !is_http_url(&parsed.url) {
            return Err(UploadError::InvalidUrl(parsed.url));
        }
        Ok(parsed.url)
    }
}

/// What happened to a single asset in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Uploaded and attached to the note
    Registered { asset: LocalAsset, image: NoteImage },
    /// Uploaded, but the attachment is waiting in the offline queue
    QueuedRegistration { asset: LocalAsset, image: NoteImage },
    /// The upload itself failed; the rest of the batch is unaffected
    UploadFailed { asset: LocalAsset, reason: String },
}

impl UploadOutcome {
    #[must_use]
    pub const fn phase(&self) -> UploadPhase {
        match self {
            Self::Registered { .. } => UploadPhase::Done,
            Self::QueuedRegistration { .. } => UploadPhase::Registering,
            Self::UploadFailed { .. } => UploadPhase::Failed,
        }
    }
}

/// Result of a batch, in pick order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<UploadOutcome>,
}

impl BatchReport {
    #[must_use]
    pub fn registered(&self) -> usize {
        self.count(|outcome| matches!(outcome, UploadOutcome::Registered { .. }))
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.count(|outcome| matches!(outcome, UploadOutcome::QueuedRegistration { .. }))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, UploadOutcome::UploadFailed { .. }))
    }

    fn count(&self, pred: impl Fn(&UploadOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|outcome| pred(outcome)).count()
    }
}

/// Drives batches of local assets through upload and registration.
pub struct ImagePipeline<B: BlobHost> {
    blob: B,
}

impl<B: BlobHost> ImagePipeline<B> {
    #[must_use]
    pub const fn new(blob: B) -> Self {
        Self { blob }
    }

    /// Upload a batch of assets and attach them to a note.
    ///
    /// Every asset produces an outcome; this never aborts the batch.
    pub async fn upload_batch<C: RemoteMutations>(
        &self,
        coordinator: &SyncCoordinator<C>,
        scope: Scope,
        note_id: NoteId,
        assets: Vec<LocalAsset>,
    ) -> BatchReport {
        let uploads = assets.into_iter().map(|asset| async move {
            let result = self.upload_one(&asset).await;
            (asset, result)
        });
        let uploaded = join_all(uploads).await;

        let mut outcomes = Vec::with_capacity(uploaded.len());
        for (asset, result) in uploaded {
            let url = match result {
                Ok(url) => url,
                Err(error) => {
                    tracing::warn!(file = %asset.file_name, %error, "image upload failed");
                    outcomes.push(UploadOutcome::UploadFailed {
                        asset,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            let outcome = match NoteImage::new(note_id, url) {
                Ok(image) => match coordinator.register_image(scope, image).await {
                    Ok(Delivery::Sent(image)) => UploadOutcome::Registered { asset, image },
                    Ok(Delivery::Queued(image)) => {
                        UploadOutcome::QueuedRegistration { asset, image }
                    }
                    Err(error) => {
                        tracing::warn!(file = %asset.file_name, %error, "image registration failed");
                        UploadOutcome::UploadFailed {
                            asset,
                            reason: error.to_string(),
                        }
                    }
                },
                Err(error) => UploadOutcome::UploadFailed {
                    asset,
                    reason: error.to_string(),
                },
            };
            outcomes.push(outcome);
        }

        BatchReport { outcomes }
    }

    async fn upload_one(&self, asset: &LocalAsset) -> Result<String, UploadError> {
        tracing::debug!(file = %asset.file_name, phase = %UploadPhase::Uploading, "uploading image");
        let bytes = tokio::fs::read(&asset.path).await?;
        self.blob
            .upload(&asset.file_name, &asset.mime_type, bytes)
            .await
    }
}
