//! Remote mutation client
//!
//! Thin wrapper around the backend's note/image/reading REST endpoints.
//! One CRUD call per operation; no retries, no idempotency keys. Callers
//! decide whether a failure is queued or surfaced.

use std::future::Future;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{ImageId, Note, NoteId, NoteImage, Reading};
use crate::util::{compact_text, is_http_url, normalize_text_option};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid API configuration: {0}")]
    InvalidConfiguration(String),
    #[error("API HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Invalid API payload: {0}")]
    InvalidPayload(String),
}

impl ApiError {
    /// Whether the failure is a transport-level problem (no connectivity,
    /// timeout, 5xx) that should fall back into the offline queue, as
    /// opposed to a validation rejection that must reach the user.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::InvalidConfiguration(_) | Self::InvalidPayload(_) => false,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Seam between the sync flow and the backend.
///
/// The offline queue, sync coordinator, and upload pipeline all talk to the
/// backend through this trait so tests can substitute a recording stub.
pub trait RemoteMutations {
    fn create_note(&self, note: &Note) -> impl Future<Output = ApiResult<Note>> + Send;

    fn update_note(
        &self,
        note_id: NoteId,
        body: &str,
        updated_at: i64,
    ) -> impl Future<Output = ApiResult<Note>> + Send;

    fn delete_note(&self, note_id: NoteId) -> impl Future<Output = ApiResult<()>> + Send;

    fn add_image(
        &self,
        note_id: NoteId,
        image: &NoteImage,
    ) -> impl Future<Output = ApiResult<NoteImage>> + Send;

    fn remove_image(
        &self,
        note_id: NoteId,
        image_id: ImageId,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    fn add_reading(&self, reading: &Reading) -> impl Future<Output = ApiResult<Reading>> + Send;
}

/// HTTP client for the Siteline backend API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ApiClient {
    /// Build a client for an explicit API base URL.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            token: normalize_text_option(token),
            client: reqwest::Client::builder().build()?,
        })
    }

    /// The base URL this client was configured with.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe backend reachability; used as the startup connectivity check.
    pub async fn ping(&self) -> ApiResult<()> {
        let request = self.client.get(format!("{}/v1/health", self.base_url));
        let response = self.authorize(request).send().await?;
        check_status(response).await?;
        Ok(())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        route: &str,
        body: &impl serde::Serialize,
    ) -> ApiResult<T> {
        let request = self
            .client
            .post(format!("{}{route}", self.base_url))
            .json(body);
        let response = self.authorize(request).send().await?;
        let response = check_status(response).await?;
        parse_json(response).await
    }

    async fn patch_json<T: DeserializeOwned>(
        &self,
        route: &str,
        body: &impl serde::Serialize,
    ) -> ApiResult<T> {
        let request = self
            .client
            .patch(format!("{}{route}", self.base_url))
            .json(body);
        let response = self.authorize(request).send().await?;
        let response = check_status(response).await?;
        parse_json(response).await
    }

    async fn delete(&self, route: &str) -> ApiResult<()> {
        let request = self.client.delete(format!("{}{route}", self.base_url));
        let response = self.authorize(request).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

impl RemoteMutations for ApiClient {
    async fn create_note(&self, note: &Note) -> ApiResult<Note> {
        let route = format!(
            "/v1/projects/{}/rooms/{}/notes",
            note.project_id, note.room_id
        );
        self.post_json(&route, note).await
    }

    async fn update_note(&self, note_id: NoteId, body: &str, updated_at: i64) -> ApiResult<Note> {
        let route = format!("/v1/notes/{note_id}");
        self.patch_json(
            &route,
            &serde_json::json!({
                "body": body,
                "updated_at": updated_at,
            }),
        )
        .await
    }

    async fn delete_note(&self, note_id: NoteId) -> ApiResult<()> {
        self.delete(&format!("/v1/notes/{note_id}")).await
    }

    async fn add_image(&self, note_id: NoteId, image: &NoteImage) -> ApiResult<NoteImage> {
        let route = format!("/v1/notes/{note_id}/images");
        self.post_json(&route, image).await
    }

    async fn remove_image(&self, note_id: NoteId, image_id: ImageId) -> ApiResult<()> {
        self.delete(&format!("/v1/notes/{note_id}/images/{image_id}"))
            .await
    }

    async fn add_reading(&self, reading: &Reading) -> ApiResult<Reading> {
        let route = format!(
            "/v1/projects/{}/rooms/{}/readings",
            reading.project_id, reading.room_id
        );
        self.post_json(&route, reading).await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

async fn check_status(response: reqwest::Response) -> ApiResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Api {
        status: status.as_u16(),
        message: parse_api_error(status, &body),
    })
}

async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|error| ApiError::InvalidPayload(error.to_string()))
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        compact_text(trimmed)
    }
}

fn normalize_base_url(raw: String) -> ApiResult<String> {
    let base = normalize_text_option(Some(raw)).ok_or_else(|| {
        ApiError::InvalidConfiguration("API base URL must not be empty".to_string())
    })?;
    if is_http_url(&base) {
        Ok(base.trim_end_matches('/').to_string())
    } else {
        Err(ApiError::InvalidConfiguration(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
    }

    #[test]
    fn normalize_base_url_trims_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://api.example.com/".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        let body = r#"{"error": "bad", "message": "Body is required"}"#;
        let parsed = parse_api_error(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(parsed, "Body is required");
    }

    #[test]
    fn parse_api_error_falls_back_to_status() {
        let parsed = parse_api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(parsed, "HTTP 502");
    }

    #[test]
    fn is_transport_classifies_errors() {
        let validation = ApiError::Api {
            status: 422,
            message: "Body is required".to_string(),
        };
        assert!(!validation.is_transport());

        let server = ApiError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(server.is_transport());

        assert!(!ApiError::InvalidConfiguration("x".to_string()).is_transport());
    }

    #[test]
    fn client_rejects_missing_scheme() {
        assert!(ApiClient::new("api.example.com", None).is_err());
    }

    #[test]
    fn client_normalizes_empty_token() {
        let client = ApiClient::new("https://api.example.com", Some("  ".to_string())).unwrap();
        assert!(client.token.is_none());
        assert_eq!(client.base_url(), "https://api.example.com");
    }
}
