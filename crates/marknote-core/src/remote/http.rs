//! HTTP client for the remote note collection

use reqwest::StatusCode;
use serde::Deserialize;

use crate::models::{Note, NoteId};

use super::{NoteDraft, NoteUpdate, RemoteClient, RemoteError, RemoteResult};

/// [`RemoteClient`] over the REST collection resource
///
/// Endpoints: `GET {base}` list, `POST {base}` create (upsert when the
/// provided id exists), `PUT {base}/{id}` partial update, `DELETE
/// {base}/{id}` idempotent delete.
#[derive(Clone)]
pub struct HttpRemoteClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteClient {
    pub fn new(endpoint: impl Into<String>) -> RemoteResult<Self> {
        let base_url = normalize_endpoint(endpoint.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
        })
    }

    fn note_url(&self, id: &NoteId) -> String {
        format!("{}/{id}", self.base_url)
    }
}

#[async_trait::async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn list_all(&self) -> RemoteResult<Vec<Note>> {
        let response = self.client.get(&self.base_url).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn create(&self, draft: &NoteDraft) -> RemoteResult<Note> {
        let response = self.client.post(&self.base_url).json(draft).send().await?;
        match response.status() {
            // 201 created, or 200 when the server upserted a provided id
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::CONFLICT => Err(RemoteError::Conflict(
                draft.id.map(|id| id.as_str()).unwrap_or_default(),
            )),
            _ => Err(api_error(response).await),
        }
    }

    async fn update(&self, id: &NoteId, update: &NoteUpdate) -> RemoteResult<Note> {
        let response = self
            .client
            .put(self.note_url(id))
            .json(update)
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(id.as_str())),
            _ => Err(api_error(response).await),
        }
    }

    async fn delete(&self, id: &NoteId) -> RemoteResult<()> {
        let response = self.client.delete(self.note_url(id)).send().await?;
        match response.status() {
            // An already-absent record is a successful no-op
            status if status.is_success() || status == StatusCode::NOT_FOUND => Ok(()),
            _ => Err(api_error(response).await),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

async fn api_error(response: reqwest::Response) -> RemoteError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    RemoteError::Api {
        status: status.as_u16(),
        message: parse_api_error(status, &body),
    }
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
        trimmed.chars().take(180).collect()
    }
}

fn normalize_endpoint(raw: String) -> RemoteResult<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(RemoteError::Api {
            status: 0,
            message: "endpoint must not be empty".to_string(),
        });
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::Api {
            status: 0,
            message: "endpoint must include http:// or https://".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com/notes".to_string()).is_err());
    }

    #[test]
    fn test_normalize_endpoint_trims_trailing_slash() {
        assert_eq!(
            normalize_endpoint("https://example.com/api/notes/".to_string()).unwrap(),
            "https://example.com/api/notes"
        );
    }

    #[test]
    fn test_parse_api_error_prefers_message_field() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"message": "Title and content are required parameters"}"#,
        );
        assert_eq!(message, "Title and content are required parameters");
    }

    #[test]
    fn test_parse_api_error_falls_back_to_status() {
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "HTTP 500"
        );
    }

    #[test]
    fn test_note_url_joins_id() {
        let client = HttpRemoteClient::new("https://example.com/api/notes/").unwrap();
        let id = NoteId::new();
        assert_eq!(
            client.note_url(&id),
            format!("https://example.com/api/notes/{id}")
        );
    }
}
