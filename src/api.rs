/*!
 * Session REST Client
 *
 * Thin wrappers around the backend's session endpoints. The backend
 * owns all session semantics; this client only creates, fetches, and
 * stops sessions around the socket lifetime.
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Request body for creating a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Capture source, e.g. "gopro_wifi", "gopro_usb", or "video_file".
    pub source_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

/// Session details returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    pub id: String,
    pub name: Option<String>,
    pub status: String,
    pub source_type: Option<String>,
    #[serde(default)]
    pub total_shots: i64,
    #[serde(default)]
    pub total_pocketed: i64,
    #[serde(default)]
    pub total_fouls: i64,
}

/// Client for the session endpoints.
pub struct SessionApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SessionApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Create a new session to attach the sockets to.
    pub async fn create_session(&self, request: &SessionCreate) -> Result<SessionResponse> {
        self.http
            .post(self.url("/api/sessions/"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .context("create session request failed")?
            .error_for_status()
            .context("create session rejected")?
            .json()
            .await
            .context("create session response unparseable")
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionResponse> {
        self.http
            .get(self.url(&format!("/api/sessions/{session_id}")))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("get session request failed")?
            .error_for_status()
            .context("get session rejected")?
            .json()
            .await
            .context("get session response unparseable")
    }

    /// Stop an active session. Called at shutdown; the backend flips the
    /// session out of "recording".
    pub async fn stop_session(&self, session_id: &str) -> Result<SessionResponse> {
        self.http
            .post(self.url(&format!("/api/sessions/{session_id}/stop")))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("stop session request failed")?
            .error_for_status()
            .context("stop session rejected")?
            .json()
            .await
            .context("stop session response unparseable")
    }
}
