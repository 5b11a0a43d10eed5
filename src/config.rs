/*!
 * Agent Configuration
 *
 * Connection and capture settings for the agent, with environment
 * overrides so deployments can point at a different backend or relay
 * without a rebuild.
 */

use std::time::Duration;

use crate::camera::CameraConfig;

/// Fixed frame period: 1000 / 15 ms.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(1000 / 15);

/// JPEG quality factor for outbound frames (0.7 on a 0..1 scale).
pub const JPEG_QUALITY: u8 = 70;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// HTTP(S) base URL of the backend, e.g. `http://localhost:8000`.
    pub server_url: String,
    /// Bearer token for REST calls and socket authentication.
    pub token: String,
    /// Session to attach to. When absent the binary creates one over REST.
    pub session_id: Option<String>,
    /// Operator-supplied relay/tunnel endpoint used instead of the server
    /// origin for the video socket, e.g. an HTTPS tunnel in front of a
    /// LAN-only backend.
    pub relay_url: Option<String>,
    pub camera: CameraConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            token: String::new(),
            session_id: None,
            relay_url: None,
            camera: CameraConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Build a config from defaults plus `CUEVIEW_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("CUEVIEW_SERVER") {
            config.server_url = url;
        }
        if let Ok(token) = std::env::var("CUEVIEW_TOKEN") {
            config.token = token;
        }
        if let Ok(session) = std::env::var("CUEVIEW_SESSION") {
            if !session.is_empty() {
                config.session_id = Some(session);
            }
        }
        if let Ok(relay) = std::env::var("CUEVIEW_RELAY") {
            if !relay.is_empty() {
                config.relay_url = Some(relay);
            }
        }
        config
    }

    /// Origin the video socket should use: the relay when configured,
    /// otherwise the server itself.
    pub fn video_origin(&self) -> &str {
        self.relay_url.as_deref().unwrap_or(&self.server_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.server_url, "http://localhost:8000");
        assert_eq!(config.session_id, None);
        assert_eq!(config.video_origin(), "http://localhost:8000");
    }

    #[test]
    fn test_relay_overrides_video_origin() {
        let config = AgentConfig {
            relay_url: Some("https://relay.example.com".to_string()),
            ..AgentConfig::default()
        };
        assert_eq!(config.video_origin(), "https://relay.example.com");
        assert_eq!(config.server_url, "http://localhost:8000");
    }

    #[test]
    fn test_frame_interval_is_15fps() {
        assert_eq!(FRAME_INTERVAL, Duration::from_millis(66));
    }
}
