/*!
 * Socket Endpoint Construction
 *
 * Builds the per-session WebSocket URLs for the event and video
 * channels. The bearer token rides as a url-encoded `token` query
 * parameter because WebSocket handshakes carry no custom headers from
 * the original client platform.
 */

use anyhow::{Context, Result};
use url::Url;

/// Map an http(s) origin onto the matching ws(s) scheme and apply the
/// channel path and token.
fn build(origin: &str, path: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(origin).with_context(|| format!("invalid origin: {origin}"))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("cannot set websocket scheme on {origin}"))?;
    url.set_path(path);
    url.set_query(None);
    if !token.is_empty() {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

/// Event channel endpoint: `ws(s)://<host>/ws/events/{session_id}?token=...`
pub fn events_url(origin: &str, session_id: &str, token: &str) -> Result<Url> {
    build(origin, &format!("/ws/events/{session_id}"), token)
}

/// Video channel endpoint: `ws(s)://<host>/ws/video/{session_id}?token=...`
pub fn video_url(origin: &str, session_id: &str, token: &str) -> Result<Url> {
    build(origin, &format!("/ws/video/{session_id}"), token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_url_plain_http() {
        let url = events_url("http://localhost:8000", "s-1", "tok").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws/events/s-1?token=tok");
    }

    #[test]
    fn test_video_url_https_maps_to_wss() {
        let url = video_url("https://relay.example.com", "s-2", "tok").unwrap();
        assert_eq!(url.as_str(), "wss://relay.example.com/ws/video/s-2?token=tok");
    }

    #[test]
    fn test_token_is_url_encoded() {
        let url = events_url("http://localhost:8000", "s-1", "a+b/c=").unwrap();
        let query = url.query().unwrap();
        assert!(!query.contains('/'), "token must be percent-encoded: {query}");
        let decoded: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(decoded, vec![("token".to_string(), "a+b/c=".to_string())]);
    }

    #[test]
    fn test_empty_token_omits_query() {
        let url = events_url("http://localhost:8000", "s-1", "").unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_invalid_origin_rejected() {
        assert!(events_url("not a url", "s-1", "tok").is_err());
    }
}
