/*!
 * Event Socket Client
 *
 * Maintains the long-lived telemetry connection for a session and
 * translates incoming game events (ball positions, shots, pockets,
 * fouls) into Session State Store mutations. Holds no authoritative
 * state of its own.
 */

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::protocol::{BallPosition, EventType};
use crate::reconnect::Supervisor;
use crate::state::SessionStore;

/// Telemetry client for one session's event channel.
pub struct EventSocketClient {
    url: Url,
    store: SessionStore,
    supervisor: Supervisor,
}

impl EventSocketClient {
    pub fn new(url: Url, store: SessionStore, supervisor: Supervisor) -> Self {
        Self {
            url,
            store,
            supervisor,
        }
    }

    /// Run the client until the supervisor is shut down. Each connection
    /// loss marks connectivity false and schedules exactly one reconnect
    /// after the fixed delay; connect re-runs from scratch.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.connect_and_listen().await {
                Ok(()) => info!("Event socket closed by server"),
                Err(e) => warn!("Event socket error: {e:#}"),
            }
            self.store.set_ai_connected(false);

            if !self.supervisor.wait_retry().await {
                info!("Event client shut down");
                return Ok(());
            }
            info!("Reconnecting event socket");
        }
    }

    async fn connect_and_listen(&self) -> Result<()> {
        let cancel = self.supervisor.cancel_token();

        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .context("event socket connect failed")?;
        info!(url = %self.url, "Event socket connected");
        self.store.set_ai_connected(true);

        let (_write, mut read) = ws.split();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => dispatch(&self.store, &text),
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("event socket read failed"),
                },
            }
        }
    }
}

/// Translate one raw event-channel message into store mutations.
///
/// Fails soft: anything unparseable is logged and discarded with zero
/// state changes. Appended events carry the message's own `timestamp_ms`
/// when present, else local receipt time.
pub fn dispatch(store: &SessionStore, raw: &str) {
    let message: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Discarding malformed event message: {e}");
            return;
        }
    };
    let Some(msg_type) = message.get("type").and_then(|t| t.as_str()) else {
        warn!("Discarding event message with no type tag");
        return;
    };
    let timestamp_ms = message.get("timestamp_ms").and_then(|t| t.as_i64());

    match msg_type {
        "ball_update" => {
            let balls: Vec<BallPosition> = match message
                .get("balls")
                .cloned()
                .map(serde_json::from_value)
            {
                Some(Ok(balls)) => balls,
                _ => {
                    warn!("Discarding ball_update with unparseable balls list");
                    return;
                }
            };
            debug!(count = balls.len(), "Ball snapshot updated");
            store.update_balls(balls);
        }
        "shot" => {
            store.increment_shots();
            let pocketed = message
                .get("shot")
                .and_then(|s| s.get("balls_pocketed"))
                .and_then(|b| b.as_array())
                .map(|b| b.len() as u64)
                .unwrap_or(0);
            if pocketed > 0 {
                store.add_pocketed(pocketed);
            }
            let payload = message.get("shot").cloned().unwrap_or(message.clone());
            store.push_event(EventType::Shot, payload, timestamp_ms);
        }
        "pocket" => {
            store.add_pocketed_one();
            store.push_event(EventType::Pocket, message.clone(), timestamp_ms);
        }
        "foul" => {
            store.increment_fouls();
            store.push_event(EventType::Foul, message.clone(), timestamp_ms);
        }
        // Handshake acknowledgement, no state change.
        "connected" => debug!("Event channel handshake acknowledged"),
        other => {
            store.push_event(EventType::passthrough(other), message.clone(), timestamp_ms);
        }
    }
}
