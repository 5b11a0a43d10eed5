//! CueView agent binary.
//!
//! Runs one of three roles against a CueView backend session:
//! `producer` captures camera frames and relays them over the video
//! socket, `viewer` renders the remote frame stream, and `monitor`
//! ingests game telemetry into the session store and logs it.

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cueview_agent::api::{SessionApi, SessionCreate};
use cueview_agent::camera::create_camera;
use cueview_agent::config::AgentConfig;
use cueview_agent::producer::{ConnectionState, Producer};
use cueview_agent::reconnect::Supervisor;
use cueview_agent::state::SessionStore;
use cueview_agent::viewer::{SurfaceBuffer, Viewer};
use cueview_agent::{ws, EventSocketClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let role = std::env::args().nth(1).unwrap_or_else(|| "monitor".to_string());
    let config = AgentConfig::from_env();

    info!("CueView agent v{}", env!("CARGO_PKG_VERSION"));
    info!(role = %role, server = %config.server_url, "Starting");

    match role.as_str() {
        "producer" => run_producer(config).await,
        "viewer" => run_viewer(config).await,
        "monitor" => run_monitor(config).await,
        other => bail!("unknown role '{other}' (expected producer, viewer, or monitor)"),
    }
}

/// Resolve the session to attach to, creating one over REST when the
/// config names none.
async fn resolve_session(config: &AgentConfig, api: &SessionApi, create: bool) -> Result<String> {
    if let Some(id) = &config.session_id {
        return Ok(id.clone());
    }
    if !create {
        bail!("no session configured; set CUEVIEW_SESSION");
    }
    let session = api
        .create_session(&SessionCreate {
            name: Some(format!("agent-{}", uuid::Uuid::new_v4())),
            source_type: "gopro_wifi".to_string(),
            source_path: None,
        })
        .await
        .context("could not create a session")?;
    info!(session_id = %session.id, "Session created");
    Ok(session.id)
}

/// Shut the supervisor down when the user interrupts the process.
fn shutdown_on_ctrl_c(supervisor: Supervisor) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            supervisor.shutdown();
        }
    });
}

async fn run_producer(config: AgentConfig) -> Result<()> {
    let api = SessionApi::new(&config.server_url, &config.token);
    let session_id = resolve_session(&config, &api, true).await?;
    let url = ws::video_url(config.video_origin(), &session_id, &config.token)?;

    let mut producer = Producer::new(create_camera(), config.camera.clone());
    if !producer.acquire_camera() {
        // Terminal for this attempt; the operator fixes permissions and
        // relaunches.
        if let ConnectionState::Error(message) = producer.state() {
            warn!("{message}");
        }
        return Ok(());
    }

    let supervisor = Supervisor::new();
    shutdown_on_ctrl_c(supervisor.clone());

    loop {
        match producer.connect(&url).await {
            Ok(()) => {
                producer.start_streaming();
                wait_for_disconnect(&producer, &supervisor).await;
                let stats = producer.stats();
                info!(
                    captured = stats.frames_captured,
                    transmitted = stats.frames_transmitted,
                    dropped = stats.frames_dropped,
                    "Streaming run ended"
                );
            }
            Err(e) => warn!("Connect failed: {e:#}"),
        }
        if !supervisor.wait_retry().await {
            break;
        }
        info!("Reconnecting video socket");
    }

    producer.teardown().await;
    if let Err(e) = api.stop_session(&session_id).await {
        warn!("Could not stop session: {e:#}");
    }
    Ok(())
}

/// Block until the producer leaves its connected/streaming states or
/// the supervisor is shut down.
async fn wait_for_disconnect(producer: &Producer, supervisor: &Supervisor) {
    let mut state_rx = producer.subscribe_state();
    let cancel = supervisor.cancel_token();
    loop {
        if matches!(
            *state_rx.borrow(),
            ConnectionState::Disconnected | ConnectionState::Error(_)
        ) {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

async fn run_viewer(config: AgentConfig) -> Result<()> {
    let api = SessionApi::new(&config.server_url, &config.token);
    let session_id = resolve_session(&config, &api, false).await?;
    let url = ws::video_url(&config.server_url, &session_id, &config.token)?;

    let supervisor = Supervisor::new();
    shutdown_on_ctrl_c(supervisor.clone());

    let viewer = Viewer::new(url, SurfaceBuffer::new(), supervisor);
    viewer.run().await
}

async fn run_monitor(config: AgentConfig) -> Result<()> {
    let api = SessionApi::new(&config.server_url, &config.token);
    let session_id = resolve_session(&config, &api, false).await?;
    let url = ws::events_url(&config.server_url, &session_id, &config.token)?;

    let store = SessionStore::new();
    // Fresh store for a fresh subscription; nothing stale can leak in.
    store.reset();
    store.set_session(Some(session_id.clone()));
    store.set_recording(true);

    let supervisor = Supervisor::new();
    shutdown_on_ctrl_c(supervisor.clone());

    // External ticker advancing the elapsed-seconds counter.
    let ticker_store = store.clone();
    let ticker_cancel = supervisor.cancel_token();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker_cancel.cancelled() => break,
                _ = interval.tick() => {
                    let snapshot = ticker_store.snapshot();
                    if snapshot.is_recording && !snapshot.is_paused {
                        ticker_store.tick_runtime();
                    }
                }
            }
        }
    });

    // Periodic status line for the operator.
    let status_store = store.clone();
    let status_cancel = supervisor.cancel_token();
    let status = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = status_cancel.cancelled() => break,
                _ = interval.tick() => {
                    let snap = status_store.snapshot();
                    info!(
                        connected = snap.ai_connected,
                        shots = snap.shot_count,
                        pocketed = snap.pocketed_count,
                        fouls = snap.foul_count,
                        runtime_secs = snap.runtime_secs,
                        events = status_store.event_count(),
                        "Session telemetry"
                    );
                }
            }
        }
    });

    let client = EventSocketClient::new(url, store.clone(), supervisor.clone());
    let result = client.run().await;

    ticker.abort();
    status.abort();
    // Session over: clear the store so a later session starts clean.
    store.reset();
    result
}
