/*!
 * Session State Store
 *
 * The single authoritative in-memory model of "what is happening now":
 * recording flag, counters, bounded event log, and the latest ball
 * snapshot. Socket clients hold no state of their own; they translate
 * incoming messages into calls on this store.
 */

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use crate::protocol::{now_ms, BallPosition, EventType, GameEvent};

/// Maximum number of events retained in the in-memory log. Older events
/// are silently evicted in arrival order (bounded-memory policy).
pub const EVENT_LOG_CAPACITY: usize = 100;

/// Snapshot of the runtime aggregate, cloned out for observers.
#[derive(Debug, Clone, Default)]
pub struct SessionRuntimeState {
    pub session_id: Option<String>,
    pub is_recording: bool,
    pub is_paused: bool,
    pub shot_count: u64,
    pub pocketed_count: u64,
    pub foul_count: u64,
    /// Elapsed seconds, advanced by an external ticker.
    pub runtime_secs: u64,
    /// Connectivity to the AI backend (event socket open).
    pub ai_connected: bool,
    /// Accumulated analysis cost in USD.
    pub cost_usd: f64,
}

#[derive(Default)]
struct Inner {
    runtime: SessionRuntimeState,
    balls: Vec<BallPosition>,
    events: VecDeque<GameEvent>,
    next_event_id: u64,
}

/// Shared handle to the session store.
///
/// All mutation goes through atomic setters; each setter takes the lock
/// exactly once, so no compound transaction can observe partial state.
/// Clone the handle freely; clones share the same store.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<Inner>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning only happens if a setter panicked; the data itself is
        // always in a consistent state, so recover the guard.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the active session id. Does not clear other fields; callers
    /// reset before starting a new session's subscriptions.
    pub fn set_session(&self, session_id: Option<String>) {
        self.lock().runtime.session_id = session_id;
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().runtime.session_id.clone()
    }

    pub fn set_recording(&self, recording: bool) {
        self.lock().runtime.is_recording = recording;
    }

    pub fn set_paused(&self, paused: bool) {
        self.lock().runtime.is_paused = paused;
    }

    pub fn increment_shots(&self) {
        self.lock().runtime.shot_count += 1;
    }

    pub fn increment_fouls(&self) {
        self.lock().runtime.foul_count += 1;
    }

    /// Add exactly `count` to the pocketed counter.
    pub fn add_pocketed(&self, count: u64) {
        self.lock().runtime.pocketed_count += count;
    }

    /// Convenience path for a single pocketed ball.
    pub fn add_pocketed_one(&self) {
        self.add_pocketed(1);
    }

    /// Advance the elapsed-seconds counter by one. Driven by an external
    /// ticking collaborator, not by the store itself.
    pub fn tick_runtime(&self) {
        self.lock().runtime.runtime_secs += 1;
    }

    pub fn set_ai_connected(&self, connected: bool) {
        self.lock().runtime.ai_connected = connected;
    }

    pub fn ai_connected(&self) -> bool {
        self.lock().runtime.ai_connected
    }

    pub fn add_cost(&self, usd: f64) {
        self.lock().runtime.cost_usd += usd;
    }

    /// Replace the ball snapshot wholesale. No history is retained.
    pub fn update_balls(&self, balls: Vec<BallPosition>) {
        self.lock().balls = balls;
    }

    pub fn balls(&self) -> Vec<BallPosition> {
        self.lock().balls.clone()
    }

    /// Append a game event, assigning the next sequence id and the local
    /// receipt time. The producer timestamp takes precedence when present;
    /// otherwise the receipt time is used, preserving ordering fidelity
    /// across network jitter.
    pub fn push_event(
        &self,
        event_type: EventType,
        payload: Value,
        timestamp_ms: Option<i64>,
    ) -> u64 {
        let mut inner = self.lock();
        let received_at_ms = now_ms();
        let id = inner.next_event_id;
        inner.next_event_id += 1;

        let event = GameEvent {
            id,
            session_id: inner.runtime.session_id.clone(),
            timestamp_ms: timestamp_ms.unwrap_or(received_at_ms),
            event_type,
            payload,
            received_at_ms,
        };

        if inner.events.len() == EVENT_LOG_CAPACITY {
            let evicted = inner.events.pop_front();
            if let Some(old) = evicted {
                debug!(id = old.id, "Event log full, evicting oldest event");
            }
        }
        inner.events.push_back(event);
        id
    }

    /// Snapshot of the event log in arrival order, oldest first.
    pub fn events(&self) -> Vec<GameEvent> {
        self.lock().events.iter().cloned().collect()
    }

    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// Runtime aggregate snapshot for observers.
    pub fn snapshot(&self) -> SessionRuntimeState {
        self.lock().runtime.clone()
    }

    /// Restore every field to its initial zero/null value in one
    /// operation. Called at session end and before a new session's
    /// subscriptions begin so stale state never leaks across sessions.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = Inner::default();
    }
}
