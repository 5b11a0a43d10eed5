/*!
 * CueView Agent Library
 *
 * Live media/event ingestion pipeline for the CueView pool-analysis
 * backend: camera capture and frame relay (producer), remote frame
 * rendering (viewer), and game-telemetry ingestion into a bounded
 * session store, all over two independent WebSocket channels.
 */

pub mod api;
pub mod camera;
pub mod config;
pub mod events;
pub mod producer;
pub mod protocol;
pub mod reconnect;
pub mod state;
pub mod viewer;
pub mod ws;

// Re-export commonly used types
pub use camera::{CameraConfig, CameraError, CameraSource, FacingMode};
pub use config::AgentConfig;
pub use events::EventSocketClient;
pub use producer::{ConnectionState, Producer};
pub use protocol::{BallPosition, GameEvent, VideoMessage};
pub use reconnect::Supervisor;
pub use state::SessionStore;
pub use viewer::{FrameSink, SurfaceBuffer, Viewer};
