/*!
 * Frame Renderer / Viewer
 *
 * Consumes the video channel on the viewing client and draws received
 * frames with low latency. Decode is asynchronous per frame, so frames
 * can finish out of receive order under jitter; the renderer draws
 * whatever decodes. The display converges on the most-recently-decoded
 * frame, and late frames are neither reordered nor dropped.
 */

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::StreamExt;
use image::RgbaImage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::protocol::VideoMessage;
use crate::reconnect::Supervisor;

/// Destination drawing surface for decoded frames.
pub trait FrameSink: Send {
    /// Reallocate the surface to the given pixel dimensions.
    fn resize(&mut self, width: u32, height: u32);
    fn draw(&mut self, frame: &RgbaImage);
    fn size(&self) -> (u32, u32);
}

/// In-memory surface holding the most recently drawn frame.
#[derive(Default)]
pub struct SurfaceBuffer {
    width: u32,
    height: u32,
    pub frames_drawn: u64,
    pub resize_count: u64,
    pub last_frame: Option<RgbaImage>,
}

impl SurfaceBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for SurfaceBuffer {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.resize_count += 1;
    }

    fn draw(&mut self, frame: &RgbaImage) {
        self.frames_drawn += 1;
        self.last_frame = Some(frame.clone());
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Decode a base64 JPEG payload into an RGBA image.
pub fn decode_frame(data: &str) -> Result<RgbaImage> {
    let jpeg = BASE64.decode(data).context("frame payload is not base64")?;
    let image = image::load_from_memory(&jpeg).context("frame payload is not a decodable image")?;
    Ok(image.to_rgba8())
}

/// Renders decoded frames into a sink, one decode task per frame.
pub struct Renderer<S: FrameSink + 'static> {
    sink: Arc<Mutex<S>>,
    decoded_tx: mpsc::UnboundedSender<RgbaImage>,
    draw_task: JoinHandle<()>,
}

impl<S: FrameSink + 'static> Renderer<S> {
    pub fn new(sink: S) -> Self {
        let sink = Arc::new(Mutex::new(sink));
        let (decoded_tx, mut decoded_rx) = mpsc::unbounded_channel::<RgbaImage>();

        let draw_sink = sink.clone();
        let draw_task = tokio::spawn(async move {
            while let Some(frame) = decoded_rx.recv().await {
                let mut sink = draw_sink.lock().unwrap_or_else(|e| e.into_inner());
                // Reallocate the surface only when the incoming frame's
                // native dimensions differ from the current surface.
                if sink.size() != (frame.width(), frame.height()) {
                    sink.resize(frame.width(), frame.height());
                }
                sink.draw(&frame);
            }
        });

        Self {
            sink,
            decoded_tx,
            draw_task,
        }
    }

    /// Route one raw video-channel message. Frame payloads decode off the
    /// reactor and draw when ready; non-frame types take non-rendering
    /// paths; malformed input is logged and swallowed.
    pub fn handle_message(&self, raw: &str) {
        let message: VideoMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring unparseable video message: {e}");
                return;
            }
        };
        match message {
            VideoMessage::Frame { data, .. } => {
                let tx = self.decoded_tx.clone();
                tokio::task::spawn_blocking(move || match decode_frame(&data) {
                    Ok(frame) => {
                        let _ = tx.send(frame);
                    }
                    Err(e) => debug!("Dropping undecodable frame: {e:#}"),
                });
            }
            VideoMessage::Connected { session_id } => {
                info!(?session_id, "Video channel handshake acknowledged");
            }
            VideoMessage::Error { message } => {
                warn!("Video channel error from server: {message}");
            }
            other => debug!(?other, "Ignoring non-frame video message"),
        }
    }

    /// Run a closure against the sink (observability for the UI layer
    /// and tests).
    pub fn with_sink<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        f(&sink)
    }
}

impl<S: FrameSink + 'static> Drop for Renderer<S> {
    fn drop(&mut self) {
        self.draw_task.abort();
    }
}

/// Viewer-side video channel client: connects, feeds the renderer, and
/// reconnects through the supervisor on closure.
pub struct Viewer<S: FrameSink + 'static> {
    url: Url,
    renderer: Renderer<S>,
    supervisor: Supervisor,
}

impl<S: FrameSink + 'static> Viewer<S> {
    pub fn new(url: Url, sink: S, supervisor: Supervisor) -> Self {
        Self {
            url,
            renderer: Renderer::new(sink),
            supervisor,
        }
    }

    pub fn renderer(&self) -> &Renderer<S> {
        &self.renderer
    }

    pub async fn run(self) -> Result<()> {
        loop {
            match self.connect_and_render().await {
                Ok(()) => info!("Video socket closed by server"),
                Err(e) => warn!("Video socket error: {e:#}"),
            }
            if !self.supervisor.wait_retry().await {
                info!("Viewer shut down");
                return Ok(());
            }
            info!("Reconnecting video socket");
        }
    }

    async fn connect_and_render(&self) -> Result<()> {
        let cancel = self.supervisor.cancel_token();

        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .context("video socket connect failed")?;
        info!(url = %self.url, "Video socket connected (viewer)");

        let (_write, mut read) = ws.split();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.renderer.handle_message(&text),
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("video socket read failed"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConfig, CameraSource, TestPatternCamera};
    use crate::producer::encode_frame;
    use std::time::Duration;

    fn frame_message(width: u32, height: u32) -> String {
        let mut camera = TestPatternCamera::new();
        camera
            .open(&CameraConfig {
                ideal_width: width,
                ideal_height: height,
                ..CameraConfig::default()
            })
            .unwrap();
        let frame = camera.grab().unwrap();
        let data = encode_frame(&frame, 70).unwrap();
        serde_json::to_string(&VideoMessage::frame(data, frame.timestamp_ms)).unwrap()
    }

    async fn wait_for_draws(renderer: &Renderer<SurfaceBuffer>, expected: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while renderer.with_sink(|s| s.frames_drawn) < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for draws");
    }

    #[tokio::test]
    async fn test_frame_decoded_and_drawn() {
        let renderer = Renderer::new(SurfaceBuffer::new());
        renderer.handle_message(&frame_message(32, 24));
        wait_for_draws(&renderer, 1).await;
        assert_eq!(renderer.with_sink(|s| s.size()), (32, 24));
        assert!(renderer.with_sink(|s| s.last_frame.is_some()));
    }

    #[tokio::test]
    async fn test_surface_resized_only_on_dimension_change() {
        let renderer = Renderer::new(SurfaceBuffer::new());

        renderer.handle_message(&frame_message(32, 24));
        wait_for_draws(&renderer, 1).await;
        renderer.handle_message(&frame_message(32, 24));
        wait_for_draws(&renderer, 2).await;
        assert_eq!(
            renderer.with_sink(|s| s.resize_count),
            1,
            "same dimensions must not trigger a resize"
        );

        renderer.handle_message(&frame_message(64, 48));
        wait_for_draws(&renderer, 3).await;
        assert_eq!(renderer.with_sink(|s| s.resize_count), 2);
        assert_eq!(renderer.with_sink(|s| s.size()), (64, 48));
    }

    #[tokio::test]
    async fn test_malformed_messages_are_swallowed() {
        let renderer = Renderer::new(SurfaceBuffer::new());

        renderer.handle_message("garbage {{{");
        renderer.handle_message(r#"{"type":"frame","data":"!!!not-base64!!!"}"#);
        renderer.handle_message(r#"{"type":"frame","data":"QUJD"}"#); // base64 but not a JPEG

        // Give the decode tasks time to fail.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(renderer.with_sink(|s| s.frames_drawn), 0);
    }

    #[tokio::test]
    async fn test_non_frame_messages_do_not_render() {
        let renderer = Renderer::new(SurfaceBuffer::new());

        renderer.handle_message(r#"{"type":"connected","session_id":"s-1"}"#);
        renderer.handle_message(r#"{"type":"registered","role":"producer"}"#);
        renderer.handle_message(r#"{"type":"error","message":"camera offline"}"#);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(renderer.with_sink(|s| s.frames_drawn), 0);
    }
}
