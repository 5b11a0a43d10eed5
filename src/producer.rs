/*!
 * Capture Loop / Frame Producer
 *
 * The mobile-side pipeline: acquire the camera, register on the video
 * socket as a producer, then push JPEG frames at a fixed period.
 * Transmission is fire-and-forget: no acks, no retries, no queueing.
 * Frame loss under a slow link is accepted; recency beats completeness.
 */

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::camera::{CameraConfig, CameraFrame, CameraSource};
use crate::config::{FRAME_INTERVAL, JPEG_QUALITY};
use crate::protocol::VideoMessage;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Producer connection lifecycle. Strictly ordered; no state is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Initializing,
    Connecting,
    Connected,
    Streaming,
    Disconnected,
    Error(String),
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Initializing => f.write_str("initializing"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Streaming => f.write_str("streaming"),
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Capture pipeline counters, in the spirit of a streaming stats block.
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub frames_encoded: u64,
    pub frames_transmitted: u64,
    pub frames_dropped: u64,
    pub uptime_secs: u64,
}

#[derive(Default)]
struct StatsCells {
    captured: AtomicU64,
    encoded: AtomicU64,
    transmitted: AtomicU64,
    dropped: AtomicU64,
}

/// JPEG-encode a raw RGB frame and return the base64 payload, with no
/// data-URI prefix. Synchronous raster-to-bytes; a frame mid-encode when
/// streaming stops will still send once.
pub fn encode_frame(frame: &CameraFrame, quality: u8) -> Result<String> {
    let mut jpeg = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut jpeg), quality);
    encoder
        .encode(&frame.data, frame.width, frame.height, image::ColorType::Rgb8)
        .context("JPEG encode failed")?;
    Ok(BASE64.encode(&jpeg))
}

/// The producer-side capture loop.
pub struct Producer {
    camera: Arc<Mutex<Box<dyn CameraSource>>>,
    camera_config: CameraConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    /// True while the video socket is believed open. Flipped false by the
    /// reader task on closure so the capture timer self-terminates
    /// instead of queueing.
    socket_open: Arc<AtomicBool>,
    streaming: Arc<AtomicBool>,
    /// Bumped on every stop. Each capture task records the generation it
    /// was started under and exits when superseded, so a stale task from
    /// a previous run can never resume after a quick stop/start.
    stream_generation: Arc<AtomicU64>,
    sink: Option<Arc<tokio::sync::Mutex<WsSink>>>,
    reader_task: Option<JoinHandle<()>>,
    stream_task: Option<JoinHandle<()>>,
    stats: Arc<StatsCells>,
    started_at: Instant,
}

impl Producer {
    pub fn new(camera: Box<dyn CameraSource>, camera_config: CameraConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Initializing);
        Self {
            camera: Arc::new(Mutex::new(camera)),
            camera_config,
            state: Arc::new(state),
            socket_open: Arc::new(AtomicBool::new(false)),
            streaming: Arc::new(AtomicBool::new(false)),
            stream_generation: Arc::new(AtomicU64::new(0)),
            sink: None,
            reader_task: None,
            stream_task: None,
            stats: Arc::new(StatsCells::default()),
            started_at: Instant::now(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Observe state transitions reactively (the UI's error/status view).
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.stats.captured.load(Ordering::Relaxed),
            frames_encoded: self.stats.encoded.load(Ordering::Relaxed),
            frames_transmitted: self.stats.transmitted.load(Ordering::Relaxed),
            frames_dropped: self.stats.dropped.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        debug!(state = %next, "Producer state");
        self.state.send_replace(next);
    }

    fn lock_camera(&self) -> std::sync::MutexGuard<'_, Box<dyn CameraSource>> {
        self.camera.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquire the camera with the configured preferences. On failure the
    /// producer enters `Error` with a user-actionable message; the attempt
    /// is terminal until a manual retry.
    pub fn acquire_camera(&mut self) -> bool {
        let result = self.lock_camera().open(&self.camera_config);
        match result {
            Ok(()) => {
                let dims = self.lock_camera().dimensions();
                info!(?dims, facing = ?self.camera_config.facing, "Camera acquired");
                true
            }
            Err(e) => {
                warn!("Camera acquisition failed: {e}");
                self.set_state(ConnectionState::Error(e.user_message()));
                false
            }
        }
    }

    /// Open the video socket and complete the producer registration
    /// handshake. Requires a live camera; transport failures leave the
    /// producer `Disconnected` so the caller's supervisor can retry.
    pub async fn connect(&mut self, url: &Url) -> Result<()> {
        if !self.lock_camera().is_open() {
            // Precondition race between UI affordances and camera state.
            debug!("connect ignored: camera not acquired");
            return Ok(());
        }
        self.set_state(ConnectionState::Connecting);

        let (ws, _response) = match connect_async(url.as_str()).await {
            Ok(ok) => ok,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e).context("video socket connect failed");
            }
        };
        info!(url = %url, "Video socket connected, registering producer");

        let (mut sink, mut stream) = ws.split();
        let register = serde_json::to_string(&VideoMessage::register_producer())
            .context("serialize registration")?;
        if let Err(e) = sink.send(Message::Text(register)).await {
            self.set_state(ConnectionState::Disconnected);
            return Err(e).context("producer registration send failed");
        }

        // Remain in Connecting until the server acknowledges registration.
        match Self::await_registration(&mut stream).await {
            Ok(()) => {}
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        }

        self.socket_open.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        info!("Producer registered");

        self.sink = Some(Arc::new(tokio::sync::Mutex::new(sink)));
        self.reader_task = Some(self.spawn_reader_task(stream));
        Ok(())
    }

    async fn await_registration(stream: &mut WsStream) -> Result<()> {
        while let Some(msg) = stream.next().await {
            match msg.context("video socket read failed during registration")? {
                Message::Text(text) => match serde_json::from_str::<VideoMessage>(&text) {
                    Ok(VideoMessage::Registered { role }) => {
                        debug!(role = %role, "Registration acknowledged");
                        return Ok(());
                    }
                    Ok(VideoMessage::Error { message }) => {
                        anyhow::bail!("server rejected registration: {message}");
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Ignoring unparseable message during registration: {e}"),
                },
                Message::Close(_) => anyhow::bail!("socket closed during registration"),
                _ => {}
            }
        }
        anyhow::bail!("socket ended during registration")
    }

    fn spawn_reader_task(&self, mut stream: WsStream) -> JoinHandle<()> {
        let socket_open = self.socket_open.clone();
        let streaming = self.streaming.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<VideoMessage>(&text) {
                            Ok(VideoMessage::Error { message }) => {
                                warn!("Video channel error from server: {message}");
                            }
                            Ok(_) => {}
                            Err(e) => debug!("Ignoring unparseable video message: {e}"),
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            socket_open.store(false, Ordering::SeqCst);
            streaming.store(false, Ordering::SeqCst);
            state.send_if_modified(|current| {
                if matches!(
                    current,
                    ConnectionState::Connected | ConnectionState::Streaming
                ) {
                    *current = ConnectionState::Disconnected;
                    true
                } else {
                    false
                }
            });
            info!("Video socket closed");
        })
    }

    /// Begin the fixed-period capture timer. Accepted only from
    /// `Connected` or `Streaming`; anywhere else this is a silent no-op
    /// (an expected race between UI affordances and async socket state).
    pub fn start_streaming(&mut self) {
        match self.state() {
            ConnectionState::Connected | ConnectionState::Streaming => {}
            other => {
                debug!(state = %other, "start_streaming ignored");
                return;
            }
        }
        if self.streaming.swap(true, Ordering::SeqCst) {
            return;
        }

        // Latch the camera's current native dimensions as the encode
        // resolution for this streaming run.
        let dims = self.lock_camera().dimensions();
        let Some((width, height)) = dims else {
            self.streaming.store(false, Ordering::SeqCst);
            debug!("start_streaming ignored: camera not acquired");
            return;
        };
        let Some(sink) = self.sink.clone() else {
            self.streaming.store(false, Ordering::SeqCst);
            debug!("start_streaming ignored: no socket");
            return;
        };

        info!(width, height, "Streaming started");
        self.set_state(ConnectionState::Streaming);

        let camera = self.camera.clone();
        let streaming = self.streaming.clone();
        let socket_open = self.socket_open.clone();
        let stats = self.stats.clone();
        let generation = self.stream_generation.clone();
        let run = generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.stream_task = Some(tokio::spawn(async move {
            let mut ticker = interval(FRAME_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                // A later stop/start supersedes this run; a newer task
                // owns the timer now.
                if generation.load(Ordering::SeqCst) != run {
                    break;
                }
                if !streaming.load(Ordering::SeqCst) {
                    break;
                }
                // Socket gone: self-terminate rather than queue frames.
                if !socket_open.load(Ordering::SeqCst) {
                    streaming.store(false, Ordering::SeqCst);
                    debug!("Capture timer stopping: socket not open");
                    break;
                }

                let grabbed = {
                    let mut camera = camera.lock().unwrap_or_else(|e| e.into_inner());
                    camera.grab()
                };
                let frame = match grabbed {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Frame grab failed: {e}");
                        stats.dropped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                };
                stats.captured.fetch_add(1, Ordering::Relaxed);

                // The encode resolution is latched per streaming run; a
                // frame at any other size is dropped, not rescaled.
                if (frame.width, frame.height) != (width, height) {
                    warn!(
                        got_width = frame.width,
                        got_height = frame.height,
                        width,
                        height,
                        "Dropping frame off the latched resolution"
                    );
                    stats.dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let data = match encode_frame(&frame, JPEG_QUALITY) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("Frame encode failed: {e:#}");
                        stats.dropped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                };
                stats.encoded.fetch_add(1, Ordering::Relaxed);

                let message = VideoMessage::frame(data, frame.timestamp_ms);
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Frame serialize failed: {e}");
                        stats.dropped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                };

                // Fire-and-forget: a failed send means the socket died;
                // stop the timer instead of retrying or queueing.
                let sent = sink.lock().await.send(Message::Text(text)).await;
                if sent.is_err() {
                    socket_open.store(false, Ordering::SeqCst);
                    streaming.store(false, Ordering::SeqCst);
                    break;
                }
                stats.transmitted.fetch_add(1, Ordering::Relaxed);
            }
            debug!("Capture timer stopped");
        }));
    }

    /// Stop the capture timer. Synchronous cancellation: the flag flips
    /// immediately; a frame already past the tick check still sends once.
    pub fn stop_streaming(&mut self) {
        if !self.streaming.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stream_generation.fetch_add(1, Ordering::SeqCst);
        self.stream_task.take();
        if self.state() == ConnectionState::Streaming {
            self.set_state(ConnectionState::Connected);
        }
        info!("Streaming stopped");
    }

    /// Flip the camera facing mode. Stops streaming, fully releases the
    /// current acquisition, then re-acquires; two live acquisitions never
    /// coexist.
    pub fn switch_facing(&mut self) -> bool {
        self.stop_streaming();
        self.camera_config.facing = self.camera_config.facing.flipped();

        let result = {
            let mut camera = self.lock_camera();
            camera.release();
            camera.open(&self.camera_config)
        };
        match result {
            Ok(()) => {
                info!(facing = ?self.camera_config.facing, "Camera facing switched");
                true
            }
            Err(e) => {
                warn!("Camera re-acquisition failed: {e}");
                self.set_state(ConnectionState::Error(e.user_message()));
                false
            }
        }
    }

    /// Unconditional disposal: stops the capture timer, releases all
    /// camera resources, and closes the socket without waiting for the
    /// close handshake. Idempotent and safe from any state.
    pub async fn teardown(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
        self.stream_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }

        self.lock_camera().release();

        self.socket_open.store(false, Ordering::SeqCst);
        if let Some(sink) = self.sink.take() {
            // Issue the close; the handshake completing is not awaited.
            let _ = sink.lock().await.send(Message::Close(None)).await;
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }

        if !matches!(self.state(), ConnectionState::Error(_)) {
            self.set_state(ConnectionState::Disconnected);
        }
        info!("Producer torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraError, TestPatternCamera};

    fn test_camera() -> (Box<dyn CameraSource>, CameraConfig) {
        let config = CameraConfig {
            ideal_width: 64,
            ideal_height: 48,
            ..CameraConfig::default()
        };
        (Box::new(TestPatternCamera::new()), config)
    }

    #[test]
    fn test_encode_frame_is_plain_base64_jpeg() {
        let mut camera = TestPatternCamera::new();
        camera
            .open(&CameraConfig {
                ideal_width: 32,
                ideal_height: 24,
                ..CameraConfig::default()
            })
            .unwrap();
        let frame = camera.grab().unwrap();

        let data = encode_frame(&frame, JPEG_QUALITY).unwrap();
        assert!(!data.starts_with("data:"), "payload must not carry a data-URI prefix");

        let jpeg = BASE64.decode(&data).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 24);
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (camera, config) = test_camera();
        let producer = Producer::new(camera, config);
        assert_eq!(producer.state(), ConnectionState::Initializing);
        assert_eq!(producer.stats().frames_captured, 0);
    }

    #[tokio::test]
    async fn test_start_streaming_requires_connected() {
        let (camera, config) = test_camera();
        let mut producer = Producer::new(camera, config);
        producer.acquire_camera();

        // Not connected: silent no-op, state unchanged.
        producer.start_streaming();
        assert_eq!(producer.state(), ConnectionState::Initializing);
        assert!(producer.stream_task.is_none());
    }

    #[tokio::test]
    async fn test_camera_denial_maps_to_error_state() {
        let mut camera = TestPatternCamera::new();
        camera.fail_next_open("NotAllowedError: Permission denied");
        let mut producer = Producer::new(Box::new(camera), CameraConfig::default());

        assert!(!producer.acquire_camera());
        match producer.state() {
            ConnectionState::Error(msg) => {
                assert!(msg.to_lowercase().contains("permission denied"));
            }
            other => panic!("expected error state, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_facing_switch_releases_before_reacquire() {
        let (camera, config) = test_camera();
        let mut producer = Producer::new(camera, config);
        assert!(producer.acquire_camera());
        assert_eq!(producer.camera_config.facing, crate::camera::FacingMode::Environment);

        assert!(producer.switch_facing());
        assert_eq!(producer.camera_config.facing, crate::camera::FacingMode::User);
        // One live acquisition, never two.
        let camera = producer.lock_camera();
        assert!(camera.is_open());
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent_and_releases_everything() {
        let (camera, config) = test_camera();
        let mut producer = Producer::new(camera, config);
        producer.acquire_camera();

        producer.teardown().await;
        assert!(!producer.lock_camera().is_open());
        assert_eq!(producer.state(), ConnectionState::Disconnected);

        // Second teardown from the torn-down state is safe.
        producer.teardown().await;
        assert_eq!(producer.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_teardown_preserves_error_state() {
        let mut camera = TestPatternCamera::new();
        camera.fail_next_open("permission denied");
        let mut producer = Producer::new(Box::new(camera), CameraConfig::default());
        producer.acquire_camera();

        producer.teardown().await;
        assert!(matches!(producer.state(), ConnectionState::Error(_)));
    }

    /// End-to-end over a local socket: registration handshake, frame
    /// delivery, and clean teardown.
    #[tokio::test]
    async fn test_register_and_stream_against_local_server() {
        use tokio::net::TcpListener;
        use tokio_tungstenite::accept_async;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            // Expect the registration message first.
            let first = ws.next().await.unwrap().unwrap();
            let register: VideoMessage =
                serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert!(matches!(
                register,
                VideoMessage::RegisterProducer { ref device } if device == "mobile"
            ));
            ws.send(Message::Text(
                serde_json::to_string(&VideoMessage::Registered {
                    role: "producer".to_string(),
                })
                .unwrap(),
            ))
            .await
            .unwrap();

            // Collect frames until the client closes.
            let mut frames = 0u32;
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        if let Ok(VideoMessage::Frame { data, timestamp_ms }) =
                            serde_json::from_str(&text)
                        {
                            assert!(timestamp_ms.is_some());
                            assert!(BASE64.decode(&data).is_ok());
                            frames += 1;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frames
        });

        let (camera, config) = test_camera();
        let mut producer = Producer::new(camera, config);
        assert!(producer.acquire_camera());

        let url = Url::parse(&format!("ws://{addr}")).unwrap();
        producer.connect(&url).await.unwrap();
        assert_eq!(producer.state(), ConnectionState::Connected);

        producer.start_streaming();
        assert_eq!(producer.state(), ConnectionState::Streaming);

        // Let a few frame periods elapse.
        tokio::time::sleep(FRAME_INTERVAL * 5).await;
        producer.stop_streaming();
        assert_eq!(producer.state(), ConnectionState::Connected);

        producer.teardown().await;
        assert!(!producer.lock_camera().is_open());

        let frames = server.await.unwrap();
        assert!(frames >= 2, "expected at least 2 frames, got {frames}");
        assert!(producer.stats().frames_transmitted >= 2);
    }

    /// A quick stop/start must supersede the previous run's timer; only
    /// one fixed-period capture loop may ever feed the socket.
    #[tokio::test]
    async fn test_stop_then_restart_keeps_single_capture_loop() {
        use tokio::net::TcpListener;
        use tokio_tungstenite::accept_async;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let _register = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(
                serde_json::to_string(&VideoMessage::Registered {
                    role: "producer".to_string(),
                })
                .unwrap(),
            ))
            .await
            .unwrap();

            let mut frames = 0u32;
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        if matches!(
                            serde_json::from_str::<VideoMessage>(&text),
                            Ok(VideoMessage::Frame { .. })
                        ) {
                            frames += 1;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frames
        });

        let (camera, config) = test_camera();
        let mut producer = Producer::new(camera, config);
        assert!(producer.acquire_camera());

        let url = Url::parse(&format!("ws://{addr}")).unwrap();
        producer.connect(&url).await.unwrap();

        producer.start_streaming();
        producer.stop_streaming();
        producer.start_streaming();
        assert_eq!(producer.state(), ConnectionState::Streaming);

        tokio::time::sleep(FRAME_INTERVAL * 10).await;
        producer.teardown().await;

        let frames = server.await.unwrap();
        assert!(frames >= 2, "expected frames after the restart, got {frames}");
        assert!(
            frames <= 12,
            "more frames than one fixed-period timer can produce: {frames}"
        );
    }

    /// Camera whose native size shifts mid-run: the first two grabs are
    /// 32x24, the rest 16x12.
    struct ShiftingCamera {
        open: bool,
        grabs: u64,
    }

    impl CameraSource for ShiftingCamera {
        fn open(&mut self, _config: &CameraConfig) -> Result<(), CameraError> {
            self.open = true;
            self.grabs = 0;
            Ok(())
        }

        fn grab(&mut self) -> Result<CameraFrame, CameraError> {
            let (w, h) = if self.grabs < 2 { (32, 24) } else { (16, 12) };
            self.grabs += 1;
            Ok(CameraFrame {
                data: vec![0; (w * h * 3) as usize],
                width: w,
                height: h,
                timestamp_ms: self.grabs as i64,
                sequence: self.grabs,
            })
        }

        fn dimensions(&self) -> Option<(u32, u32)> {
            self.open.then_some((32, 24))
        }

        fn release(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    #[tokio::test]
    async fn test_frames_off_the_latched_resolution_are_dropped() {
        use tokio::net::TcpListener;
        use tokio_tungstenite::accept_async;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let _register = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(
                serde_json::to_string(&VideoMessage::Registered {
                    role: "producer".to_string(),
                })
                .unwrap(),
            ))
            .await
            .unwrap();

            let mut frames = 0u32;
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        if let Ok(VideoMessage::Frame { data, .. }) =
                            serde_json::from_str::<VideoMessage>(&text)
                        {
                            let jpeg = BASE64.decode(&data).unwrap();
                            let image = image::load_from_memory(&jpeg).unwrap();
                            // Every transmitted frame is at the latched size.
                            assert_eq!((image.width(), image.height()), (32, 24));
                            frames += 1;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frames
        });

        let camera = ShiftingCamera {
            open: false,
            grabs: 0,
        };
        let mut producer = Producer::new(Box::new(camera), CameraConfig::default());
        assert!(producer.acquire_camera());

        let url = Url::parse(&format!("ws://{addr}")).unwrap();
        producer.connect(&url).await.unwrap();
        producer.start_streaming();

        tokio::time::sleep(FRAME_INTERVAL * 6).await;
        producer.teardown().await;

        let frames = server.await.unwrap();
        assert!(frames >= 1, "expected at least one latched-size frame");
        let stats = producer.stats();
        assert!(stats.frames_transmitted <= 2, "only latched-size frames may send");
        assert!(stats.frames_dropped >= 1, "off-size frames must be dropped");
    }
}
