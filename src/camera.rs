/*!
 * Camera Acquisition
 *
 * Abstraction over the producer device's camera. Backends implement
 * `CameraSource`; the crate ships a synthetic test-pattern backend used
 * by the default factory and by tests. Acquisition failures carry a
 * differentiated taxonomy so the caller can surface actionable
 * remediation instead of a generic failure.
 */

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Which camera to prefer on a multi-camera device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Rear camera, pointed at the table.
    #[default]
    Environment,
    /// Front camera.
    User,
}

impl FacingMode {
    pub fn flipped(self) -> Self {
        match self {
            FacingMode::Environment => FacingMode::User,
            FacingMode::User => FacingMode::Environment,
        }
    }
}

/// Camera acquisition parameters.
///
/// The resolution envelope is a preference, not a demand: backends may
/// deliver anything up to the cap. Audio is never requested.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub facing: FacingMode,
    /// Ideal capture width/height.
    pub ideal_width: u32,
    pub ideal_height: u32,
    /// Hard cap on capture resolution.
    pub max_width: u32,
    pub max_height: u32,
    /// Ideal capture rate in frames per second.
    pub ideal_fps: u32,
    /// Hard cap on capture rate.
    pub max_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
            max_width: 1920,
            max_height: 1080,
            ideal_fps: 15,
            max_fps: 30,
        }
    }
}

/// Camera failure taxonomy. Terminal for the current acquisition attempt;
/// the caller surfaces `user_message()` and waits for a manual retry.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera acquisition aborted: {0}")]
    Aborted(String),
    #[error("camera unavailable outside a secure context: {0}")]
    InsecureContext(String),
    #[error("camera error: {0}")]
    Other(String),
}

impl CameraError {
    /// Classify a raw platform failure by its message text. Platform
    /// camera stacks report failures as strings ("NotAllowedError:
    /// Permission denied", "AbortError", ...), so classification keys off
    /// substrings.
    pub fn classify(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("denied") || lower.contains("notallowed") || lower.contains("permission")
        {
            CameraError::PermissionDenied(raw.to_string())
        } else if lower.contains("abort") || lower.contains("blocked") {
            CameraError::Aborted(raw.to_string())
        } else if lower.contains("secure") || lower.contains("https") {
            CameraError::InsecureContext(raw.to_string())
        } else {
            CameraError::Other(raw.to_string())
        }
    }

    /// User-facing message with remediation guidance, differentiated per
    /// failure class.
    pub fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied(_) => {
                "Camera permission denied. Enable camera access for this app in your \
                 device settings, then reload."
                    .to_string()
            }
            CameraError::Aborted(_) => {
                "Camera access was aborted or blocked by another application. Close \
                 other apps using the camera and try again."
                    .to_string()
            }
            CameraError::InsecureContext(_) => {
                "Camera access requires a secure (HTTPS) connection. Open the app \
                 over HTTPS or through the relay endpoint."
                    .to_string()
            }
            CameraError::Other(raw) => format!("Could not access the camera: {raw}"),
        }
    }
}

/// A raw RGB frame grabbed from a camera backend.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Tightly packed RGB8 pixel data.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Milliseconds since epoch at grab time.
    pub timestamp_ms: i64,
    /// Grab sequence number within this acquisition.
    pub sequence: u64,
}

impl CameraFrame {
    pub fn is_valid(&self) -> bool {
        self.data.len() == (self.width * self.height * 3) as usize
    }
}

/// Camera backend seam.
///
/// Exclusive ownership: a backend must be fully released before any
/// re-acquisition; two live acquisitions must never coexist.
pub trait CameraSource: Send {
    /// Acquire the camera with the given preferences.
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError>;

    /// Grab the next frame. Only valid while open.
    fn grab(&mut self) -> Result<CameraFrame, CameraError>;

    /// Native pixel dimensions of the live stream, if open.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Release all camera resources. Must be idempotent.
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

/// Synthetic camera producing a moving gradient pattern. Stands in for a
/// real device backend; also exercised heavily by tests.
pub struct TestPatternCamera {
    open: bool,
    width: u32,
    height: u32,
    sequence: u64,
    /// Counts concurrently open acquisitions across open/release cycles;
    /// must never exceed 1.
    acquisitions: u32,
    /// When set, `open` fails with this raw platform message.
    fail_with: Option<String>,
}

impl TestPatternCamera {
    pub fn new() -> Self {
        Self {
            open: false,
            width: 0,
            height: 0,
            sequence: 0,
            acquisitions: 0,
            fail_with: None,
        }
    }

    /// Configure the next `open` call to fail with a raw platform message.
    pub fn fail_next_open(&mut self, raw: impl Into<String>) {
        self.fail_with = Some(raw.into());
    }

    pub fn concurrent_acquisitions(&self) -> u32 {
        self.acquisitions
    }
}

impl Default for TestPatternCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraSource for TestPatternCamera {
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        if let Some(raw) = self.fail_with.take() {
            return Err(CameraError::classify(&raw));
        }
        // Honor the envelope: deliver the ideal resolution, clamped to the cap.
        self.width = config.ideal_width.min(config.max_width);
        self.height = config.ideal_height.min(config.max_height);
        self.open = true;
        self.sequence = 0;
        self.acquisitions += 1;
        Ok(())
    }

    fn grab(&mut self) -> Result<CameraFrame, CameraError> {
        if !self.open {
            return Err(CameraError::Other("camera not open".to_string()));
        }
        let (w, h) = (self.width, self.height);
        let phase = (self.sequence % 255) as u8;
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.push((x % 256) as u8 ^ phase);
                data.push((y % 256) as u8);
                data.push(phase);
            }
        }
        let frame = CameraFrame {
            data,
            width: w,
            height: h,
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0),
            sequence: self.sequence,
        };
        self.sequence += 1;
        Ok(frame)
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.open.then_some((self.width, self.height))
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.acquisitions -= 1;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Create the default camera backend.
pub fn create_camera() -> Box<dyn CameraSource> {
    Box::new(TestPatternCamera::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CameraConfig::default();
        assert_eq!(config.ideal_width, 1280);
        assert_eq!(config.ideal_height, 720);
        assert_eq!(config.max_width, 1920);
        assert_eq!(config.max_height, 1080);
        assert_eq!(config.ideal_fps, 15);
        assert_eq!(config.max_fps, 30);
        assert_eq!(config.facing, FacingMode::Environment);
    }

    #[test]
    fn test_facing_mode_flip() {
        assert_eq!(FacingMode::Environment.flipped(), FacingMode::User);
        assert_eq!(FacingMode::User.flipped(), FacingMode::Environment);
    }

    #[test]
    fn test_classify_permission_denied() {
        let err = CameraError::classify("NotAllowedError: Permission denied by user");
        assert!(matches!(err, CameraError::PermissionDenied(_)));
        assert!(err.user_message().to_lowercase().contains("permission denied"));
    }

    #[test]
    fn test_classify_aborted_and_insecure() {
        assert!(matches!(
            CameraError::classify("AbortError: device busy"),
            CameraError::Aborted(_)
        ));
        assert!(matches!(
            CameraError::classify("getUserMedia requires a secure origin"),
            CameraError::InsecureContext(_)
        ));
        assert!(matches!(
            CameraError::classify("something exploded"),
            CameraError::Other(_)
        ));
    }

    #[test]
    fn test_test_pattern_open_grab_release() {
        let mut cam = TestPatternCamera::new();
        cam.open(&CameraConfig::default()).unwrap();
        assert!(cam.is_open());
        assert_eq!(cam.dimensions(), Some((1280, 720)));

        let frame = cam.grab().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.sequence, 0);
        assert_eq!(cam.grab().unwrap().sequence, 1);

        cam.release();
        assert!(!cam.is_open());
        assert!(cam.grab().is_err());
        // Release is idempotent.
        cam.release();
        assert_eq!(cam.concurrent_acquisitions(), 0);
    }

    #[test]
    fn test_resolution_clamped_to_cap() {
        let mut cam = TestPatternCamera::new();
        let config = CameraConfig {
            ideal_width: 4096,
            ideal_height: 2160,
            ..CameraConfig::default()
        };
        cam.open(&config).unwrap();
        assert_eq!(cam.dimensions(), Some((1920, 1080)));
    }
}
