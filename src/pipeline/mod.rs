#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod dispatcher;
pub mod recognizer;
#[cfg(feature = "camera-nokhwa")]
pub mod rgba_converter;

use crate::types::Frame;

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraCapture, camera_label};
pub use dispatcher::{FrameDispatcher, RunSummary, run_capture_loop};
pub use recognizer::{FaceDetectorConfig, HandposeConfig, ModelPaths};

/// A blocking source of camera frames. An error means the stream has ended.
pub trait FrameSource {
    fn next_frame(&mut self) -> anyhow::Result<Frame>;
}
