use crate::types::Frame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("camera not started")]
    NotStarted,
}

/// Camera lifecycle as seen by a recognition session.
///
/// `stop()` must be idempotent: calling it twice, or without a successful
/// `start()`, leaves the camera released and does not fail.
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<(), CameraError>;
    fn capture_frame(&mut self) -> Result<Frame, CameraError>;
    fn stop(&mut self) -> Result<(), CameraError>;
}

/// Stop the camera, logging instead of propagating a failure.
pub fn release(camera: &mut dyn FrameSource) {
    if let Err(err) = camera.stop() {
        tracing::warn!(error = %err, "camera stop failed");
    }
}
