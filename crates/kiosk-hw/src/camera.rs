//! V4L2 camera capture via the `v4l` crate.
//!
//! The device is opened on `start()` and closed on `stop()`, so the camera
//! is only held for the duration of a recognition session.

use crate::frame;
use kiosk_core::{CameraError, Frame, FrameSource};
use std::path::Path;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Share of near-black pixels above which a frame is flagged dark.
const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 32-bit B, G, R, X (what CSI camera stacks usually expose).
    Xrgb,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(PixelFormat::Grey)
        } else if fourcc == FourCC::new(b"XR24") {
            Some(PixelFormat::Xrgb)
        } else {
            None
        }
    }
}

/// An opened, format-negotiated device.
struct OpenCamera {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl OpenCamera {
    fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, GREY, or XR24)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "camera started"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        })
    }

    fn capture(&self) -> Result<Frame, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let gray = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height),
            PixelFormat::Grey => frame::grey_to_grayscale(buf, self.width, self.height),
            PixelFormat::Xrgb => frame::xrgb_to_grayscale(buf, self.width, self.height),
        }
        .map_err(|e| CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", self.pixel_format)))?;

        let is_dark = frame::is_dark_frame(&gray, DARK_FRAME_THRESHOLD);

        Ok(Frame {
            data: gray,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
            is_dark,
        })
    }
}

/// V4L2 camera that is only open between `start()` and `stop()`.
pub struct V4lCamera {
    device_path: String,
    width: u32,
    height: u32,
    /// Frames discarded after opening, for auto-exposure to settle.
    warmup_frames: usize,
    open: Option<OpenCamera>,
}

impl V4lCamera {
    pub fn new(device_path: &str, width: u32, height: u32, warmup_frames: usize) -> Self {
        Self {
            device_path: device_path.to_string(),
            width,
            height,
            warmup_frames,
            open: None,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn is_started(&self) -> bool {
        self.open.is_some()
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl FrameSource for V4lCamera {
    fn start(&mut self) -> Result<(), CameraError> {
        if self.open.is_some() {
            return Ok(());
        }
        let camera = OpenCamera::open(&self.device_path, self.width, self.height)?;
        if self.warmup_frames > 0 {
            tracing::debug!(count = self.warmup_frames, "discarding warmup frames");
            for _ in 0..self.warmup_frames {
                let _ = camera.capture();
            }
        }
        self.open = Some(camera);
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        self.open.as_ref().ok_or(CameraError::NotStarted)?.capture()
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        if self.open.take().is_some() {
            tracing::info!(device = %self.device_path, "camera stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent_without_start() {
        let mut camera = V4lCamera::new("/dev/video-does-not-exist", 640, 480, 0);
        assert!(camera.stop().is_ok());
        assert!(camera.stop().is_ok());
        assert!(!camera.is_started());
    }

    #[test]
    fn test_start_missing_device_fails_cleanly() {
        let mut camera = V4lCamera::new("/dev/video-does-not-exist", 640, 480, 0);
        assert!(matches!(camera.start(), Err(CameraError::DeviceNotFound(_))));
        assert!(!camera.is_started());
        assert!(camera.stop().is_ok());
    }

    #[test]
    fn test_capture_before_start() {
        let mut camera = V4lCamera::new("/dev/video-does-not-exist", 640, 480, 0);
        assert!(matches!(camera.capture_frame(), Err(CameraError::NotStarted)));
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"XR24")), Some(PixelFormat::Xrgb));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }
}
