//! kiosk-core — Session state machine for an unattended attendance kiosk.
//!
//! A debounced motion gate starts a bounded recognition session; the best
//! match across the session is turned into an authorization decision whose
//! effects go to a display, a relay and a remote attendance log. Hardware
//! and the face-embedding service are reached only through the collaborator
//! traits defined here.

pub mod aggregate;
pub mod camera;
pub mod decision;
pub mod embedder;
pub mod gallery;
pub mod kiosk;
pub mod motion;
pub mod output;
pub mod session;
pub mod signal;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use camera::{CameraError, FrameSource};
pub use embedder::{EmbedError, FaceEmbedder, SocketEmbedder};
pub use gallery::{EuclideanMatcher, Gallery, GalleryError, Matcher};
pub use kiosk::{Collaborators, Kiosk, KioskError, KioskSettings};
pub use motion::{MotionGate, MotionSensor, NullSensor, SensorError};
pub use output::{
    Actuator, ActuatorError, ConsoleDisplay, EventSink, NullActuator, SinkError, TextDisplay,
    DisplayError,
};
pub use session::{SessionEnd, SessionOutcome, SessionParams};
pub use signal::ShutdownSignal;
pub use types::{
    AttendanceEvent, BestMatch, Embedding, FaceObservation, FaceRegion, Frame, FrameDetection,
    SessionResult, UNKNOWN,
};
