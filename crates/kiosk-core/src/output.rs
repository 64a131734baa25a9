//! Presentation and telemetry collaborators: display, relay, attendance log.
//!
//! None of these are correctness-critical. The wrappers here log failures
//! and carry on.

use crate::types::AttendanceEvent;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("display I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("display bus error: {0}")]
    Bus(String),
}

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("actuator I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("log sink I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid log sink URL: {0}")]
    InvalidUrl(String),
    #[error("log sink returned HTTP {0}")]
    Status(u16),
    #[error("malformed log sink response: {0}")]
    BadResponse(String),
}

/// Small character display, e.g. a 16x2 LCD.
pub trait TextDisplay: Send {
    fn columns(&self) -> usize;
    fn show(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError>;
    fn clear(&mut self) -> Result<(), DisplayError>;
}

/// Door strike or relay output.
pub trait Actuator: Send {
    fn activate(&mut self) -> Result<(), ActuatorError>;
    fn deactivate(&mut self) -> Result<(), ActuatorError>;
}

/// Remote attendance log.
pub trait EventSink: Send {
    fn send(&mut self, event: &AttendanceEvent) -> Result<(), SinkError>;
}

/// Display stand-in that writes lines to the log.
pub struct ConsoleDisplay {
    columns: usize,
}

impl ConsoleDisplay {
    pub fn new(columns: usize) -> Self {
        Self { columns }
    }
}

impl TextDisplay for ConsoleDisplay {
    fn columns(&self) -> usize {
        self.columns
    }

    fn show(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError> {
        tracing::info!(target: "lcd", line1, line2, "display");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

/// Actuator stand-in for kiosks without a relay.
pub struct NullActuator;

impl Actuator for NullActuator {
    fn activate(&mut self) -> Result<(), ActuatorError> {
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), ActuatorError> {
        Ok(())
    }
}

/// Truncate to at most `columns` characters.
pub fn truncate(line: &str, columns: usize) -> String {
    line.chars().take(columns).collect()
}

/// Display wrapper that fits lines to the device width and swallows errors.
pub struct Screen {
    display: Box<dyn TextDisplay>,
}

impl Screen {
    pub fn new(display: Box<dyn TextDisplay>) -> Self {
        Self { display }
    }

    pub fn show(&mut self, line1: &str, line2: &str) {
        let columns = self.display.columns();
        let (line1, line2) = (truncate(line1, columns), truncate(line2, columns));
        if let Err(err) = self.display.show(&line1, &line2) {
            tracing::warn!(error = %err, line1 = %line1, line2 = %line2, "display write failed");
        }
    }

    pub fn clear(&mut self) {
        if let Err(err) = self.display.clear() {
            tracing::warn!(error = %err, "display clear failed");
        }
    }
}

/// Fire-and-forget wrapper around an [`Actuator`].
pub struct Relay {
    actuator: Box<dyn Actuator>,
}

impl Relay {
    pub fn new(actuator: Box<dyn Actuator>) -> Self {
        Self { actuator }
    }

    pub fn on(&mut self) {
        if let Err(err) = self.actuator.activate() {
            tracing::warn!(error = %err, "relay activate failed");
        }
    }

    pub fn off(&mut self) {
        if let Err(err) = self.actuator.deactivate() {
            tracing::warn!(error = %err, "relay deactivate failed");
        }
    }
}

/// Best-effort delivery of attendance events.
pub struct AttendanceLog {
    sink: Box<dyn EventSink>,
}

impl AttendanceLog {
    pub fn new(sink: Box<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Send one event. Returns whether it was delivered; failures are only logged.
    pub fn record(&mut self, event: &AttendanceEvent) -> bool {
        match self.sink.send(event) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, name = %event.name, "attendance log delivery failed");
                false
            }
        }
    }
}
