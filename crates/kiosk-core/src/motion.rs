//! Motion gate — debounces the presence sensor into a stable decision.

use crate::signal::ShutdownSignal;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("sensor read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected sensor value: {0:?}")]
    InvalidValue(String),
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}

/// Instantaneous binary presence reading.
pub trait MotionSensor: Send {
    fn sample(&mut self) -> Result<bool, SensorError>;
}

/// Stand-in used when the sensor could not be initialised. Never reports motion.
pub struct NullSensor;

impl MotionSensor for NullSensor {
    fn sample(&mut self) -> Result<bool, SensorError> {
        Ok(false)
    }
}

/// Debounced view of a [`MotionSensor`].
pub struct MotionGate {
    sensor: Box<dyn MotionSensor>,
    debounce_count: usize,
    debounce_interval: Duration,
}

impl MotionGate {
    pub fn new(sensor: Box<dyn MotionSensor>, debounce_count: usize, debounce_interval: Duration) -> Self {
        Self {
            sensor,
            debounce_count: debounce_count.max(1),
            debounce_interval,
        }
    }

    /// Single fresh sample. Sensor errors read as "no motion".
    pub fn read_raw(&mut self) -> bool {
        match self.sensor.sample() {
            Ok(state) => state,
            Err(err) => {
                tracing::debug!(error = %err, "motion sensor read failed; treating as no motion");
                false
            }
        }
    }

    /// `debounce_count` consecutive positive reads, `debounce_interval` apart.
    ///
    /// Stops at the first negative read without taking the remaining samples.
    pub fn debounced(&mut self) -> bool {
        for i in 0..self.debounce_count {
            if i > 0 {
                std::thread::sleep(self.debounce_interval);
            }
            let state = self.read_raw();
            tracing::debug!(read = i + 1, of = self.debounce_count, state, "debounce read");
            if !state {
                return false;
            }
        }
        true
    }

    /// Poll the raw sensor until it reads high, `timeout` elapses, or shutdown is requested.
    ///
    /// Returns whether motion was seen. A timeout is not an error.
    pub fn wait_for_motion(&mut self, timeout: Duration, poll: Duration, shutdown: &ShutdownSignal) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if shutdown.is_triggered() {
                return false;
            }
            if self.read_raw() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(poll.min(deadline - now));
        }
    }
}
