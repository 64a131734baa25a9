//! GPIO through the sysfs interface: PIR motion input and relay output.

use kiosk_core::{Actuator, ActuatorError, MotionSensor, SensorError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// How long to wait for udev to create `gpioN/` after an export.
const EXPORT_SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("gpio{pin}: {source}")]
    Io { pin: u32, source: std::io::Error },
    #[error("gpio{0} did not appear after export")]
    NotExported(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// An exported, configured sysfs GPIO line.
#[derive(Debug)]
pub struct GpioPin {
    pin: u32,
    value_path: PathBuf,
}

impl GpioPin {
    /// Export `pin` under `root` if needed and set its direction.
    pub fn open(root: &Path, pin: u32, direction: Direction) -> Result<Self, GpioError> {
        let io = |source: std::io::Error| GpioError::Io { pin, source };
        let dir = root.join(format!("gpio{pin}"));

        if !dir.exists() {
            std::fs::write(root.join("export"), pin.to_string()).map_err(io)?;
            let deadline = Instant::now() + EXPORT_SETTLE;
            while !dir.join("value").exists() {
                if Instant::now() >= deadline {
                    return Err(GpioError::NotExported(pin));
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }

        std::fs::write(dir.join("direction"), direction.as_str()).map_err(io)?;
        tracing::debug!(pin, direction = direction.as_str(), "gpio configured");

        Ok(Self {
            pin,
            value_path: dir.join("value"),
        })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    fn read(&self) -> Result<bool, SensorError> {
        let raw = std::fs::read_to_string(&self.value_path)?;
        match raw.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(SensorError::InvalidValue(other.to_string())),
        }
    }

    fn write(&self, high: bool) -> std::io::Result<()> {
        std::fs::write(&self.value_path, if high { "1" } else { "0" })
    }
}

/// PIR sensor wired to a GPIO input; high means motion.
#[derive(Debug)]
pub struct MotionInput {
    gpio: GpioPin,
}

impl MotionInput {
    pub fn open(root: &Path, pin: u32) -> Result<Self, GpioError> {
        let gpio = GpioPin::open(root, pin, Direction::In)?;
        tracing::info!(pin, "motion sensor ready");
        Ok(Self { gpio })
    }
}

impl MotionSensor for MotionInput {
    fn sample(&mut self) -> Result<bool, SensorError> {
        self.gpio.read()
    }
}

/// Door relay on a GPIO output; high energises the relay.
pub struct RelayOutput {
    gpio: GpioPin,
}

impl RelayOutput {
    /// Open the output and drive it low.
    pub fn open(root: &Path, pin: u32) -> Result<Self, GpioError> {
        let gpio = GpioPin::open(root, pin, Direction::Out)?;
        gpio.write(false).map_err(|source| GpioError::Io { pin, source })?;
        tracing::info!(pin, "relay output ready");
        Ok(Self { gpio })
    }
}

impl Actuator for RelayOutput {
    fn activate(&mut self) -> Result<(), ActuatorError> {
        tracing::debug!(pin = self.gpio.pin(), "relay on");
        Ok(self.gpio.write(true)?)
    }

    fn deactivate(&mut self) -> Result<(), ActuatorError> {
        tracing::debug!(pin = self.gpio.pin(), "relay off");
        Ok(self.gpio.write(false)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A scratch directory laid out like /sys/class/gpio with the given pins exported.
    fn fake_sysfs(tag: &str, pins: &[u32]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("kiosk-gpio-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("export"), "").unwrap();
        for pin in pins {
            let dir = root.join(format!("gpio{pin}"));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("direction"), "in").unwrap();
            std::fs::write(dir.join("value"), "0").unwrap();
        }
        root
    }

    fn read(root: &Path, pin: u32, file: &str) -> String {
        std::fs::read_to_string(root.join(format!("gpio{pin}")).join(file)).unwrap()
    }

    #[test]
    fn test_motion_input_reads_value() {
        let root = fake_sysfs("motion", &[17]);
        let mut sensor = MotionInput::open(&root, 17).unwrap();
        assert_eq!(read(&root, 17, "direction"), "in");

        assert!(!sensor.sample().unwrap());
        std::fs::write(root.join("gpio17/value"), "1\n").unwrap();
        assert!(sensor.sample().unwrap());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_motion_input_rejects_garbage() {
        let root = fake_sysfs("garbage", &[17]);
        let mut sensor = MotionInput::open(&root, 17).unwrap();
        std::fs::write(root.join("gpio17/value"), "x").unwrap();
        assert!(matches!(sensor.sample(), Err(SensorError::InvalidValue(ref v)) if v == "x"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_relay_output_drives_value() {
        let root = fake_sysfs("relay", &[14]);
        std::fs::write(root.join("gpio14/value"), "1").unwrap();

        let mut relay = RelayOutput::open(&root, 14).unwrap();
        assert_eq!(read(&root, 14, "direction"), "out");
        assert_eq!(read(&root, 14, "value"), "0");

        relay.activate().unwrap();
        assert_eq!(read(&root, 14, "value"), "1");
        relay.deactivate().unwrap();
        assert_eq!(read(&root, 14, "value"), "0");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_unexported_pin_requests_export() {
        let root = fake_sysfs("export", &[]);
        let err = MotionInput::open(&root, 22).unwrap_err();

        assert!(matches!(err, GpioError::NotExported(22)));
        assert_eq!(std::fs::read_to_string(root.join("export")).unwrap(), "22");
        let _ = std::fs::remove_dir_all(&root);
    }
}
