//! kiosk-hw — Linux hardware backends for the kiosk collaborators.
//!
//! V4L2 camera capture, sysfs GPIO for the PIR sensor and door relay,
//! and an HD44780 character LCD on an I2C backpack.

pub mod camera;
pub mod frame;
pub mod gpio;
pub mod lcd;

pub use camera::{DeviceInfo, PixelFormat, V4lCamera};
pub use gpio::{GpioError, MotionInput, RelayOutput, SYSFS_GPIO_ROOT};
pub use lcd::{CharLcd, I2cLcd, LcdError};
