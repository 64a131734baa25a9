use kiosk_core::{KioskSettings, SessionParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon configuration: defaults, then the TOML file named by `KIOSK_CONFIG`,
/// then `KIOSK_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Known-faces file (`{"encodings": [...], "names": [...]}`).
    pub gallery_path: PathBuf,
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Frames discarded after each camera start (AGC/AE settling).
    pub camera_warmup_frames: usize,
    /// Integer downscale factor applied before a frame is sent for embedding.
    pub frame_scale: u32,
    pub embedder_socket: PathBuf,
    pub embedder_timeout_ms: u64,
    pub gpio_root: PathBuf,
    pub motion_pin: u32,
    pub relay_pin: u32,
    pub lcd_bus: String,
    pub lcd_address: u16,
    pub lcd_columns: usize,
    pub lcd_rows: usize,
    pub recognition_duration_secs: u64,
    pub check_interval_secs: u64,
    /// Maximum Euclidean distance accepted as a match.
    pub distance_threshold: f32,
    pub debounce_count: usize,
    pub debounce_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub motion_wait_ms: u64,
    pub idle_pause_ms: u64,
    pub report_pause_ms: u64,
    pub log_url: String,
    pub log_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gallery_path: PathBuf::from("encodings.json"),
            camera_device: "/dev/video0".to_string(),
            camera_width: 1280,
            camera_height: 720,
            camera_warmup_frames: 2,
            frame_scale: 2,
            embedder_socket: PathBuf::from("/run/kiosk/embedder.sock"),
            embedder_timeout_ms: 5000,
            gpio_root: PathBuf::from(kiosk_hw::SYSFS_GPIO_ROOT),
            motion_pin: 17,
            relay_pin: 14,
            lcd_bus: "/dev/i2c-1".to_string(),
            lcd_address: 0x27,
            lcd_columns: 16,
            lcd_rows: 2,
            recognition_duration_secs: 15,
            check_interval_secs: 5,
            distance_threshold: 0.5,
            debounce_count: 3,
            debounce_interval_ms: 120,
            poll_interval_ms: 120,
            motion_wait_ms: 1000,
            idle_pause_ms: 500,
            report_pause_ms: 1000,
            log_url: "http://127.0.0.1:5000/log".to_string(),
            log_timeout_ms: 2000,
        }
    }
}

impl Config {
    /// Load from `KIOSK_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("KIOSK_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `KIOSK_*` overrides. Unparseable values keep the current setting.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let env = Env(&var);
        self.gallery_path = env.path("KIOSK_GALLERY_PATH", &self.gallery_path);
        self.camera_device = env.string("KIOSK_CAMERA_DEVICE", &self.camera_device);
        self.camera_width = env.parse("KIOSK_CAMERA_WIDTH", self.camera_width);
        self.camera_height = env.parse("KIOSK_CAMERA_HEIGHT", self.camera_height);
        self.camera_warmup_frames = env.parse("KIOSK_CAMERA_WARMUP_FRAMES", self.camera_warmup_frames);
        self.frame_scale = env.parse("KIOSK_FRAME_SCALE", self.frame_scale);
        self.embedder_socket = env.path("KIOSK_EMBEDDER_SOCKET", &self.embedder_socket);
        self.embedder_timeout_ms = env.parse("KIOSK_EMBEDDER_TIMEOUT_MS", self.embedder_timeout_ms);
        self.gpio_root = env.path("KIOSK_GPIO_ROOT", &self.gpio_root);
        self.motion_pin = env.parse("KIOSK_MOTION_PIN", self.motion_pin);
        self.relay_pin = env.parse("KIOSK_RELAY_PIN", self.relay_pin);
        self.lcd_bus = env.string("KIOSK_LCD_BUS", &self.lcd_bus);
        self.lcd_address = env.address("KIOSK_LCD_ADDRESS", self.lcd_address);
        self.lcd_columns = env.parse("KIOSK_LCD_COLUMNS", self.lcd_columns);
        self.lcd_rows = env.parse("KIOSK_LCD_ROWS", self.lcd_rows);
        self.recognition_duration_secs =
            env.parse("KIOSK_RECOGNITION_DURATION_SECS", self.recognition_duration_secs);
        self.check_interval_secs = env.parse("KIOSK_CHECK_INTERVAL_SECS", self.check_interval_secs);
        self.distance_threshold = env.parse("KIOSK_DISTANCE_THRESHOLD", self.distance_threshold);
        self.debounce_count = env.parse("KIOSK_DEBOUNCE_COUNT", self.debounce_count);
        self.debounce_interval_ms = env.parse("KIOSK_DEBOUNCE_INTERVAL_MS", self.debounce_interval_ms);
        self.poll_interval_ms = env.parse("KIOSK_POLL_INTERVAL_MS", self.poll_interval_ms);
        self.motion_wait_ms = env.parse("KIOSK_MOTION_WAIT_MS", self.motion_wait_ms);
        self.idle_pause_ms = env.parse("KIOSK_IDLE_PAUSE_MS", self.idle_pause_ms);
        self.report_pause_ms = env.parse("KIOSK_REPORT_PAUSE_MS", self.report_pause_ms);
        self.log_url = env.string("KIOSK_LOG_URL", &self.log_url);
        self.log_timeout_ms = env.parse("KIOSK_LOG_TIMEOUT_MS", self.log_timeout_ms);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.frame_scale == 0 {
            return invalid("frame_scale must be at least 1");
        }
        if self.debounce_count == 0 {
            return invalid("debounce_count must be at least 1");
        }
        if self.lcd_columns == 0 || self.lcd_rows == 0 {
            return invalid("lcd_columns and lcd_rows must be non-zero");
        }
        if !self.distance_threshold.is_finite() || self.distance_threshold < 0.0 {
            return invalid("distance_threshold must be a non-negative number");
        }
        Ok(())
    }

    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            duration: Duration::from_secs(self.recognition_duration_secs),
            check_interval: Duration::from_secs(self.check_interval_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn kiosk_settings(&self) -> KioskSettings {
        KioskSettings {
            session: self.session_params(),
            distance_threshold: self.distance_threshold,
            debounce_count: self.debounce_count,
            debounce_interval: Duration::from_millis(self.debounce_interval_ms),
            motion_wait: Duration::from_millis(self.motion_wait_ms),
            idle_pause: Duration::from_millis(self.idle_pause_ms),
            report_pause: Duration::from_millis(self.report_pause_ms),
        }
    }

    pub fn embedder_timeout(&self) -> Duration {
        Duration::from_millis(self.embedder_timeout_ms)
    }

    pub fn log_timeout(&self) -> Duration {
        Duration::from_millis(self.log_timeout_ms)
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str, current: &str) -> String {
        (self.0)(key).unwrap_or_else(|| current.to_string())
    }

    fn path(&self, key: &str, current: &Path) -> PathBuf {
        (self.0)(key)
            .map(PathBuf::from)
            .unwrap_or_else(|| current.to_path_buf())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, current: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(current)
    }

    /// I2C addresses are usually written in hex.
    fn address(&self, key: &str, current: u16) -> u16 {
        (self.0)(key)
            .and_then(|v| {
                let v = v.trim();
                match v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
                    Some(hex) => u16::from_str_radix(hex, 16).ok(),
                    None => v.parse().ok(),
                }
            })
            .unwrap_or(current)
    }
}
