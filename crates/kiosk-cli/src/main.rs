use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kiosk_core::{FrameSource, Gallery, MotionGate, TextDisplay};
use kiosk_hw::{I2cLcd, MotionInput, V4lCamera, SYSFS_GPIO_ROOT};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kiosk", about = "Attendance kiosk diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the known-faces file and summarize it
    Gallery {
        #[arg(short, long, default_value = "encodings.json")]
        path: PathBuf,
    },
    /// List V4L2 capture devices
    Devices,
    /// Capture one grayscale frame and save it as an image
    Snapshot {
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Output file; the format follows the extension (e.g. .png)
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 720)]
        height: u32,
    },
    /// Run one debounced motion check on the PIR sensor
    Motion {
        #[arg(long, default_value = SYSFS_GPIO_ROOT)]
        gpio_root: PathBuf,
        #[arg(short, long, default_value_t = 17)]
        pin: u32,
        /// Consecutive high reads required
        #[arg(short, long, default_value_t = 3)]
        count: usize,
        #[arg(long, default_value_t = 120)]
        interval_ms: u64,
    },
    /// Write two lines to the character LCD
    Lcd {
        line1: String,
        #[arg(default_value = "")]
        line2: String,
        #[arg(long, default_value = "/dev/i2c-1")]
        bus: String,
        /// I2C address, decimal or 0x-prefixed hex
        #[arg(long, default_value = "0x27", value_parser = parse_address)]
        address: u16,
        #[arg(long, default_value_t = 16)]
        columns: usize,
        #[arg(long, default_value_t = 2)]
        rows: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Gallery { path } => {
            let gallery = Gallery::load(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            let dims = gallery
                .entries()
                .first()
                .map(|e| e.embedding.values.len())
                .unwrap_or(0);
            println!("{}: {} encodings, dimension {dims}", path.display(), gallery.len());
            for (name, count) in gallery.people() {
                println!("  {name:<24} {count}");
            }
        }
        Commands::Devices => {
            let devices = V4lCamera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Snapshot {
            device,
            output,
            width,
            height,
        } => {
            let mut camera = V4lCamera::new(&device, width, height, 2);
            camera
                .start()
                .with_context(|| format!("failed to start {device}"))?;
            let captured = camera.capture_frame();
            let _ = camera.stop();
            let frame = captured.context("capture failed")?;

            println!(
                "captured {}x{} frame #{} (brightness {:.1}{})",
                frame.width,
                frame.height,
                frame.sequence,
                frame.avg_brightness(),
                if frame.is_dark { ", dark" } else { "" }
            );
            let image = image::GrayImage::from_raw(frame.width, frame.height, frame.data)
                .context("frame buffer does not match its dimensions")?;
            image
                .save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("saved {}", output.display());
        }
        Commands::Motion {
            gpio_root,
            pin,
            count,
            interval_ms,
        } => {
            let sensor = MotionInput::open(&gpio_root, pin)
                .with_context(|| format!("failed to open gpio{pin}"))?;
            let mut gate = MotionGate::new(Box::new(sensor), count, Duration::from_millis(interval_ms));
            let raw = gate.read_raw();
            let confirmed = gate.debounced();
            println!("raw: {raw}, debounced ({count} x {interval_ms}ms): {confirmed}");
        }
        Commands::Lcd {
            line1,
            line2,
            bus,
            address,
            columns,
            rows,
        } => {
            let mut lcd = I2cLcd::open(&bus, address, columns, rows)
                .with_context(|| format!("failed to open LCD at {address:#04x} on {bus}"))?;
            lcd.show(&line1, &line2).context("LCD write failed")?;
        }
    }

    Ok(())
}

fn parse_address(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid I2C address {s:?}: {e}"))
}
