use anyhow::{Context, Result};
use kiosk_core::{
    Collaborators, ConsoleDisplay, EuclideanMatcher, Gallery, Kiosk, MotionSensor, NullSensor,
    ShutdownSignal, SocketEmbedder, TextDisplay,
};
use kiosk_hw::{I2cLcd, MotionInput, RelayOutput, V4lCamera};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

mod config;
mod log_sink;
mod runtime;

use config::Config;
use log_sink::HttpLogSink;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "kioskd starting");

    let config = Config::load().context("failed to load configuration")?;

    let gallery = Gallery::load(&config.gallery_path).with_context(|| {
        format!("failed to load gallery from {}", config.gallery_path.display())
    })?;
    if gallery.is_empty() {
        tracing::warn!("gallery is empty; every face will be reported as unrecognized");
    }

    let parts = Collaborators {
        sensor: motion_sensor(&config),
        camera: Box::new(V4lCamera::new(
            &config.camera_device,
            config.camera_width,
            config.camera_height,
            config.camera_warmup_frames,
        )),
        embedder: Box::new(SocketEmbedder::new(
            config.embedder_socket.clone(),
            config.embedder_timeout(),
            config.frame_scale,
        )),
        display: display(&config),
        actuator: Box::new(
            RelayOutput::open(&config.gpio_root, config.relay_pin)
                .with_context(|| format!("failed to open relay on gpio{}", config.relay_pin))?,
        ),
        sink: Box::new(
            HttpLogSink::new(&config.log_url, config.log_timeout())
                .context("invalid attendance log URL")?,
        ),
    };

    let shutdown = ShutdownSignal::new();
    let kiosk = Kiosk::new(
        parts,
        Box::new(EuclideanMatcher),
        Arc::new(gallery),
        config.kiosk_settings(),
        shutdown.clone(),
    );
    let mut exit = runtime::spawn_kiosk(kiosk).context("failed to spawn kiosk thread")?;

    tracing::info!(
        camera = %config.camera_device,
        threshold = config.distance_threshold,
        log_url = %config.log_url,
        "kioskd ready"
    );

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let result = tokio::select! {
        result = &mut exit => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received");
            shutdown.trigger();
            exit.await
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received");
            shutdown.trigger();
            exit.await
        }
    };

    match result {
        Ok(Ok(())) => {
            tracing::info!("kioskd stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(e).context("kiosk stopped on a fatal error"),
        Err(_) => anyhow::bail!("kiosk thread exited without reporting"),
    }
}

/// PIR sensor, or a sensor that never fires if the GPIO cannot be set up.
fn motion_sensor(config: &Config) -> Box<dyn MotionSensor> {
    match MotionInput::open(&config.gpio_root, config.motion_pin) {
        Ok(sensor) => Box::new(sensor),
        Err(e) => {
            tracing::error!(
                error = %e,
                pin = config.motion_pin,
                "motion sensor unavailable; kiosk will stay idle"
            );
            Box::new(NullSensor)
        }
    }
}

/// I2C LCD, or the log-only console display.
fn display(config: &Config) -> Box<dyn TextDisplay> {
    match I2cLcd::open(
        &config.lcd_bus,
        config.lcd_address,
        config.lcd_columns,
        config.lcd_rows,
    ) {
        Ok(lcd) => Box::new(lcd),
        Err(e) => {
            tracing::warn!(error = %e, bus = %config.lcd_bus, "LCD unavailable; using console display");
            Box::new(ConsoleDisplay::new(config.lcd_columns))
        }
    }
}
