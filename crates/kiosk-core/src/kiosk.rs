//! Kiosk loop — the top-level state machine.
//!
//! ```text
//! IDLE --debounced()==false--> IDLE
//! IDLE --debounced()==true---> SESSION --> REPORTING --> IDLE
//! any  --operator stop / fatal error--> SHUTDOWN
//! ```
//!
//! Strictly sequential: at most one session is ever active. A panic in any
//! state is fatal; the loop performs cleanup and does not resume.

use crate::camera::{self, FrameSource};
use crate::decision::decide;
use crate::embedder::FaceEmbedder;
use crate::gallery::{Gallery, Matcher};
use crate::motion::{MotionGate, MotionSensor};
use crate::output::{Actuator, AttendanceLog, EventSink, Relay, Screen, TextDisplay};
use crate::session::{SessionController, SessionEnd, SessionParams};
use crate::signal::ShutdownSignal;
use crate::types::SessionResult;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("fatal error in kiosk loop: {0}")]
    Fatal(String),
}

#[derive(Debug)]
enum KioskState {
    Idle,
    Session,
    Reporting(SessionResult),
    Shutdown,
}

/// Loop timing and decision parameters.
#[derive(Debug, Clone)]
pub struct KioskSettings {
    pub session: SessionParams,
    pub distance_threshold: f32,
    pub debounce_count: usize,
    pub debounce_interval: Duration,
    /// How long IDLE waits for the raw sensor before debouncing.
    pub motion_wait: Duration,
    pub idle_pause: Duration,
    pub report_pause: Duration,
}

impl Default for KioskSettings {
    fn default() -> Self {
        Self {
            session: SessionParams::default(),
            distance_threshold: 0.5,
            debounce_count: 3,
            debounce_interval: Duration::from_millis(120),
            motion_wait: Duration::from_secs(1),
            idle_pause: Duration::from_millis(500),
            report_pause: Duration::from_secs(1),
        }
    }
}

/// The hardware and service endpoints the kiosk drives, chosen once at startup.
pub struct Collaborators {
    pub sensor: Box<dyn MotionSensor>,
    pub camera: Box<dyn FrameSource>,
    pub embedder: Box<dyn FaceEmbedder>,
    pub display: Box<dyn TextDisplay>,
    pub actuator: Box<dyn Actuator>,
    pub sink: Box<dyn EventSink>,
}

pub struct Kiosk {
    gate: MotionGate,
    camera: Box<dyn FrameSource>,
    embedder: Box<dyn FaceEmbedder>,
    matcher: Box<dyn Matcher>,
    gallery: Arc<Gallery>,
    screen: Screen,
    relay: Relay,
    log: AttendanceLog,
    settings: KioskSettings,
    shutdown: ShutdownSignal,
    last_session: Option<Instant>,
}

impl Kiosk {
    pub fn new(
        parts: Collaborators,
        matcher: Box<dyn Matcher>,
        gallery: Arc<Gallery>,
        settings: KioskSettings,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            gate: MotionGate::new(parts.sensor, settings.debounce_count, settings.debounce_interval),
            camera: parts.camera,
            embedder: parts.embedder,
            matcher,
            gallery,
            screen: Screen::new(parts.display),
            relay: Relay::new(parts.actuator),
            log: AttendanceLog::new(parts.sink),
            settings,
            shutdown,
            last_session: None,
        }
    }

    /// Run until the operator stops the kiosk (`Ok`) or a fatal error occurs (`Err`).
    ///
    /// Cleanup runs on both paths: display cleared, relay off, camera released.
    pub fn run(mut self) -> Result<(), KioskError> {
        self.screen.show("Ready", &clock());
        tracing::info!(gallery = self.gallery.len(), "kiosk loop started");

        let mut state = KioskState::Idle;
        let result = loop {
            if self.shutdown.is_triggered() {
                break Ok(());
            }
            match panic::catch_unwind(AssertUnwindSafe(|| self.step(state))) {
                Ok(KioskState::Shutdown) => break Ok(()),
                Ok(next) => state = next,
                Err(payload) => {
                    let msg = panic_message(&*payload);
                    tracing::error!(error = %msg, "kiosk loop failed");
                    self.screen.show("Error", &msg);
                    break Err(KioskError::Fatal(msg));
                }
            }
        };

        if result.is_ok() {
            tracing::info!("kiosk stopping");
            self.screen.show("Shutting down", "");
        }
        self.cleanup();
        result
    }

    fn step(&mut self, state: KioskState) -> KioskState {
        match state {
            KioskState::Idle => self.idle(),
            KioskState::Session => self.session(),
            KioskState::Reporting(result) => self.report(result),
            KioskState::Shutdown => KioskState::Shutdown,
        }
    }

    fn idle(&mut self) -> KioskState {
        self.gate.wait_for_motion(
            self.settings.motion_wait,
            self.settings.session.poll_interval,
            &self.shutdown,
        );
        if self.shutdown.is_triggered() {
            return KioskState::Shutdown;
        }

        if !self.gate.debounced() {
            self.screen.show(&clock(), "Waiting motion");
            camera::release(self.camera.as_mut());
            std::thread::sleep(self.settings.idle_pause);
            return KioskState::Idle;
        }

        tracing::info!(
            since_last_ms = ?self.last_session.map(|t| t.elapsed().as_millis() as u64),
            "motion confirmed, starting session"
        );
        KioskState::Session
    }

    fn session(&mut self) -> KioskState {
        self.screen.show("Recognizing...", "Please wait");

        let outcome = SessionController {
            camera: self.camera.as_mut(),
            embedder: self.embedder.as_mut(),
            gate: &mut self.gate,
            gallery: &self.gallery,
            matcher: self.matcher.as_ref(),
            threshold: self.settings.distance_threshold,
            shutdown: &self.shutdown,
        }
        .run(&self.settings.session);
        self.last_session = Some(Instant::now());

        match outcome.end {
            SessionEnd::Interrupted => KioskState::Shutdown,
            SessionEnd::NoMotion => {
                self.screen.show("No motion", "");
                KioskState::Reporting(outcome.best)
            }
            SessionEnd::Elapsed | SessionEnd::CameraFailed => KioskState::Reporting(outcome.best),
        }
    }

    fn report(&mut self, result: SessionResult) -> KioskState {
        let decision = decide(&result, chrono::Local::now().naive_local());
        decision.apply(&mut self.screen, &mut self.relay, &mut self.log);
        std::thread::sleep(self.settings.report_pause);
        KioskState::Idle
    }

    fn cleanup(&mut self) {
        self.screen.clear();
        self.relay.off();
        camera::release(self.camera.as_mut());
    }
}

fn clock() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
