//! Hand-written collaborator fakes shared by the unit tests.

use crate::camera::{CameraError, FrameSource};
use crate::embedder::{EmbedError, FaceEmbedder};
use crate::motion::{MotionSensor, SensorError};
use crate::output::{Actuator, ActuatorError, DisplayError, EventSink, SinkError, TextDisplay};
use crate::signal::ShutdownSignal;
use crate::types::{AttendanceEvent, Embedding, FaceObservation, FaceRegion, Frame};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sensor that replays a script, then reads `tail` forever.
pub struct ScriptedSensor {
    script: VecDeque<Result<bool, SensorError>>,
    tail: bool,
    reads: Counter,
    stop_on_exhaust: Option<ShutdownSignal>,
}

impl ScriptedSensor {
    pub fn new(script: Vec<Result<bool, SensorError>>) -> Self {
        Self {
            script: script.into(),
            tail: false,
            reads: Counter::default(),
            stop_on_exhaust: None,
        }
    }

    pub fn states(states: &[bool]) -> Self {
        Self::new(states.iter().map(|&s| Ok(s)).collect())
    }

    pub fn always(state: bool) -> Self {
        let mut sensor = Self::new(Vec::new());
        sensor.tail = state;
        sensor
    }

    /// Request shutdown on the first read past the end of the script.
    pub fn stop_when_exhausted(mut self, shutdown: &ShutdownSignal) -> Self {
        self.stop_on_exhaust = Some(shutdown.clone());
        self
    }

    pub fn reads(&self) -> Counter {
        self.reads.clone()
    }
}

impl MotionSensor for ScriptedSensor {
    fn sample(&mut self) -> Result<bool, SensorError> {
        self.reads.bump();
        match self.script.pop_front() {
            Some(r) => r,
            None => {
                if let Some(shutdown) = &self.stop_on_exhaust {
                    shutdown.trigger();
                }
                Ok(self.tail)
            }
        }
    }
}

#[derive(Debug, Default)]
struct CameraCounters {
    starts: usize,
    captures: usize,
    stops: usize,
    running: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CameraStats(Arc<Mutex<CameraCounters>>);

impl CameraStats {
    pub fn starts(&self) -> usize {
        self.0.lock().unwrap().starts
    }

    pub fn captures(&self) -> usize {
        self.0.lock().unwrap().captures
    }

    pub fn stops(&self) -> usize {
        self.0.lock().unwrap().stops
    }

    /// Released and stopped at least once.
    pub fn stopped(&self) -> bool {
        let c = self.0.lock().unwrap();
        !c.running && c.stops > 0
    }
}

/// Camera producing uniform gray frames.
pub struct ScriptedCamera {
    fail_start: bool,
    fail_after: Option<usize>,
    dark: bool,
    stats: CameraStats,
}

impl ScriptedCamera {
    pub fn new() -> Self {
        Self {
            fail_start: false,
            fail_after: None,
            dark: false,
            stats: CameraStats::default(),
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    pub fn failing_after(frames: usize) -> Self {
        Self {
            fail_after: Some(frames),
            ..Self::new()
        }
    }

    pub fn dark() -> Self {
        Self {
            dark: true,
            ..Self::new()
        }
    }

    pub fn stats(&self) -> CameraStats {
        self.stats.clone()
    }
}

impl FrameSource for ScriptedCamera {
    fn start(&mut self) -> Result<(), CameraError> {
        let mut c = self.stats.0.lock().unwrap();
        c.starts += 1;
        if self.fail_start {
            return Err(CameraError::DeviceNotFound("/dev/video-test".into()));
        }
        c.running = true;
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let mut c = self.stats.0.lock().unwrap();
        if !c.running {
            return Err(CameraError::NotStarted);
        }
        if self.fail_after.is_some_and(|n| c.captures >= n) {
            return Err(CameraError::CaptureFailed("cable unplugged".into()));
        }
        c.captures += 1;
        Ok(Frame {
            data: vec![if self.dark { 0 } else { 128 }; 16],
            width: 4,
            height: 4,
            timestamp: std::time::Instant::now(),
            sequence: c.captures as u32,
            is_dark: self.dark,
        })
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        let mut c = self.stats.0.lock().unwrap();
        c.stops += 1;
        c.running = false;
        Ok(())
    }
}

enum Canned {
    Fixed(Vec<Vec<f32>>),
    Sequence(VecDeque<Vec<Vec<f32>>>),
    FailingThen(usize, Vec<Vec<f32>>),
    Panic(&'static str),
}

/// Embedder returning prepared embeddings regardless of frame content.
pub struct CannedEmbedder {
    canned: Canned,
    calls: usize,
}

impl CannedEmbedder {
    fn with(canned: Canned) -> Self {
        Self { canned, calls: 0 }
    }

    /// The same faces on every frame.
    pub fn faces(faces: Vec<Vec<f32>>) -> Self {
        Self::with(Canned::Fixed(faces))
    }

    /// One entry per frame, then no faces.
    pub fn sequence(frames: Vec<Vec<Vec<f32>>>) -> Self {
        Self::with(Canned::Sequence(frames.into()))
    }

    /// Fail the first `n` calls, then behave like [`faces`](Self::faces).
    pub fn failing_then(faces: Vec<Vec<f32>>, n: usize) -> Self {
        Self::with(Canned::FailingThen(n, faces))
    }

    pub fn panicking(msg: &'static str) -> Self {
        Self::with(Canned::Panic(msg))
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

fn observations(faces: &[Vec<f32>]) -> Vec<FaceObservation> {
    faces
        .iter()
        .map(|values| FaceObservation {
            region: FaceRegion {
                x: 0.0,
                y: 0.0,
                width: 2.0,
                height: 2.0,
                confidence: Some(0.99),
            },
            embedding: Embedding::new(values.clone()),
        })
        .collect()
}

impl FaceEmbedder for CannedEmbedder {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceObservation>, EmbedError> {
        self.calls += 1;
        match &mut self.canned {
            Canned::Fixed(faces) => Ok(observations(faces)),
            Canned::Sequence(frames) => Ok(frames.pop_front().map(|f| observations(&f)).unwrap_or_default()),
            Canned::FailingThen(n, faces) => {
                if self.calls <= *n {
                    Err(EmbedError::Service("warming up".into()))
                } else {
                    Ok(observations(faces))
                }
            }
            Canned::Panic(msg) => panic!("{}", msg),
        }
    }
}

#[derive(Debug, Default)]
struct DisplayLog {
    shown: Vec<(String, String)>,
    clears: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DisplayLines(Arc<Mutex<DisplayLog>>);

impl DisplayLines {
    pub fn shown(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().shown.clone()
    }

    pub fn last_shown(&self) -> Option<(String, String)> {
        self.0.lock().unwrap().shown.last().cloned()
    }

    pub fn cleared(&self) -> bool {
        self.0.lock().unwrap().clears > 0
    }
}

pub struct RecordingDisplay {
    columns: usize,
    lines: DisplayLines,
}

impl RecordingDisplay {
    pub fn new(columns: usize) -> Self {
        Self {
            columns,
            lines: DisplayLines::default(),
        }
    }

    pub fn lines(&self) -> DisplayLines {
        self.lines.clone()
    }
}

impl TextDisplay for RecordingDisplay {
    fn columns(&self) -> usize {
        self.columns
    }

    fn show(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError> {
        // The kiosk must fit lines before handing them over.
        assert!(line1.chars().count() <= self.columns && line2.chars().count() <= self.columns);
        self.lines
            .0
            .lock()
            .unwrap()
            .shown
            .push((line1.to_string(), line2.to_string()));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.lines.0.lock().unwrap().clears += 1;
        Ok(())
    }
}

pub struct FailingDisplay;

impl TextDisplay for FailingDisplay {
    fn columns(&self) -> usize {
        16
    }

    fn show(&mut self, _line1: &str, _line2: &str) -> Result<(), DisplayError> {
        Err(DisplayError::Bus("no ack from 0x27".into()))
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        Err(DisplayError::Bus("no ack from 0x27".into()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelayState(Arc<Mutex<Vec<bool>>>);

impl RelayState {
    pub fn history(&self) -> Vec<bool> {
        self.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<bool> {
        self.0.lock().unwrap().last().copied()
    }
}

pub struct RecordingActuator {
    state: RelayState,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self {
            state: RelayState::default(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.state.clone()
    }
}

impl Actuator for RecordingActuator {
    fn activate(&mut self) -> Result<(), ActuatorError> {
        self.state.0.lock().unwrap().push(true);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), ActuatorError> {
        self.state.0.lock().unwrap().push(false);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SentEvents(Arc<Mutex<Vec<AttendanceEvent>>>);

impl SentEvents {
    pub fn snapshot(&self) -> Vec<AttendanceEvent> {
        self.0.lock().unwrap().clone()
    }
}

/// Sink that records every delivery attempt and optionally fails it.
pub struct RecordingSink {
    events: SentEvents,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: SentEvents::default(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn events(&self) -> SentEvents {
        self.events.clone()
    }
}

impl EventSink for RecordingSink {
    fn send(&mut self, event: &AttendanceEvent) -> Result<(), SinkError> {
        self.events.0.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(SinkError::Status(503));
        }
        Ok(())
    }
}
