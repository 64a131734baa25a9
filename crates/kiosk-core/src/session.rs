//! Recognition session — a bounded window of frame capture and matching.

use crate::aggregate::MatchAggregator;
use crate::camera::{self, FrameSource};
use crate::embedder::FaceEmbedder;
use crate::gallery::{Gallery, Matcher};
use crate::motion::MotionGate;
use crate::signal::ShutdownSignal;
use crate::types::SessionResult;
use std::time::{Duration, Instant};

/// Timing of a recognition window.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Wall-clock length of the window.
    pub duration: Duration,
    /// How often a single raw motion sample is taken mid-session.
    pub check_interval: Duration,
    /// Pause between frames; caps the capture rate.
    pub poll_interval: Duration,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(15),
            check_interval: Duration::from_secs(5),
            poll_interval: Duration::from_millis(120),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The full window elapsed.
    Elapsed,
    /// A mid-session motion check read low.
    NoMotion,
    /// The camera could not be started or stopped delivering frames.
    CameraFailed,
    /// The operator asked the kiosk to stop.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Best detection across the window; always `None` after a camera failure.
    pub best: SessionResult,
    pub end: SessionEnd,
    pub frames: usize,
    /// Faces resolved against the gallery, including those without a distance.
    pub detections: usize,
}

/// Releases the camera on every exit path, including unwinding.
struct CameraGuard<'a> {
    camera: &'a mut dyn FrameSource,
}

impl Drop for CameraGuard<'_> {
    fn drop(&mut self) {
        camera::release(self.camera);
    }
}

/// Everything a session borrows from the kiosk for its duration.
pub struct SessionController<'a> {
    pub camera: &'a mut dyn FrameSource,
    pub embedder: &'a mut dyn FaceEmbedder,
    pub gate: &'a mut MotionGate,
    pub gallery: &'a Gallery,
    pub matcher: &'a dyn Matcher,
    pub threshold: f32,
    pub shutdown: &'a ShutdownSignal,
}

impl SessionController<'_> {
    /// Run one recognition window.
    ///
    /// Frames are captured and matched strictly in order. Every
    /// `check_interval` a single raw motion sample is taken between frames;
    /// if it reads low the session ends early, keeping what was found so far.
    pub fn run(&mut self, params: &SessionParams) -> SessionOutcome {
        let mut guard = CameraGuard {
            camera: &mut *self.camera,
        };

        tracing::info!("starting camera");
        if let Err(err) = guard.camera.start() {
            tracing::warn!(error = %err, "camera start failed");
            return SessionOutcome {
                best: None,
                end: SessionEnd::CameraFailed,
                frames: 0,
                detections: 0,
            };
        }

        let started = Instant::now();
        let deadline = started + params.duration;
        let mut next_check = started + params.check_interval;
        let mut aggregator = MatchAggregator::new();
        let mut frames = 0usize;
        let mut end = SessionEnd::Elapsed;

        while Instant::now() < deadline {
            if self.shutdown.is_triggered() {
                end = SessionEnd::Interrupted;
                break;
            }

            let frame = match guard.camera.capture_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(error = %err, frames, "frame capture failed; abandoning session");
                    end = SessionEnd::CameraFailed;
                    break;
                }
            };
            frames += 1;

            if frame.is_dark {
                tracing::debug!(seq = frame.sequence, "dark frame");
            }
            match self.embedder.detect(&frame) {
                Ok(faces) => {
                    for face in &faces {
                        let detection = self.matcher.resolve(&face.embedding, self.gallery, self.threshold);
                        tracing::debug!(
                            seq = frame.sequence,
                            name = %detection.name,
                            known = detection.is_known(),
                            distance = ?detection.distance,
                            "face resolved"
                        );
                        if aggregator.fold(&detection) {
                            if let Some(best) = aggregator.best() {
                                tracing::debug!(name = %best.name, distance = best.distance, "new session best");
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, seq = frame.sequence, "embedding failed; skipping frame");
                }
            }

            if Instant::now() >= next_check {
                if !self.gate.read_raw() {
                    tracing::info!("no motion, ending session early");
                    end = SessionEnd::NoMotion;
                    break;
                }
                tracing::debug!("motion still present, continuing");
                next_check = Instant::now() + params.check_interval;
            }

            std::thread::sleep(params.poll_interval);
        }

        drop(guard);

        let detections = aggregator.folded();
        let best = match end {
            SessionEnd::CameraFailed => None,
            _ => aggregator.into_result(),
        };
        tracing::info!(
            ?end,
            frames,
            detections,
            best = ?best,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session finished"
        );

        SessionOutcome {
            best,
            end,
            frames,
            detections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::EuclideanMatcher;
    use crate::testing::{CannedEmbedder, ScriptedCamera, ScriptedSensor};
    use crate::types::{Embedding, UNKNOWN};

    fn alice_gallery() -> Gallery {
        Gallery::from_parts(vec![Embedding::new(vec![0.3, 0.0])], vec!["Alice".into()]).unwrap()
    }

    fn quick(duration_ms: u64, check_ms: u64) -> SessionParams {
        SessionParams {
            duration: Duration::from_millis(duration_ms),
            check_interval: Duration::from_millis(check_ms),
            poll_interval: Duration::from_millis(1),
        }
    }

    struct Rig {
        camera: ScriptedCamera,
        embedder: CannedEmbedder,
        gate: MotionGate,
        gallery: Gallery,
        shutdown: ShutdownSignal,
    }

    impl Rig {
        fn new(embedder: CannedEmbedder, gallery: Gallery) -> Self {
            Self {
                camera: ScriptedCamera::new(),
                embedder,
                gate: MotionGate::new(Box::new(ScriptedSensor::always(true)), 1, Duration::ZERO),
                gallery,
                shutdown: ShutdownSignal::new(),
            }
        }

        fn run(&mut self, threshold: f32, params: &SessionParams) -> SessionOutcome {
            SessionController {
                camera: &mut self.camera,
                embedder: &mut self.embedder,
                gate: &mut self.gate,
                gallery: &self.gallery,
                matcher: &EuclideanMatcher,
                threshold,
                shutdown: &self.shutdown,
            }
            .run(params)
        }
    }

    #[test]
    fn test_empty_gallery_yields_none() {
        let mut rig = Rig::new(CannedEmbedder::faces(vec![vec![0.0, 0.0]]), Gallery::empty());
        let outcome = rig.run(0.5, &quick(30, 1000));

        assert_eq!(outcome.best, None);
        assert_eq!(outcome.end, SessionEnd::Elapsed);
        assert!(outcome.frames > 0);
        assert!(rig.camera.stats().stopped());
    }

    #[test]
    fn test_known_face_within_threshold() {
        let mut rig = Rig::new(CannedEmbedder::faces(vec![vec![0.0, 0.0]]), alice_gallery());
        let best = rig.run(0.5, &quick(30, 1000)).best.unwrap();

        assert_eq!(best.name, "alice");
        assert!((best.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_known_face_above_threshold_is_unknown_with_distance() {
        let mut rig = Rig::new(CannedEmbedder::faces(vec![vec![0.0, 0.0]]), alice_gallery());
        let best = rig.run(0.2, &quick(30, 1000)).best.unwrap();

        assert_eq!(best.name, UNKNOWN);
        assert!((best.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_best_across_frames_and_faces() {
        // Frame 1: two faces, frame 2: the closest face, then nothing.
        let embedder = CannedEmbedder::sequence(vec![
            vec![vec![0.0, 0.45], vec![0.0, 0.9]],
            vec![vec![0.25, 0.0]],
        ]);
        let mut rig = Rig::new(embedder, alice_gallery());
        let best = rig.run(0.5, &quick(40, 1000)).best.unwrap();

        assert_eq!(best.name, "alice");
        assert!((best.distance - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_motion_loss_ends_early_and_keeps_best() {
        let mut rig = Rig::new(CannedEmbedder::faces(vec![vec![0.0, 0.0]]), alice_gallery());
        rig.gate = MotionGate::new(Box::new(ScriptedSensor::always(false)), 1, Duration::ZERO);

        let start = Instant::now();
        let outcome = rig.run(0.5, &quick(5_000, 0));

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.end, SessionEnd::NoMotion);
        assert_eq!(outcome.frames, 1);
        assert_eq!(outcome.best.unwrap().name, "alice");
        assert!(rig.camera.stats().stopped());
    }

    #[test]
    fn test_motion_check_uses_single_raw_read() {
        let sensor = ScriptedSensor::states(&[true, false]);
        let reads = sensor.reads();
        let mut rig = Rig::new(CannedEmbedder::faces(vec![]), Gallery::empty());
        rig.gate = MotionGate::new(Box::new(sensor), 3, Duration::from_secs(1));

        let outcome = rig.run(0.5, &quick(5_000, 0));

        // One read per check, no debounce: first check passes, second ends the session.
        assert_eq!(outcome.end, SessionEnd::NoMotion);
        assert_eq!(reads.get(), 2);
        assert_eq!(outcome.frames, 2);
    }

    #[test]
    fn test_camera_start_failure_never_captures() {
        let mut rig = Rig::new(CannedEmbedder::faces(vec![vec![0.0, 0.0]]), alice_gallery());
        rig.camera = ScriptedCamera::failing_start();

        let outcome = rig.run(0.5, &quick(1_000, 1000));

        assert_eq!(outcome.best, None);
        assert_eq!(outcome.end, SessionEnd::CameraFailed);
        let stats = rig.camera.stats();
        assert_eq!(stats.captures(), 0);
        assert_eq!(rig.embedder.calls(), 0);
        assert!(stats.stopped());
    }

    #[test]
    fn test_capture_failure_discards_result() {
        let mut rig = Rig::new(CannedEmbedder::faces(vec![vec![0.0, 0.0]]), alice_gallery());
        rig.camera = ScriptedCamera::failing_after(2);

        let outcome = rig.run(0.5, &quick(5_000, 1000));

        assert_eq!(outcome.end, SessionEnd::CameraFailed);
        assert_eq!(outcome.best, None);
        assert_eq!(outcome.frames, 2);
        assert!(rig.camera.stats().stopped());
    }

    #[test]
    fn test_embedding_failure_skips_frame() {
        let mut rig = Rig::new(CannedEmbedder::failing_then(vec![vec![0.0, 0.0]], 2), alice_gallery());
        let outcome = rig.run(0.5, &quick(40, 1000));

        assert_eq!(outcome.end, SessionEnd::Elapsed);
        assert_eq!(outcome.best.unwrap().name, "alice");
    }

    #[test]
    fn test_dark_frames_are_still_embedded() {
        let mut rig = Rig::new(CannedEmbedder::faces(vec![vec![0.0, 0.0]]), alice_gallery());
        rig.camera = ScriptedCamera::dark();

        let outcome = rig.run(0.5, &quick(20, 1000));

        assert!(outcome.frames > 0);
        assert_eq!(rig.embedder.calls(), outcome.frames);
        assert_eq!(outcome.best.unwrap().name, "alice");
    }

    #[test]
    fn test_detections_counted_across_frames() {
        // Two faces, then one face, then nothing.
        let embedder = CannedEmbedder::sequence(vec![
            vec![vec![0.0, 0.45], vec![0.0, 0.9]],
            vec![vec![0.25, 0.0]],
        ]);
        let mut rig = Rig::new(embedder, alice_gallery());
        let outcome = rig.run(0.5, &quick(40, 1000));

        assert_eq!(outcome.detections, 3);
        assert!(outcome.frames >= 2);
    }

    #[test]
    fn test_shutdown_interrupts_session() {
        let mut rig = Rig::new(CannedEmbedder::faces(vec![vec![0.0, 0.0]]), alice_gallery());
        rig.shutdown.trigger();

        let outcome = rig.run(0.5, &quick(5_000, 1000));

        assert_eq!(outcome.end, SessionEnd::Interrupted);
        assert_eq!(outcome.frames, 0);
        assert!(rig.camera.stats().stopped());
    }
}
