//! Min-distance reduction of per-frame detections into a session result.

use crate::types::{BestMatch, FrameDetection, SessionResult};

/// Fold one detection into the running best.
///
/// Detections without a distance are ignored. The current best is replaced
/// only on a strictly smaller distance, so the first of equal distances wins.
pub fn fold(current: SessionResult, detection: &FrameDetection) -> SessionResult {
    let Some(distance) = detection.distance else {
        return current;
    };
    match current {
        Some(best) if best.distance <= distance => Some(best),
        _ => Some(BestMatch {
            name: detection.name.clone(),
            distance,
        }),
    }
}

/// Running best-by-distance across a recognition window.
#[derive(Debug, Default)]
pub struct MatchAggregator {
    best: SessionResult,
    folded: usize,
}

impl MatchAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a detection; returns true when it became the new best.
    pub fn fold(&mut self, detection: &FrameDetection) -> bool {
        self.folded += 1;
        let previous = self.best.as_ref().map(|b| b.distance);
        self.best = fold(self.best.take(), detection);
        self.best.as_ref().map(|b| b.distance) != previous
    }

    pub fn best(&self) -> Option<&BestMatch> {
        self.best.as_ref()
    }

    /// Total detections seen, including those without a distance.
    pub fn folded(&self) -> usize {
        self.folded
    }

    pub fn into_result(self) -> SessionResult {
        self.best
    }
}
