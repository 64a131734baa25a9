//! Authorization decision — maps a session result to an outcome and its effects.
//!
//! Any gallery identity accepted under the distance threshold is authorized.
//! There is no time-window or duplicate check-in suppression.

use crate::output::{AttendanceLog, Relay, Screen};
use crate::types::{AttendanceEvent, SessionResult, UNKNOWN};
use chrono::NaiveDateTime;

const SHORT_STAMP: &str = "%d/%m %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No face with a computable distance, or the camera failed.
    NoFace,
    /// Best face did not match the gallery closely enough.
    Unrecognized { distance: f32 },
    /// Best face is a known person.
    Authorized { name: String, distance: f32 },
}

impl Outcome {
    pub fn from_result(result: &SessionResult) -> Self {
        match result {
            None => Outcome::NoFace,
            Some(best) if !best.is_known() => Outcome::Unrecognized {
                distance: best.distance,
            },
            Some(best) => Outcome::Authorized {
                name: best.name.clone(),
                distance: best.distance,
            },
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, Outcome::Authorized { .. })
    }
}

/// An outcome together with the one attendance event it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub outcome: Outcome,
    pub event: AttendanceEvent,
}

/// Decide a session result at time `now`.
pub fn decide(result: &SessionResult, now: NaiveDateTime) -> Decision {
    let outcome = Outcome::from_result(result);
    let (name, distance) = match &outcome {
        Outcome::NoFace => (UNKNOWN.to_string(), None),
        Outcome::Unrecognized { distance } => (UNKNOWN.to_string(), Some(*distance)),
        Outcome::Authorized { name, distance } => (name.clone(), Some(*distance)),
    };
    let event = AttendanceEvent {
        timestamp: now,
        name,
        authorized: outcome.is_authorized(),
        distance,
    };
    Decision { outcome, event }
}

impl Decision {
    /// Update the display, drive the relay and emit exactly one log event.
    pub fn apply(&self, screen: &mut Screen, relay: &mut Relay, log: &mut AttendanceLog) {
        let stamp = self.event.timestamp.format(SHORT_STAMP).to_string();
        match &self.outcome {
            Outcome::NoFace => {
                tracing::info!("no face seen or camera failure");
                screen.show("No face found", &self.event.timestamp.format("%H:%M:%S").to_string());
                relay.off();
            }
            Outcome::Unrecognized { distance } => {
                tracing::info!(distance, "unrecognized person");
                screen.show("Unrecognized", &stamp);
                relay.off();
            }
            Outcome::Authorized { name, distance } => {
                tracing::info!(name = %name, distance, "authorized");
                screen.show(&format!("Welcome {name}"), &stamp);
                relay.on();
            }
        }
        log.record(&self.event);
    }
}
