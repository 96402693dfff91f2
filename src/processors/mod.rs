//! Change processors: stateful rules over consecutive snapshot pairs.
//!
//! Processors never touch the session directly. Each one looks at a
//! [`ChangeEvent`](crate::types::ChangeEvent) plus a read-only
//! [`TrackingContext`] and returns the [`Action`]s the tracker should
//! apply, which keeps the rules testable without any collaborators.

pub mod integrity;
pub mod landing;
pub mod primary;
pub mod secondary;
pub mod warnings;
pub mod windows;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{EngineType, PrimaryTracking, TrackingStatus};
use landing::LandingReport;

/// Map/log color of a tracking event
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventColor {
    /// Routine switch changes
    #[default]
    Gray,
    /// Phase changes and milestones
    Blue,
    Green,
    /// Warnings
    Orange,
    /// Penalties, anomalies, crashes
    Red,
}

/// Why an active session was aborted
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AbortReason {
    Slew,
    Teleport { distance_m: f64, allowed_m: f64 },
    TimeTravel { delta_secs: f64 },
    TimeJump { delta_secs: f64, allowed_secs: f64 },
    FuelIncrease { gallons: f64 },
    PayloadChanged { delta_lbs: f64 },
    AircraftChanged,
    EngineStartDuringGroundHandling,
    PushbackDuringGroundHandling,
    CrashDetectionDisabled,
    UnlimitedFuelEnabled,
}

impl AbortReason {
    /// Short machine-readable class, used in logs and reports
    pub fn classification(&self) -> &'static str {
        match self {
            AbortReason::Slew => "slew",
            AbortReason::Teleport { .. } => "teleport",
            AbortReason::TimeTravel { .. } => "time_travel",
            AbortReason::TimeJump { .. } => "time_jump",
            AbortReason::FuelIncrease { .. } => "fuel_increase",
            AbortReason::PayloadChanged { .. } => "payload_changed",
            AbortReason::AircraftChanged => "aircraft_changed",
            AbortReason::EngineStartDuringGroundHandling => "engine_start_ground_handling",
            AbortReason::PushbackDuringGroundHandling => "pushback_ground_handling",
            AbortReason::CrashDetectionDisabled => "crash_detection_disabled",
            AbortReason::UnlimitedFuelEnabled => "unlimited_fuel",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Slew => write!(f, "Slew mode was activated"),
            AbortReason::Teleport { distance_m, allowed_m } => write!(
                f,
                "Aircraft moved {:.0} m between samples (at most {:.0} m possible)",
                distance_m, allowed_m
            ),
            AbortReason::TimeTravel { delta_secs } => {
                write!(f, "Simulator time moved backwards by {:.0} s", -delta_secs)
            }
            AbortReason::TimeJump { delta_secs, allowed_secs } => write!(
                f,
                "Simulator time jumped {:.0} s forward (at most {:.0} s expected)",
                delta_secs, allowed_secs
            ),
            AbortReason::FuelIncrease { gallons } => {
                write!(f, "Fuel increased by {:.1} gallons", gallons)
            }
            AbortReason::PayloadChanged { delta_lbs } => {
                write!(f, "Payload changed by {:.0} lbs", delta_lbs)
            }
            AbortReason::AircraftChanged => write!(f, "A different aircraft was loaded"),
            AbortReason::EngineStartDuringGroundHandling => {
                write!(f, "Engine started before ground handling was complete")
            }
            AbortReason::PushbackDuringGroundHandling => {
                write!(f, "Pushback started before ground handling was complete")
            }
            AbortReason::CrashDetectionDisabled => write!(f, "Crash detection was disabled"),
            AbortReason::UnlimitedFuelEnabled => write!(f, "Unlimited fuel was enabled"),
        }
    }
}

/// State changes a processor asks the tracker to make
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Log a tracking event at the current position
    Event { color: EventColor, text: String },
    /// Spoken and shown in the simulator
    Announce(String),
    Abort(AbortReason),
    /// Shutdown on the ground without ever leaving it: stop, keep the save
    HaltWithoutFinish,
    Finalize,
    MarkAirborne,
    Landing(LandingReport),
    /// Switch landing analysis between its fast and normal rate
    SetLandingFastRate(bool),
    TimeSaved { secs: f64 },
    /// Candidate position report marker
    PositionSample { turning: bool },
}

impl Action {
    pub fn event(color: EventColor, text: impl Into<String>) -> Self {
        Action::Event { color, text: text.into() }
    }
}

/// Session facts a processor may look at
#[derive(Clone, Debug, Default)]
pub struct TrackingContext {
    pub status: TrackingStatus,
    pub engine_type: EngineType,
    pub was_airborne: bool,
    pub ground_handling_complete: bool,
    pub landing_count: usize,
    /// Latest primary snapshot, if any was received
    pub primary: Option<PrimaryTracking>,
    /// `Some(turned_off)` once a taxi-in after touchdown is under way
    pub taxi_in_turned_off: Option<bool>,
}

impl TrackingContext {
    pub fn is_tracking(&self) -> bool {
        self.status == TrackingStatus::Tracking
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn on_ground(&self) -> bool {
        self.primary.as_ref().map(|p| p.on_ground).unwrap_or(true)
    }

    pub fn ground_speed_kt(&self) -> f64 {
        self.primary.as_ref().map(|p| p.ground_speed_kt).unwrap_or(0.0)
    }

    pub fn radio_height_ft(&self) -> f64 {
        self.primary.as_ref().map(|p| p.radio_height_ft).unwrap_or(0.0)
    }

    pub fn sim_rate(&self) -> f64 {
        self.primary.as_ref().map(|p| p.effective_sim_rate()).unwrap_or(1.0)
    }
}

/// Helper shared by the processors for plain switch transitions
pub(crate) fn toggle_event(
    actions: &mut Vec<Action>,
    old: bool,
    new: bool,
    on_text: &str,
    off_text: &str,
) {
    if old != new {
        let text = if new { on_text } else { off_text };
        actions.push(Action::event(EventColor::Gray, text));
    }
}
