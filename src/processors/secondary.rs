use super::warnings::{LatchChange, StateLatch};
use super::{toggle_event, AbortReason, Action, EventColor, TrackingContext};
use crate::config::TrackerConfig;
use crate::types::{ChangeEvent, SecondaryTracking, TrackingStatus};

/// Landing lights must be on below this radio height (jets and turboprops)
pub const LANDING_LIGHTS_BELOW_FT_JET: f64 = 9_500.0;
/// Landing lights must be on below this radio height (everything else)
pub const LANDING_LIGHTS_BELOW_FT_OTHER: f64 = 300.0;
/// Ground speed under which the aircraft counts as parked
pub const PARKED_SPEED_KT: f64 = 1.0;

/// Rules over switch and system state
#[derive(Debug)]
pub struct SecondaryProcessor {
    landing_lights: StateLatch,
    utc_jump_secs: f64,
}

impl SecondaryProcessor {
    pub fn new(config: &TrackerConfig) -> Self {
        SecondaryProcessor {
            landing_lights: StateLatch::default(),
            utc_jump_secs: config.utc_jump_secs,
        }
    }

    pub fn process(&mut self, change: &ChangeEvent<SecondaryTracking>, ctx: &TrackingContext) -> Vec<Action> {
        let mut actions = Vec::new();
        if change.is_first() {
            return actions;
        }
        let (old, new) = (&change.old, &change.new);

        if ctx.is_active() {
            if let Some(reason) = self.check_integrity(change, ctx) {
                actions.push(Action::Abort(reason));
                return actions;
            }
        }

        self.light_events(old, new, ctx, &mut actions);
        self.engine_events(old, new, ctx, &mut actions);
        if actions.iter().any(|a| matches!(a, Action::Abort(_) | Action::Finalize | Action::HaltWithoutFinish)) {
            return actions;
        }

        if !old.pushback.is_active() && new.pushback.is_active() {
            if ctx.status == TrackingStatus::GroundOperations {
                actions.push(Action::Abort(AbortReason::PushbackDuringGroundHandling));
                return actions;
            }
            actions.push(Action::event(EventColor::Blue, "Pushback started"));
        } else if old.pushback.is_active() && !new.pushback.is_active() {
            actions.push(Action::event(EventColor::Blue, "Pushback finished"));
        }

        if old.gear_down && !new.gear_down && ctx.on_ground() {
            actions.push(Action::event(EventColor::Red, "Gear raised while on the ground"));
        } else {
            toggle_event(&mut actions, old.gear_down, new.gear_down, "Gear down", "Gear up");
        }
        if (old.flaps_percent - new.flaps_percent).abs() >= 1.0 {
            actions.push(Action::event(
                EventColor::Gray,
                format!("Flaps {:.0}%", new.flaps_percent),
            ));
        }
        toggle_event(&mut actions, old.autopilot_engaged, new.autopilot_engaged, "Autopilot engaged", "Autopilot disengaged");
        toggle_event(&mut actions, old.parking_brake_set, new.parking_brake_set, "Parking brake set", "Parking brake released");
        toggle_event(&mut actions, old.spoilers_armed, new.spoilers_armed, "Spoilers armed", "Spoilers disarmed");
        toggle_event(&mut actions, old.apu_running, new.apu_running, "APU started", "APU shut down");
        toggle_event(&mut actions, old.seatbelt_sign, new.seatbelt_sign, "Seatbelt sign on", "Seatbelt sign off");
        toggle_event(&mut actions, old.no_smoking_sign, new.no_smoking_sign, "No smoking sign on", "No smoking sign off");

        self.landing_light_policy(new, ctx, &mut actions);
        actions
    }

    /// Time and realism rules that void the session
    fn check_integrity(&self, change: &ChangeEvent<SecondaryTracking>, ctx: &TrackingContext) -> Option<AbortReason> {
        let (old, new) = (&change.old, &change.new);
        if old.crash_detection_enabled && !new.crash_detection_enabled {
            return Some(AbortReason::CrashDetectionDisabled);
        }
        if !old.unlimited_fuel && new.unlimited_fuel {
            return Some(AbortReason::UnlimitedFuelEnabled);
        }
        if let (Some(old_utc), Some(new_utc)) = (old.utc_time, new.utc_time) {
            let delta_secs = (new_utc - old_utc).num_milliseconds() as f64 / 1000.0;
            if delta_secs < 0.0 {
                return Some(AbortReason::TimeTravel { delta_secs });
            }
            let allowed_secs = change.elapsed_secs() * ctx.sim_rate() + self.utc_jump_secs;
            if delta_secs > allowed_secs {
                return Some(AbortReason::TimeJump { delta_secs, allowed_secs });
            }
        }
        None
    }

    fn light_events(&self, old: &SecondaryTracking, new: &SecondaryTracking, ctx: &TrackingContext, actions: &mut Vec<Action>) {
        toggle_event(actions, old.light_beacon, new.light_beacon, "Beacon light on", "Beacon light off");
        toggle_event(actions, old.light_nav, new.light_nav, "Navigation lights on", "Navigation lights off");
        toggle_event(actions, old.light_strobe, new.light_strobe, "Strobe lights on", "Strobe lights off");
        toggle_event(actions, old.light_taxi, new.light_taxi, "Taxi lights on", "Taxi lights off");
        toggle_event(actions, old.light_landing, new.light_landing, "Landing lights on", "Landing lights off");

        let was_violating = old.engines_running && !old.light_beacon;
        let violating = new.engines_running && !new.light_beacon;
        if ctx.is_tracking() && violating && !was_violating {
            actions.push(Action::event(EventColor::Red, "Engine running with beacon light off"));
        }
    }

    fn engine_events(&self, old: &SecondaryTracking, new: &SecondaryTracking, ctx: &TrackingContext, actions: &mut Vec<Action>) {
        if !old.engines_running && new.engines_running {
            if ctx.status == TrackingStatus::GroundOperations && !ctx.ground_handling_complete {
                actions.push(Action::Abort(AbortReason::EngineStartDuringGroundHandling));
                return;
            }
            actions.push(Action::event(EventColor::Blue, "Engine started"));
        } else if old.engines_running && !new.engines_running {
            actions.push(Action::event(EventColor::Blue, "Engines shut down"));

            let parked = ctx.on_ground() && ctx.ground_speed_kt() < PARKED_SPEED_KT;
            if !ctx.is_tracking() || !parked {
                return;
            }
            if !ctx.was_airborne {
                log::info!("Engines shut down without the aircraft ever leaving the ground");
                actions.push(Action::HaltWithoutFinish);
                return;
            }
            if ctx.taxi_in_turned_off == Some(false) {
                actions.push(Action::event(EventColor::Red, "Engines shut down on the runway"));
            }
            actions.push(Action::Finalize);
        }
    }

    fn landing_light_policy(&mut self, new: &SecondaryTracking, ctx: &TrackingContext, actions: &mut Vec<Action>) {
        let limit_ft = if ctx.engine_type.is_jet_or_turboprop() {
            LANDING_LIGHTS_BELOW_FT_JET
        } else {
            LANDING_LIGHTS_BELOW_FT_OTHER
        };
        let violating =
            ctx.is_tracking() && !ctx.on_ground() && ctx.radio_height_ft() < limit_ft && !new.light_landing;

        match self.landing_lights.update(violating) {
            LatchChange::Raised => {
                actions.push(Action::event(
                    EventColor::Orange,
                    format!("Landing lights off below {:.0} ft", limit_ft),
                ));
                actions.push(Action::Announce("Landing lights".to_string()));
            }
            LatchChange::Cleared => {
                log::debug!("Landing light warning cleared");
            }
            LatchChange::Unchanged => {}
        }
    }
}
