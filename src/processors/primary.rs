use chrono::{DateTime, Utc};

use super::warnings::DebouncedWarning;
use super::windows::{TaxiInMonitor, TurnDetector, VerticalProfile, VerticalProfileWindow};
use super::{AbortReason, Action, EventColor, TrackingContext};
use crate::config::TrackerConfig;
use crate::types::{knots_to_mps, ChangeEvent, CrashSequence, PrimaryTracking};

/// Rules over the high-rate position/attitude stream
#[derive(Debug)]
pub struct PrimaryProcessor {
    turn: TurnDetector,
    vertical: VerticalProfileWindow,
    last_window_push: Option<DateTime<Utc>>,
    window_spacing_ms: i64,
    overspeed: DebouncedWarning,
    stall: DebouncedWarning,
    taxi_in: TaxiInMonitor,
    rate_since: Option<DateTime<Utc>>,
    landing_fast: bool,
    landing_fast_below_ft: f64,
    teleport_max_speed_mps: f64,
}

impl PrimaryProcessor {
    pub fn new(config: &TrackerConfig) -> Self {
        PrimaryProcessor {
            turn: TurnDetector::new(config.turn_threshold_deg),
            vertical: VerticalProfileWindow::new(config.vertical_profile_threshold_fpm),
            last_window_push: None,
            window_spacing_ms: config.turn_sample_spacing_ms,
            overspeed: DebouncedWarning::new(config.warning_debounce_secs),
            stall: DebouncedWarning::new(config.warning_debounce_secs),
            taxi_in: TaxiInMonitor::default(),
            rate_since: None,
            landing_fast: false,
            landing_fast_below_ft: config.landing_fast_below_ft,
            teleport_max_speed_mps: knots_to_mps(config.teleport_max_speed_kt),
        }
    }

    pub fn is_turning(&self) -> bool {
        self.turn.is_turning()
    }

    pub fn vertical_profile(&self) -> VerticalProfile {
        self.vertical.profile()
    }

    /// `Some(turned_off)` while taxiing in after a touchdown
    pub fn taxi_in_state(&self) -> Option<bool> {
        self.taxi_in
            .is_active()
            .then(|| self.taxi_in.turned_off_runway())
    }

    /// Forget per-session state, e.g. when a new flight is bound
    pub fn reset_session(&mut self) {
        self.taxi_in.reset();
        self.overspeed.reset();
        self.stall.reset();
        self.rate_since = None;
    }

    pub fn process(&mut self, change: &ChangeEvent<PrimaryTracking>, ctx: &TrackingContext) -> Vec<Action> {
        let mut actions = Vec::new();
        let new = &change.new;
        self.push_windows(new, change.received_at);

        if change.is_first() {
            self.rate_since = Some(change.received_at);
            return actions;
        }
        let old = &change.old;
        let active = ctx.is_active();

        if active && new.slew_active && !old.slew_active {
            actions.push(Action::Abort(AbortReason::Slew));
            return actions;
        }

        if active && !old.slew_active && !new.slew_active {
            if let Some(reason) = self.check_teleport(change) {
                actions.push(Action::Abort(reason));
                return actions;
            }
        }

        if ctx.is_tracking() && old.crash_sequence == CrashSequence::Off && new.crash_sequence != CrashSequence::Off {
            actions.push(Action::event(EventColor::Red, "Crash detected"));
            actions.push(Action::Announce("Crash detected".to_string()));
            actions.push(Action::Finalize);
            return actions;
        }

        if self.overspeed.check(old.overspeed_warning, new.overspeed_warning, change.received_at) {
            actions.push(Action::event(EventColor::Orange, "Overspeed warning"));
        }
        if self.stall.check(old.stall_warning, new.stall_warning, change.received_at) {
            actions.push(Action::event(EventColor::Orange, "Stall warning"));
        }

        self.check_sim_rate(change, active, &mut actions);

        let airborne_now = !new.on_ground;
        if active && airborne_now && !ctx.was_airborne {
            actions.push(Action::MarkAirborne);
        }
        let has_been_airborne = ctx.was_airborne || (active && airborne_now);

        if has_been_airborne && !old.on_ground && new.on_ground {
            self.taxi_in.start(new.heading_true_deg);
        }
        if new.on_ground {
            self.taxi_in.observe(new.heading_true_deg);
        } else {
            self.taxi_in.reset();
        }

        let want_fast = active && has_been_airborne && new.radio_height_ft < self.landing_fast_below_ft;
        if want_fast != self.landing_fast {
            self.landing_fast = want_fast;
            actions.push(Action::SetLandingFastRate(want_fast));
        }

        if active {
            actions.push(Action::PositionSample { turning: self.turn.is_turning() });
        }
        actions
    }

    fn push_windows(&mut self, new: &PrimaryTracking, at: DateTime<Utc>) {
        let due = self
            .last_window_push
            .map(|last| (at - last).num_milliseconds() >= self.window_spacing_ms)
            .unwrap_or(true);
        if due {
            self.turn.push(new.heading_true_deg);
            self.vertical.push(new.vertical_speed_fpm);
            self.last_window_push = Some(at);
        }
    }

    /// Distance covered against what the aircraft could possibly fly in
    /// the elapsed time at the current simulation rate
    fn check_teleport(&self, change: &ChangeEvent<PrimaryTracking>) -> Option<AbortReason> {
        let (old, new) = (&change.old, &change.new);
        if old.position().is_null_island() {
            return None;
        }
        let distance_m = old.position().distance_m(&new.position());
        let elapsed = change.elapsed_secs().max(1.0);
        let rate = old.effective_sim_rate().max(new.effective_sim_rate()).max(1.0);
        let allowed_m = self.teleport_max_speed_mps * elapsed * rate;
        if distance_m > allowed_m {
            log::warn!(
                "Teleport: {:.0} m in {:.2} s at {}x (allowed {:.0} m)",
                distance_m,
                elapsed,
                rate,
                allowed_m
            );
            return Some(AbortReason::Teleport { distance_m, allowed_m });
        }
        None
    }

    fn check_sim_rate(&mut self, change: &ChangeEvent<PrimaryTracking>, active: bool, actions: &mut Vec<Action>) {
        let (old_rate, new_rate) = (change.old.sim_rate, change.new.sim_rate);
        if old_rate == new_rate {
            return;
        }
        let since = self.rate_since.unwrap_or(change.received_at);
        if active && old_rate > 1.0 {
            let real_secs = (change.received_at - since).num_milliseconds() as f64 / 1000.0;
            actions.push(Action::TimeSaved { secs: real_secs * old_rate });
        }
        self.rate_since = Some(change.received_at);
        actions.push(Action::event(
            EventColor::Blue,
            format!("Simulation rate changed to {}x", new_rate),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrackingStatus;
    use chrono::Duration;

    fn primary(lat: f64, lon: f64, heading: f64, on_ground: bool) -> PrimaryTracking {
        PrimaryTracking {
            latitude: lat,
            longitude: lon,
            heading_true_deg: heading,
            on_ground,
            radio_height_ft: if on_ground { 0.0 } else { 3000.0 },
            ground_speed_kt: if on_ground { 0.0 } else { 250.0 },
            sim_rate: 1.0,
            ..Default::default()
        }
    }

    fn ctx(status: TrackingStatus, was_airborne: bool) -> TrackingContext {
        TrackingContext { status, was_airborne, ..Default::default() }
    }

    fn change_at(old: PrimaryTracking, new: PrimaryTracking, t0: DateTime<Utc>, ms: i64) -> ChangeEvent<PrimaryTracking> {
        ChangeEvent::new(old, new, Some(t0), t0 + Duration::milliseconds(ms))
    }

    fn has_abort(actions: &[Action], class: &str) -> bool {
        actions
            .iter()
            .any(|a| matches!(a, Action::Abort(r) if r.classification() == class))
    }

    #[test]
    fn test_teleport_aborts() {
        let mut processor = PrimaryProcessor::new(&TrackerConfig::default());
        let old = primary(47.0, 8.0, 90.0, false);
        // ~5 km further east at 1x, 100 ms later
        let new = primary(47.0, 8.0 + 5000.0 / 75_900.0, 90.0, false);
        let actions = processor.process(&change_at(old, new, Utc::now(), 100), &ctx(TrackingStatus::Tracking, true));
        assert!(has_abort(&actions, "teleport"));
    }

    #[test]
    fn test_normal_movement_and_time_warp_allowed() {
        let mut processor = PrimaryProcessor::new(&TrackerConfig::default());
        let old = primary(47.0, 8.0, 90.0, false);
        // 250 kt for one second is ~129 m
        let new = primary(47.0, 8.0 + 129.0 / 75_900.0, 90.0, false);
        let actions = processor.process(&change_at(old.clone(), new, Utc::now(), 1000), &ctx(TrackingStatus::Tracking, true));
        assert!(!has_abort(&actions, "teleport"));

        // 4 km in one second is fine at 16x, not at 1x
        let mut fast = primary(47.0, 8.0 + 4000.0 / 75_900.0, 90.0, false);
        fast.sim_rate = 16.0;
        let mut old_fast = old.clone();
        old_fast.sim_rate = 16.0;
        let actions = processor.process(&change_at(old_fast, fast, Utc::now(), 1000), &ctx(TrackingStatus::Tracking, true));
        assert!(!has_abort(&actions, "teleport"));
    }

    #[test]
    fn test_teleport_ignored_when_not_active() {
        let mut processor = PrimaryProcessor::new(&TrackerConfig::default());
        let old = primary(47.0, 8.0, 90.0, true);
        let new = primary(51.0, 0.0, 90.0, true);
        let actions = processor.process(&change_at(old, new, Utc::now(), 100), &ctx(TrackingStatus::Preparing, false));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_slew_aborts_when_active() {
        let mut processor = PrimaryProcessor::new(&TrackerConfig::default());
        let old = primary(47.0, 8.0, 90.0, true);
        let mut new = old.clone();
        new.slew_active = true;
        let actions = processor.process(
            &change_at(old.clone(), new.clone(), Utc::now(), 100),
            &ctx(TrackingStatus::GroundOperations, false),
        );
        assert_eq!(actions, vec![Action::Abort(AbortReason::Slew)]);

        let actions = processor.process(&change_at(old, new, Utc::now(), 100), &ctx(TrackingStatus::Resuming, false));
        assert!(!has_abort(&actions, "slew"));
    }

    #[test]
    fn test_crash_finalizes() {
        let mut processor = PrimaryProcessor::new(&TrackerConfig::default());
        let old = primary(47.0, 8.0, 90.0, false);
        let mut new = old.clone();
        new.crash_sequence = CrashSequence::Complete;
        let actions = processor.process(&change_at(old, new, Utc::now(), 100), &ctx(TrackingStatus::Tracking, true));
        assert_eq!(actions.last(), Some(&Action::Finalize));
        assert!(actions.contains(&Action::event(EventColor::Red, "Crash detected")));
    }

    #[test]
    fn test_overspeed_debounced() {
        let mut processor = PrimaryProcessor::new(&TrackerConfig::default());
        let t0 = Utc::now();
        let calm = primary(47.0, 8.0, 90.0, false);
        let mut warn = calm.clone();
        warn.overspeed_warning = true;
        let tracking = ctx(TrackingStatus::Tracking, true);

        let count = |actions: &[Action]| {
            actions
                .iter()
                .filter(|a| matches!(a, Action::Event { text, .. } if text == "Overspeed warning"))
                .count()
        };

        assert_eq!(count(&processor.process(&change_at(calm.clone(), warn.clone(), t0, 100), &tracking)), 1);
        assert_eq!(count(&processor.process(&change_at(warn.clone(), calm.clone(), t0, 2000), &tracking)), 0);
        assert_eq!(count(&processor.process(&change_at(calm.clone(), warn.clone(), t0, 4000), &tracking)), 0);
        assert_eq!(count(&processor.process(&change_at(calm, warn, t0, 10_200), &tracking)), 1);
    }

    #[test]
    fn test_time_saved_uses_prior_rate() {
        let mut processor = PrimaryProcessor::new(&TrackerConfig::default());
        let tracking = ctx(TrackingStatus::Tracking, true);
        let t0 = Utc::now();
        let normal = primary(47.0, 8.0, 90.0, false);
        let mut warp = normal.clone();
        warp.sim_rate = 4.0;

        processor.process(&ChangeEvent::first(normal.clone(), t0), &tracking);
        processor.process(&change_at(normal.clone(), warp.clone(), t0, 1000), &tracking);
        // 60 s later back to 1x
        let actions = processor.process(
            &ChangeEvent::new(warp, normal, Some(t0), t0 + Duration::seconds(61)),
            &tracking,
        );
        assert!(actions.contains(&Action::TimeSaved { secs: 240.0 }));
    }

    #[test]
    fn test_airborne_and_landing_fast_rate() {
        let mut processor = PrimaryProcessor::new(&TrackerConfig::default());
        let t0 = Utc::now();
        let ground = primary(47.0, 8.0, 90.0, true);
        let mut air = primary(47.0, 8.0, 90.0, false);
        air.radio_height_ft = 50.0;

        let actions = processor.process(&change_at(ground, air.clone(), t0, 100), &ctx(TrackingStatus::Tracking, false));
        assert!(actions.contains(&Action::MarkAirborne));
        assert!(actions.contains(&Action::SetLandingFastRate(true)));

        let mut high = air.clone();
        high.radio_height_ft = 1500.0;
        let actions = processor.process(&change_at(air, high, t0, 200), &ctx(TrackingStatus::Tracking, true));
        assert!(!actions.contains(&Action::MarkAirborne));
        assert!(actions.contains(&Action::SetLandingFastRate(false)));
    }

    #[test]
    fn test_taxi_in_tracks_turn_off() {
        let mut processor = PrimaryProcessor::new(&TrackerConfig::default());
        let t0 = Utc::now();
        let tracking = ctx(TrackingStatus::Tracking, true);
        let air = primary(47.0, 8.0, 280.0, false);
        let touchdown = primary(47.0, 8.0001, 280.0, true);
        processor.process(&change_at(air, touchdown.clone(), t0, 100), &tracking);
        assert_eq!(processor.taxi_in_state(), Some(false));

        let exit = primary(47.0, 8.0002, 350.0, true);
        processor.process(&change_at(touchdown, exit, t0, 200), &tracking);
        assert_eq!(processor.taxi_in_state(), Some(true));
    }

    #[test]
    fn test_turn_window_respects_spacing() {
        let mut processor = PrimaryProcessor::new(&TrackerConfig::default());
        let t0 = Utc::now();
        let tracking = ctx(TrackingStatus::Tracking, true);
        let mut previous = primary(47.0, 8.0, 0.0, false);
        processor.process(&ChangeEvent::first(previous.clone(), t0), &tracking);
        // 2°/sample every 100 ms: only every fifth sample enters the window
        for i in 1..=10 {
            let next = primary(47.0, 8.0, i as f64 * 2.0, false);
            processor.process(&change_at(previous.clone(), next.clone(), t0, i * 100), &tracking);
            previous = next;
        }
        // window holds headings 0, 10, 20
        assert!(processor.is_turning());

        let mut steady = PrimaryProcessor::new(&TrackerConfig::default());
        let level = primary(47.0, 8.0, 45.0, false);
        for i in 0..12 {
            steady.process(&change_at(level.clone(), level.clone(), t0, i * 500), &tracking);
        }
        assert!(!steady.is_turning());
        assert_eq!(steady.vertical_profile(), VerticalProfile::Level);
    }
}
