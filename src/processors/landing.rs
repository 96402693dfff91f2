use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, EventColor, TrackingContext};
use crate::types::{ChangeEvent, LandingAnalysis};

/// One touchdown
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandingReport {
    pub touched_down_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub heading_true_deg: f64,
    /// Positive when descending
    pub landing_rate_fpm: f64,
    pub g_force: f64,
    pub speed_lateral_kt: f64,
    pub speed_longitudinal_kt: f64,
    pub wind_lateral_kt: f64,
    pub wind_longitudinal_kt: f64,
    pub bank_deg: f64,
    pub ground_speed_kt: f64,
    pub airspeed_true_kt: f64,
}

impl LandingReport {
    pub fn from_change(change: &ChangeEvent<LandingAnalysis>) -> Self {
        let new = &change.new;
        LandingReport {
            touched_down_at: change.received_at,
            latitude: new.latitude,
            longitude: new.longitude,
            heading_true_deg: new.heading_true_deg,
            landing_rate_fpm: -new.vertical_speed_fpm,
            g_force: change.old.g_force.max(new.g_force),
            speed_lateral_kt: new.speed_lateral_kt,
            speed_longitudinal_kt: new.speed_longitudinal_kt,
            wind_lateral_kt: new.wind_lateral_kt,
            wind_longitudinal_kt: new.wind_longitudinal_kt,
            bank_deg: new.bank_deg,
            ground_speed_kt: new.ground_speed_kt,
            airspeed_true_kt: new.airspeed_true_kt,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Touchdown at {:.0} fpm, {:.2} G, bank {:.1}°, crosswind {:.0} kt",
            self.landing_rate_fpm,
            self.g_force,
            self.bank_deg,
            self.wind_lateral_kt.abs()
        )
    }
}

/// Detects touchdowns in the landing analysis stream
#[derive(Debug, Default)]
pub struct LandingProcessor;

impl LandingProcessor {
    pub fn process(&mut self, change: &ChangeEvent<LandingAnalysis>, ctx: &TrackingContext) -> Vec<Action> {
        if change.is_first() || !ctx.is_tracking() {
            return Vec::new();
        }
        if change.old.on_ground || !change.new.on_ground {
            return Vec::new();
        }

        let report = LandingReport::from_change(change);
        log::info!("{}", report.summary());

        let mut actions = Vec::new();
        if ctx.landing_count == 0 {
            actions.push(Action::event(EventColor::Green, report.summary()));
            actions.push(Action::Announce(format!(
                "Touchdown, {:.0} feet per minute",
                report.landing_rate_fpm
            )));
        } else {
            actions.push(Action::event(
                EventColor::Blue,
                format!("Additional touchdown at {:.0} fpm", report.landing_rate_fpm),
            ));
        }
        actions.push(Action::Landing(report));
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrackingStatus;
    use chrono::Duration;

    fn sample(on_ground: bool, vs: f64, g: f64) -> LandingAnalysis {
        LandingAnalysis {
            on_ground,
            latitude: 47.45,
            longitude: 8.56,
            vertical_speed_fpm: vs,
            g_force: g,
            wind_lateral_kt: -7.0,
            ground_speed_kt: 128.0,
            airspeed_true_kt: 131.0,
            ..Default::default()
        }
    }

    fn tracking() -> TrackingContext {
        TrackingContext { status: TrackingStatus::Tracking, ..Default::default() }
    }

    fn change(old: LandingAnalysis, new: LandingAnalysis) -> ChangeEvent<LandingAnalysis> {
        let t0 = Utc::now();
        ChangeEvent::new(old, new, Some(t0), t0 + Duration::milliseconds(25))
    }

    #[test]
    fn test_touchdown_creates_report() {
        let mut processor = LandingProcessor;
        let actions = processor.process(
            &change(sample(false, -180.0, 1.1), sample(true, -142.0, 1.4)),
            &tracking(),
        );

        let report = actions
            .iter()
            .find_map(|a| match a {
                Action::Landing(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(report.landing_rate_fpm, 142.0);
        assert_eq!(report.g_force, 1.4);
        assert_eq!(report.ground_speed_kt, 128.0);
        assert!(actions.iter().any(|a| matches!(a, Action::Announce(_))));
    }

    #[test]
    fn test_g_force_takes_max_of_pair() {
        let report = LandingReport::from_change(&change(
            sample(false, -300.0, 1.9),
            sample(true, -250.0, 1.2),
        ));
        assert_eq!(report.g_force, 1.9);
    }

    #[test]
    fn test_second_touchdown_not_announced() {
        let mut processor = LandingProcessor;
        let ctx = TrackingContext { landing_count: 1, ..tracking() };
        let actions = processor.process(&change(sample(false, -100.0, 1.0), sample(true, -90.0, 1.1)), &ctx);
        assert!(actions.iter().any(|a| matches!(a, Action::Landing(_))));
        assert!(!actions.iter().any(|a| matches!(a, Action::Announce(_))));
    }

    #[test]
    fn test_no_report_outside_tracking_or_on_first_sample() {
        let mut processor = LandingProcessor;
        let ground_ops = TrackingContext { status: TrackingStatus::GroundOperations, ..Default::default() };
        assert!(processor
            .process(&change(sample(false, -100.0, 1.0), sample(true, -90.0, 1.1)), &ground_ops)
            .is_empty());

        let first = ChangeEvent::first(sample(true, 0.0, 1.0), Utc::now());
        assert!(processor.process(&first, &tracking()).is_empty());
    }

    #[test]
    fn test_staying_on_ground_is_not_a_landing() {
        let mut processor = LandingProcessor;
        assert!(processor
            .process(&change(sample(true, 0.0, 1.0), sample(true, 0.0, 1.0)), &tracking())
            .is_empty());
    }
}
