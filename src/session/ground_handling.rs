use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::TrackerConfig;

/// Fueling and boarding before tracking proper, modelled as a fixed
/// duration estimated from what has to be loaded
#[derive(Clone, Debug, PartialEq)]
pub struct GroundHandling {
    duration: ChronoDuration,
    started_at: Option<DateTime<Utc>>,
    complete: bool,
}

impl GroundHandling {
    pub fn estimate(fuel_gallons: f64, payload_lbs: f64, config: &TrackerConfig) -> Self {
        let fuel_secs = per_minute_secs(fuel_gallons, config.fuel_loading_gallons_per_min);
        let payload_secs = per_minute_secs(payload_lbs, config.payload_loading_lbs_per_min);
        let secs = (fuel_secs + payload_secs).max(config.ground_handling_min_secs as f64);
        GroundHandling {
            duration: ChronoDuration::milliseconds((secs * 1000.0) as i64),
            started_at: None,
            complete: false,
        }
    }

    /// Already done, e.g. for a session resumed after takeoff
    pub fn completed() -> Self {
        GroundHandling { duration: ChronoDuration::zero(), started_at: None, complete: true }
    }

    pub fn duration(&self) -> ChronoDuration {
        self.duration
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_none() && !self.complete {
            log::info!("Ground handling started, about {} s", self.duration.num_seconds());
            self.started_at = Some(now);
        }
    }

    /// Latches once the estimate has elapsed
    pub fn is_complete(&mut self, now: DateTime<Utc>) -> bool {
        if !self.complete {
            if let Some(started) = self.started_at {
                self.complete = now - started >= self.duration;
            }
        }
        self.complete
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> ChronoDuration {
        if self.complete {
            return ChronoDuration::zero();
        }
        match self.started_at {
            Some(started) => (self.duration - (now - started)).max(ChronoDuration::zero()),
            None => self.duration,
        }
    }

    /// 0.0 ..= 1.0
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        if self.complete || self.duration <= ChronoDuration::zero() {
            return 1.0;
        }
        let remaining = self.remaining(now).num_milliseconds() as f64;
        1.0 - remaining / self.duration.num_milliseconds() as f64
    }
}

fn per_minute_secs(amount: f64, per_minute: f64) -> f64 {
    if per_minute <= 0.0 {
        return 0.0;
    }
    amount.max(0.0) / per_minute * 60.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_estimate_from_loads() {
        let config = TrackerConfig::default();
        // 300 gal at 150/min = 120 s, 2000 lbs at 1000/min = 120 s
        let handling = GroundHandling::estimate(300.0, 2_000.0, &config);
        assert_eq!(handling.duration().num_seconds(), 240);

        let tiny = GroundHandling::estimate(10.0, 50.0, &config);
        assert_eq!(tiny.duration().num_seconds(), 30);
    }

    #[test]
    fn test_completes_after_duration() {
        let config = TrackerConfig::default();
        let mut handling = GroundHandling::estimate(0.0, 0.0, &config);
        let t0 = Utc::now();
        assert!(!handling.is_complete(t0));

        handling.start(t0);
        assert!(!handling.is_complete(t0 + ChronoDuration::seconds(29)));
        assert_relative_eq!(handling.progress(t0 + ChronoDuration::seconds(15)), 0.5);
        assert!(handling.is_complete(t0 + ChronoDuration::seconds(30)));
        // latched
        assert!(handling.is_complete(t0));
        assert_eq!(handling.remaining(t0), ChronoDuration::zero());
    }

    #[test]
    fn test_completed_needs_no_start() {
        let mut handling = GroundHandling::completed();
        assert!(handling.is_complete(Utc::now()));
        assert_relative_eq!(handling.progress(Utc::now()), 1.0);
    }
}
