use std::time::{Duration, Instant};

use crate::config::TrackerConfig;

/// Connection retry state for the telemetry source
///
/// The wait between attempts depends on whether a flight is bound: with
/// a flight at stake the source is probed often, otherwise the loop
/// idles on the longer interval. The source may stay absent forever.
#[derive(Clone, Debug)]
pub struct ReconnectState {
    pub connected: bool,
    pub attempts: u32,
    pub next_attempt: Instant,
    pub idle_backoff: Duration,
    pub bound_backoff: Duration,
}

impl ReconnectState {
    pub fn new(config: &TrackerConfig) -> Self {
        ReconnectState {
            connected: false,
            attempts: 0,
            next_attempt: Instant::now(),
            idle_backoff: Duration::from_secs(config.reconnect_idle_secs),
            bound_backoff: Duration::from_secs(config.reconnect_bound_secs),
        }
    }

    /// Check if an attempt should be made now
    pub fn can_retry(&self, now: Instant) -> bool {
        !self.connected && now >= self.next_attempt
    }

    pub fn backoff(&self, flight_bound: bool) -> Duration {
        if flight_bound {
            self.bound_backoff
        } else {
            self.idle_backoff
        }
    }

    /// Record a failed connect and schedule the next attempt
    pub fn record_failed_attempt(&mut self, now: Instant, flight_bound: bool) -> Duration {
        self.attempts += 1;
        let wait = self.backoff(flight_bound);
        self.next_attempt = now + wait;
        log::debug!(
            "Telemetry source connect attempt {} failed, next retry in {:.0}s",
            self.attempts,
            wait.as_secs_f64()
        );
        wait
    }

    pub fn record_success(&mut self) {
        if self.attempts > 0 {
            log::info!("Telemetry source connected after {} attempt(s)", self.attempts + 1);
        } else {
            log::info!("Telemetry source connected");
        }
        self.connected = true;
        self.attempts = 0;
    }

    /// Connection dropped; the first retry happens right away
    pub fn record_lost(&mut self, now: Instant) {
        self.connected = false;
        self.next_attempt = now;
    }

    /// A flight was bound while waiting on the idle backoff: pull the
    /// next attempt forward to the bound backoff
    pub fn tighten(&mut self, now: Instant) {
        let bound_deadline = now + self.bound_backoff;
        if !self.connected && self.next_attempt > bound_deadline {
            self.next_attempt = bound_deadline;
        }
    }

    pub fn status(&self, now: Instant) -> String {
        if self.connected {
            return "source: CONNECTED".to_string();
        }
        let wait = self.next_attempt.saturating_duration_since(now).as_secs_f64();
        format!("source: DISCONNECTED (retry in {:.1}s, attempt {})", wait, self.attempts)
    }
}
