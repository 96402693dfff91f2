use chrono::{DateTime, Utc};

/// Emits on a false→true edge at most once per cooldown
#[derive(Clone, Debug)]
pub struct DebouncedWarning {
    cooldown_secs: f64,
    last_emitted: Option<DateTime<Utc>>,
}

impl DebouncedWarning {
    pub fn new(cooldown_secs: f64) -> Self {
        DebouncedWarning { cooldown_secs, last_emitted: None }
    }

    /// Returns true if an event should be emitted for this transition
    pub fn check(&mut self, old: bool, new: bool, at: DateTime<Utc>) -> bool {
        if old || !new {
            return false;
        }
        let cooled = self
            .last_emitted
            .map(|last| (at - last).num_milliseconds() as f64 / 1000.0 >= self.cooldown_secs)
            .unwrap_or(true);
        if cooled {
            self.last_emitted = Some(at);
        }
        cooled
    }

    pub fn reset(&mut self) {
        self.last_emitted = None;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatchChange {
    Raised,
    Cleared,
    Unchanged,
}

/// Warning that fires once when a condition starts holding and clears
/// when it stops
#[derive(Clone, Debug, Default)]
pub struct StateLatch {
    raised: bool,
}

impl StateLatch {
    pub fn update(&mut self, violating: bool) -> LatchChange {
        match (self.raised, violating) {
            (false, true) => {
                self.raised = true;
                LatchChange::Raised
            }
            (true, false) => {
                self.raised = false;
                LatchChange::Cleared
            }
            _ => LatchChange::Unchanged,
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_only_rising_edges() {
        let mut warning = DebouncedWarning::new(10.0);
        let t0 = Utc::now();
        assert!(!warning.check(false, false, t0));
        assert!(!warning.check(true, true, t0));
        assert!(!warning.check(true, false, t0));
        assert!(warning.check(false, true, t0));
    }

    #[test]
    fn test_cooldown() {
        let mut warning = DebouncedWarning::new(10.0);
        let t0 = Utc::now();
        assert!(warning.check(false, true, t0));
        assert!(!warning.check(false, true, t0 + Duration::seconds(5)));
        // suppressed edges don't extend the cooldown
        assert!(warning.check(false, true, t0 + Duration::seconds(10)));
        assert!(!warning.check(false, true, t0 + Duration::seconds(19)));
    }

    #[test]
    fn test_latch_fires_once_per_violation() {
        let mut latch = StateLatch::default();
        assert_eq!(latch.update(false), LatchChange::Unchanged);
        assert_eq!(latch.update(true), LatchChange::Raised);
        assert_eq!(latch.update(true), LatchChange::Unchanged);
        assert!(latch.is_raised());
        assert_eq!(latch.update(false), LatchChange::Cleared);
        assert_eq!(latch.update(true), LatchChange::Raised);
    }
}
