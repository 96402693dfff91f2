use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::TrackerConfig;
use crate::session::Tracker;

const TICK: Duration = Duration::from_secs(1);

/// Fixed-interval debounce; the first check only starts the clock
#[derive(Clone, Debug)]
pub struct Cadence {
    interval: Duration,
    last: Option<Instant>,
}

impl Cadence {
    pub fn new(interval: Duration) -> Self {
        Cadence { interval, last: None }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                false
            }
            Some(last) if now.duration_since(last) >= self.interval => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// What is due this tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DueWork {
    pub autosave: bool,
    pub position_report: bool,
    pub upload: bool,
}

impl DueWork {
    pub fn any(&self) -> bool {
        self.autosave || self.position_report || self.upload
    }
}

/// Save, position report and upload cadences of one active session
#[derive(Clone, Debug)]
pub struct SessionSchedule {
    autosave: Cadence,
    position_report: Cadence,
    upload: Cadence,
}

impl SessionSchedule {
    pub fn new(config: &TrackerConfig) -> Self {
        SessionSchedule {
            autosave: Cadence::new(Duration::from_secs(config.save_interval_secs)),
            position_report: Cadence::new(Duration::from_secs(config.position_report_interval_secs)),
            upload: Cadence::new(Duration::from_secs(config.autosave_upload_interval_secs)),
        }
    }

    /// Outside an active session nothing is due and the clocks restart
    pub fn tick(&mut self, now: Instant, active: bool) -> DueWork {
        if !active {
            self.reset();
            return DueWork::default();
        }
        DueWork {
            autosave: self.autosave.due(now),
            position_report: self.position_report.due(now),
            upload: self.upload.due(now),
        }
    }

    pub fn reset(&mut self) {
        self.autosave.reset();
        self.position_report.reset();
        self.upload.reset();
    }
}

/// Background save/report/upload loop. Each piece of due work runs on
/// its own task so a slow upload never delays the next save.
pub async fn run_schedule_loop(tracker: Arc<Tracker>) {
    let mut schedule = SessionSchedule::new(tracker.config());
    log::debug!("Save schedule started");

    while !tracker.is_closing() {
        let due = schedule.tick(Instant::now(), tracker.status().is_active());

        if due.autosave {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                match tracker.autosave().await {
                    Ok(true) => {}
                    Ok(false) => log::debug!("Auto-save skipped this cycle"),
                    Err(e) => log::warn!("Auto-save failed: {}", e),
                }
            });
        }
        if due.position_report {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                if let Err(e) = tracker.send_position_report().await {
                    log::warn!("Position report failed: {}", e);
                }
            });
        }
        if due.upload {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                if let Err(e) = tracker.upload_auto_save().await {
                    log::warn!("Auto-save upload failed: {}", e);
                }
            });
        }

        tokio::time::sleep(TICK).await;
    }
    log::debug!("Save schedule stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_first_check_starts_clock() {
        let mut cadence = Cadence::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(!cadence.due(t0));
        assert!(!cadence.due(t0 + Duration::from_secs(29)));
        assert!(cadence.due(t0 + Duration::from_secs(30)));
        assert!(!cadence.due(t0 + Duration::from_secs(31)));
        assert!(cadence.due(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_schedule_independent_cadences() {
        let config = TrackerConfig::default();
        let mut schedule = SessionSchedule::new(&config);
        let t0 = Instant::now();
        assert!(!schedule.tick(t0, true).any());

        let due = schedule.tick(t0 + Duration::from_secs(30), true);
        assert_eq!(due, DueWork { autosave: false, position_report: true, upload: false });

        let due = schedule.tick(t0 + Duration::from_secs(120), true);
        assert!(due.autosave);
        assert!(due.position_report);
        assert!(!due.upload);

        assert!(schedule.tick(t0 + Duration::from_secs(600), true).upload);
    }

    #[test]
    fn test_inactive_resets_clocks() {
        let config = TrackerConfig::default();
        let mut schedule = SessionSchedule::new(&config);
        let t0 = Instant::now();
        schedule.tick(t0, true);
        assert_eq!(schedule.tick(t0 + Duration::from_secs(200), false), DueWork::default());
        // restarted: nothing due right after becoming active again
        assert!(!schedule.tick(t0 + Duration::from_secs(400), true).any());
    }
}
