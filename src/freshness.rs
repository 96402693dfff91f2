use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::TrackerConfig;
use crate::types::Category;

/// Receive bookkeeping for a single telemetry category
#[derive(Clone, Debug)]
pub struct CategoryFreshness {
    pub category: Category,
    pub interval: Duration,
    pub last_received: Option<Instant>,
    pub last_requested: Option<Instant>,
    pub samples: u64,
}

impl CategoryFreshness {
    pub fn new(category: Category, interval: Duration) -> Self {
        CategoryFreshness {
            category,
            interval,
            last_received: None,
            last_requested: None,
            samples: 0,
        }
    }

    /// Whether a new sample should be requested now
    pub fn is_due(&self, now: Instant) -> bool {
        let received_due = self
            .last_received
            .map(|t| now.saturating_duration_since(t) > self.interval)
            .unwrap_or(true);
        // don't re-request while a request of this interval is still in flight
        let request_due = self
            .last_requested
            .map(|t| now.saturating_duration_since(t) > self.interval)
            .unwrap_or(true);
        received_due && request_due
    }

    pub fn time_since_last_received(&self, now: Instant) -> Option<Duration> {
        self.last_received.map(|t| now.saturating_duration_since(t))
    }

    /// Nothing received for three intervals (or never)
    pub fn is_stale(&self, now: Instant) -> bool {
        self.time_since_last_received(now)
            .map(|d| d > self.interval * 3)
            .unwrap_or(true)
    }
}

/// Freshness row for status display
#[derive(Clone, Debug, Serialize)]
pub struct FreshnessReport {
    pub category: Category,
    pub interval_ms: u64,
    pub samples: u64,
    pub silence_secs: Option<f64>,
    pub stale: bool,
}

/// Per-category request scheduling and staleness, shared between the
/// acquisition loop and status reporting
pub struct FreshnessTable {
    entries: Mutex<BTreeMap<Category, CategoryFreshness>>,
}

impl FreshnessTable {
    pub fn new(config: &TrackerConfig) -> Self {
        let entries = Category::ALL
            .iter()
            .map(|c| (*c, CategoryFreshness::new(*c, config.interval(*c))))
            .collect();
        FreshnessTable { entries: Mutex::new(entries) }
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut BTreeMap<Category, CategoryFreshness>) -> R) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut entries)
    }

    /// Categories to request this tick; primary is always included
    pub fn due_categories(&self, now: Instant) -> Vec<Category> {
        self.with_entries(|entries| {
            entries
                .values()
                .filter(|e| e.category == Category::Primary || e.is_due(now))
                .map(|e| e.category)
                .collect()
        })
    }

    pub fn mark_requested(&self, category: Category, now: Instant) {
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(&category) {
                entry.last_requested = Some(now);
            }
        })
    }

    pub fn mark_received(&self, category: Category, now: Instant) {
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(&category) {
                entry.last_received = Some(now);
                entry.samples += 1;
            }
        })
    }

    pub fn interval(&self, category: Category) -> Duration {
        self.with_entries(|entries| {
            entries
                .get(&category)
                .map(|e| e.interval)
                .unwrap_or(Duration::from_secs(1))
        })
    }

    /// Returns true when the interval actually changed
    pub fn set_interval(&self, category: Category, interval: Duration) -> bool {
        self.with_entries(|entries| match entries.get_mut(&category) {
            Some(entry) if entry.interval != interval => {
                entry.interval = interval;
                // let the new rate take effect on the next tick
                entry.last_requested = None;
                true
            }
            _ => false,
        })
    }

    /// Forget receive history, e.g. after reconnecting
    pub fn reset(&self) {
        self.with_entries(|entries| {
            for entry in entries.values_mut() {
                entry.last_received = None;
                entry.last_requested = None;
            }
        })
    }

    pub fn report(&self, now: Instant) -> Vec<FreshnessReport> {
        self.with_entries(|entries| {
            entries
                .values()
                .map(|e| FreshnessReport {
                    category: e.category,
                    interval_ms: e.interval.as_millis() as u64,
                    samples: e.samples,
                    silence_secs: e.time_since_last_received(now).map(|d| d.as_secs_f64()),
                    stale: e.is_stale(now),
                })
                .collect()
        })
    }

    /// Format freshness for logging
    pub fn format_status(&self, now: Instant) -> String {
        let parts: Vec<String> = self
            .report(now)
            .into_iter()
            .map(|r| match (r.stale, r.silence_secs) {
                (false, _) => format!("{} ok", r.category.name()),
                (true, Some(secs)) => format!("{} silent {:.1}s", r.category.name(), secs),
                (true, None) => format!("{} never", r.category.name()),
            })
            .collect();
        format!("Telemetry: {}", parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_received_is_due_and_stale() {
        let entry = CategoryFreshness::new(Category::Fuel, Duration::from_secs(5));
        let now = Instant::now();
        assert!(entry.is_due(now));
        assert!(entry.is_stale(now));
    }

    #[test]
    fn test_due_after_interval() {
        let mut entry = CategoryFreshness::new(Category::Fuel, Duration::from_millis(100));
        let t0 = Instant::now();
        entry.last_received = Some(t0);
        entry.last_requested = Some(t0);
        assert!(!entry.is_due(t0 + Duration::from_millis(50)));
        assert!(entry.is_due(t0 + Duration::from_millis(150)));
    }

    #[test]
    fn test_primary_always_requested() {
        let table = FreshnessTable::new(&TrackerConfig::default());
        let now = Instant::now();
        for category in Category::ALL {
            table.mark_requested(category, now);
            table.mark_received(category, now);
        }
        let due = table.due_categories(now + Duration::from_millis(1));
        assert_eq!(due, vec![Category::Primary]);
    }

    #[test]
    fn test_set_interval_reports_change() {
        let table = FreshnessTable::new(&TrackerConfig::default());
        assert!(table.set_interval(Category::LandingAnalysis, Duration::from_millis(25)));
        assert!(!table.set_interval(Category::LandingAnalysis, Duration::from_millis(25)));
        assert_eq!(table.interval(Category::LandingAnalysis), Duration::from_millis(25));
    }

    #[test]
    fn test_format_status() {
        let table = FreshnessTable::new(&TrackerConfig::default());
        let now = Instant::now();
        table.mark_received(Category::Primary, now);
        let status = table.format_status(now);
        assert!(status.contains("primary ok"));
        assert!(status.contains("fuel never"));
    }
}
