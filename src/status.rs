use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::error::TrackerResult;
use crate::freshness::FreshnessReport;
use crate::processors::windows::VerticalProfile;
use crate::session::conditions::TrackingCondition;
use crate::session::Tracker;
use crate::types::TrackingStatus;

/// Snapshot of the tracker for an external dashboard, rewritten every
/// couple of seconds by the binary
#[derive(Serialize, Clone, Debug)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub status: TrackingStatus,
    pub connected: bool,
    pub flight_id: Option<String>,
    pub resumable: bool,
    // Counters
    pub events_logged: usize,
    pub markers: usize,
    pub position_markers: usize,
    pub landings: usize,
    // Last position
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_ft: Option<f64>,
    pub on_ground: Option<bool>,
    pub vertical_profile: VerticalProfile,
    pub freshness: Vec<FreshnessReport>,
    pub conditions: Vec<TrackingCondition>,
}

impl LiveStatus {
    pub fn capture(tracker: &Tracker, started: Instant) -> Self {
        let now = Instant::now();
        let flight = tracker.flight();
        let primary = tracker.latest().primary;
        let events = tracker.events();
        LiveStatus {
            timestamp: current_timestamp(),
            uptime_seconds: now.duration_since(started).as_secs(),
            status: tracker.status(),
            connected: tracker.is_connected(),
            flight_id: flight.as_ref().map(|f| f.id.clone()),
            resumable: flight.map(|f| f.resumable).unwrap_or(false),
            events_logged: events.len(),
            markers: events.markers().len(),
            position_markers: events.positions().len(),
            landings: tracker.landings().len(),
            latitude: primary.as_ref().map(|p| p.latitude),
            longitude: primary.as_ref().map(|p| p.longitude),
            altitude_ft: primary.as_ref().map(|p| p.altitude_ft),
            on_ground: primary.as_ref().map(|p| p.on_ground),
            vertical_profile: tracker.vertical_profile(),
            freshness: tracker.freshness().report(now),
            conditions: tracker.conditions(),
        }
    }

    pub fn save(&self, path: &Path) -> TrackerResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
