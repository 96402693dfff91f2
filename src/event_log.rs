//! Event and marker log.
//!
//! Two views of the same tracking events are kept: the flat, time-ordered
//! log and the map markers, where events close to the previous event
//! marker are merged into it. Position report markers are a separate
//! breadcrumb trail spaced by flight regime.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::processors::EventColor;
use crate::types::{EngineType, GeoPosition, PrimaryTracking};

/// Radio height under which jets and turboprops count as low
pub const LOW_ALTITUDE_FT_JET: f64 = 2_500.0;
/// Radio height under which everything else counts as low
pub const LOW_ALTITUDE_FT_OTHER: f64 = 1_000.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingEventLogEntry {
    pub timestamp: DateTime<Utc>,
    pub color: EventColor,
    pub text: String,
    pub position: GeoPosition,
    pub altitude_ft: f64,
}

/// Map marker aggregating the events of one location cluster
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingEventMarker {
    pub id: u64,
    pub position: GeoPosition,
    pub events: Vec<TrackingEventLogEntry>,
}

impl TrackingEventMarker {
    /// Most severe color among the sub-events
    pub fn color(&self) -> EventColor {
        self.events
            .iter()
            .map(|e| e.color)
            .max_by_key(|c| match c {
                EventColor::Gray => 0,
                EventColor::Blue => 1,
                EventColor::Green => 2,
                EventColor::Orange => 3,
                EventColor::Red => 4,
            })
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionMarker {
    pub timestamp: DateTime<Utc>,
    pub position: GeoPosition,
    pub altitude_ft: f64,
    pub heading_true_deg: f64,
    pub ground_speed_kt: f64,
    pub on_ground: bool,
}

/// Outcome of adding an event to the marker view
#[derive(Clone, Debug, PartialEq)]
pub enum MarkerUpdate {
    Created(TrackingEventMarker),
    Appended(TrackingEventMarker),
}

/// Flight regime for position report spacing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionRegime {
    GroundTurning,
    GroundStraight,
    LowTurning,
    LowStraight,
    HighTurning,
    HighStraight,
}

impl PositionRegime {
    pub fn classify(on_ground: bool, turning: bool, low_altitude: bool) -> Self {
        match (on_ground, low_altitude, turning) {
            (true, _, true) => PositionRegime::GroundTurning,
            (true, _, false) => PositionRegime::GroundStraight,
            (false, true, true) => PositionRegime::LowTurning,
            (false, true, false) => PositionRegime::LowStraight,
            (false, false, true) => PositionRegime::HighTurning,
            (false, false, false) => PositionRegime::HighStraight,
        }
    }

    /// (multiplier, lower bound, upper bound)
    fn params(&self) -> (f64, f64, f64) {
        match self {
            PositionRegime::GroundTurning => (1.0, 15.0, 30.0),
            PositionRegime::GroundStraight => (6.0, 50.0, 500.0),
            PositionRegime::LowTurning => (2.0, 100.0, 300.0),
            PositionRegime::LowStraight => (10.0, 200.0, 1_000.0),
            PositionRegime::HighTurning => (2.0, 300.0, 1_000.0),
            PositionRegime::HighStraight => (22.0, 2_000.0, 10_000.0),
        }
    }

    /// Minimum distance (m) between position markers at this ground speed
    pub fn min_distance_m(&self, ground_speed_kt: f64) -> f64 {
        let (k, lo, hi) = self.params();
        (k * ground_speed_kt.max(0.0)).clamp(lo, hi)
    }
}

pub fn low_altitude_threshold_ft(engine_type: EngineType) -> f64 {
    if engine_type.is_jet_or_turboprop() {
        LOW_ALTITUDE_FT_JET
    } else {
        LOW_ALTITUDE_FT_OTHER
    }
}

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<TrackingEventLogEntry>,
    markers: Vec<TrackingEventMarker>,
    last_marker: Option<usize>,
    positions: Vec<PositionMarker>,
    next_id: u64,
}

/// Collection-level locked event log
#[derive(Debug)]
pub struct EventLog {
    inner: Mutex<LogInner>,
    coalesce_distance_m: f64,
}

impl EventLog {
    pub fn new(coalesce_distance_m: f64) -> Self {
        EventLog { inner: Mutex::new(LogInner::default()), coalesce_distance_m }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut LogInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut inner)
    }

    /// Append to the flat log and merge into the current marker or start
    /// a new one
    pub fn add_event(
        &self,
        timestamp: DateTime<Utc>,
        color: EventColor,
        text: &str,
        position: GeoPosition,
        altitude_ft: f64,
    ) -> MarkerUpdate {
        let entry = TrackingEventLogEntry {
            timestamp,
            color,
            text: text.to_string(),
            position,
            altitude_ft,
        };
        let coalesce_m = self.coalesce_distance_m;

        self.with_inner(|inner| {
            inner.entries.push(entry.clone());

            if let Some(index) = inner.last_marker {
                let marker = &mut inner.markers[index];
                if marker.position.distance_m(&position) <= coalesce_m {
                    marker.events.push(entry);
                    return MarkerUpdate::Appended(marker.clone());
                }
            }

            inner.next_id += 1;
            let marker = TrackingEventMarker {
                id: inner.next_id,
                position,
                events: vec![entry],
            };
            inner.markers.push(marker.clone());
            inner.last_marker = Some(inner.markers.len() - 1);
            MarkerUpdate::Created(marker)
        })
    }

    /// Add a breadcrumb if the aircraft moved far enough for its regime
    pub fn add_position_report(
        &self,
        timestamp: DateTime<Utc>,
        primary: &PrimaryTracking,
        turning: bool,
        engine_type: EngineType,
    ) -> Option<PositionMarker> {
        let low = primary.radio_height_ft < low_altitude_threshold_ft(engine_type);
        let regime = PositionRegime::classify(primary.on_ground, turning, low);
        let min_distance = regime.min_distance_m(primary.ground_speed_kt);
        let position = primary.position();

        self.with_inner(|inner| {
            if let Some(last) = inner.positions.last() {
                if last.position.distance_m(&position) < min_distance {
                    return None;
                }
            }
            let marker = PositionMarker {
                timestamp,
                position,
                altitude_ft: primary.altitude_ft,
                heading_true_deg: primary.heading_true_deg,
                ground_speed_kt: primary.ground_speed_kt,
                on_ground: primary.on_ground,
            };
            inner.positions.push(marker.clone());
            Some(marker)
        })
    }

    /// Visit every marker under the collection lock, in creation order
    pub fn replay_markers(&self, mut visit: impl FnMut(&TrackingEventMarker)) {
        self.with_inner(|inner| inner.markers.iter().for_each(&mut visit))
    }

    pub fn entries(&self) -> Vec<TrackingEventLogEntry> {
        self.with_inner(|inner| inner.entries.clone())
    }

    pub fn markers(&self) -> Vec<TrackingEventMarker> {
        self.with_inner(|inner| inner.markers.clone())
    }

    pub fn positions(&self) -> Vec<PositionMarker> {
        self.with_inner(|inner| inner.positions.clone())
    }

    pub fn len(&self) -> usize {
        self.with_inner(|inner| inner.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.with_inner(|inner| *inner = LogInner::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // ~1 m of latitude
    const METER_LAT: f64 = 1.0 / 111_195.0;

    #[test]
    fn test_close_events_coalesce() {
        let log = EventLog::new(20.0);
        let t0 = Utc::now();
        let here = GeoPosition::new(47.0, 8.0);
        let near = GeoPosition::new(47.0 + 10.0 * METER_LAT, 8.0);
        let far = GeoPosition::new(47.0 + 60.0 * METER_LAT, 8.0);

        assert!(matches!(log.add_event(t0, EventColor::Gray, "Beacon light on", here, 0.0), MarkerUpdate::Created(_)));
        match log.add_event(t0, EventColor::Blue, "Engine started", near, 0.0) {
            MarkerUpdate::Appended(marker) => assert_eq!(marker.events.len(), 2),
            other => panic!("expected append, got {:?}", other),
        }
        assert_eq!(log.markers().len(), 1);

        assert!(matches!(log.add_event(t0, EventColor::Gray, "Taxi lights on", far, 0.0), MarkerUpdate::Created(_)));
        let markers = log.markers();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].events.len(), 2);
        assert_eq!(markers[1].events.len(), 1);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_only_last_marker_is_open() {
        let log = EventLog::new(20.0);
        let t0 = Utc::now();
        let a = GeoPosition::new(47.0, 8.0);
        let b = GeoPosition::new(47.0 + 100.0 * METER_LAT, 8.0);
        log.add_event(t0, EventColor::Gray, "one", a, 0.0);
        log.add_event(t0, EventColor::Gray, "two", b, 0.0);
        // back at the first location: the first marker is frozen
        log.add_event(t0, EventColor::Gray, "three", a, 0.0);
        assert_eq!(log.markers().len(), 3);
    }

    #[test]
    fn test_marker_color_is_most_severe() {
        let log = EventLog::new(20.0);
        let p = GeoPosition::new(47.0, 8.0);
        log.add_event(Utc::now(), EventColor::Gray, "a", p, 0.0);
        log.add_event(Utc::now(), EventColor::Red, "b", p, 0.0);
        log.add_event(Utc::now(), EventColor::Blue, "c", p, 0.0);
        assert_eq!(log.markers()[0].color(), EventColor::Red);
    }

    #[test]
    fn test_replay_visits_in_order() {
        let log = EventLog::new(20.0);
        let t0 = Utc::now();
        for i in 0..3 {
            log.add_event(
                t0 + Duration::seconds(i),
                EventColor::Gray,
                &format!("event {}", i),
                GeoPosition::new(47.0 + i as f64 * 0.01, 8.0),
                0.0,
            );
        }
        let mut ids = Vec::new();
        log.replay_markers(|m| ids.push(m.id));
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_regime_ordering() {
        for speed in [0.0, 5.0, 10.0, 50.0, 120.0, 250.0, 480.0, 1000.0] {
            assert!(
                PositionRegime::GroundStraight.min_distance_m(speed)
                    > PositionRegime::GroundTurning.min_distance_m(speed)
            );
            assert!(
                PositionRegime::HighTurning.min_distance_m(speed)
                    >= PositionRegime::LowTurning.min_distance_m(speed)
            );
            assert!(
                PositionRegime::HighStraight.min_distance_m(speed)
                    > PositionRegime::LowStraight.min_distance_m(speed)
            );
        }
    }

    #[test]
    fn test_min_distance_non_decreasing_in_speed() {
        let regimes = [
            PositionRegime::GroundTurning,
            PositionRegime::GroundStraight,
            PositionRegime::LowTurning,
            PositionRegime::LowStraight,
            PositionRegime::HighTurning,
            PositionRegime::HighStraight,
        ];
        for regime in regimes {
            let mut previous = 0.0;
            for step in 0..=1200 {
                let d = regime.min_distance_m(step as f64);
                assert!(d >= previous, "{:?} decreased at {} kt", regime, step);
                previous = d;
            }
        }
    }

    #[test]
    fn test_clamp_table_values() {
        assert_eq!(PositionRegime::GroundTurning.min_distance_m(20.0), 20.0);
        assert_eq!(PositionRegime::GroundStraight.min_distance_m(5.0), 50.0);
        assert_eq!(PositionRegime::LowStraight.min_distance_m(60.0), 600.0);
        assert_eq!(PositionRegime::HighStraight.min_distance_m(450.0), 9_900.0);
        assert_eq!(PositionRegime::HighStraight.min_distance_m(600.0), 10_000.0);
    }

    #[test]
    fn test_position_reports_spaced() {
        let log = EventLog::new(20.0);
        let t0 = Utc::now();
        let mut primary = PrimaryTracking {
            latitude: 47.0,
            longitude: 8.0,
            on_ground: true,
            ground_speed_kt: 20.0,
            ..Default::default()
        };
        // ground straight at 20 kt needs 120 m
        assert!(log.add_position_report(t0, &primary, false, EngineType::Piston).is_some());
        primary.latitude += 100.0 * METER_LAT;
        assert!(log.add_position_report(t0, &primary, false, EngineType::Piston).is_none());
        // turning needs only 20 m
        assert!(log.add_position_report(t0, &primary, true, EngineType::Piston).is_some());
        assert_eq!(log.positions().len(), 2);
    }

    #[test]
    fn test_low_altitude_depends_on_engine_type() {
        assert_eq!(low_altitude_threshold_ft(EngineType::Jet), 2_500.0);
        assert_eq!(low_altitude_threshold_ft(EngineType::Turboprop), 2_500.0);
        assert_eq!(low_altitude_threshold_ft(EngineType::Piston), 1_000.0);
    }
}
