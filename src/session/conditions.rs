//! Start/resume gates evaluated against live telemetry.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::Flight;
use crate::config::TrackerConfig;
use crate::persistence::artifact::{ResumePosition, SaveArtifact};
use crate::source::SimEvent;
use crate::types::raw::{fuel_to_raw, payload_to_raw};
use crate::types::{
    AircraftIdentity, Category, FuelTanks, GeoPosition, PayloadStations, PrimaryTracking, RawSample,
    SecondaryTracking,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    Time,
    Fuel,
    Payload,
    PlaneModel,
    Realism,
    Location,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 6] = [
        ConditionKind::Time,
        ConditionKind::Fuel,
        ConditionKind::Payload,
        ConditionKind::PlaneModel,
        ConditionKind::Realism,
        ConditionKind::Location,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConditionKind::Time => "Date and time",
            ConditionKind::Fuel => "Fuel",
            ConditionKind::Payload => "Payload",
            ConditionKind::PlaneModel => "Aircraft",
            ConditionKind::Realism => "Realism settings",
            ConditionKind::Location => "Location",
        }
    }

    /// Whether the tracker knows how to push the expected value itself
    pub fn can_auto_set(&self) -> bool {
        matches!(
            self,
            ConditionKind::Time | ConditionKind::Fuel | ConditionKind::Payload | ConditionKind::Location
        )
    }
}

/// One gate with its expected/current/met/auto-set facets
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingCondition {
    pub kind: ConditionKind,
    pub expected: String,
    pub current: String,
    pub met: bool,
    pub auto_set: bool,
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FuelTarget {
    Total(f64),
    /// Gallons by tank id
    PerTank(BTreeMap<u8, f64>),
}

impl FuelTarget {
    pub fn total_gallons(&self) -> f64 {
        match self {
            FuelTarget::Total(gallons) => *gallons,
            FuelTarget::PerTank(tanks) => tanks.values().sum(),
        }
    }

    /// Tank quantities to load, spread over installed tanks by capacity
    /// when only a total is known
    pub fn quantities(&self, live: &FuelTanks) -> BTreeMap<u8, f64> {
        match self {
            FuelTarget::PerTank(tanks) => tanks.clone(),
            FuelTarget::Total(gallons) => {
                let capacity = live.total_capacity_gallons();
                if capacity <= 0.0 {
                    return BTreeMap::new();
                }
                let gallons = gallons.min(capacity);
                live.installed()
                    .map(|(tank, level)| (tank.id(), gallons * level.capacity_gallons / capacity))
                    .collect()
            }
        }
    }

    fn is_met(&self, live: &FuelTanks, tolerance: f64) -> bool {
        match self {
            FuelTarget::Total(gallons) => (live.total_gallons() - gallons).abs() <= tolerance,
            FuelTarget::PerTank(tanks) => tanks.iter().all(|(id, expected)| {
                let current = live
                    .tanks
                    .iter()
                    .find(|(tank, _)| tank.id() == *id)
                    .map(|(_, level)| level.quantity_gallons)
                    .unwrap_or(0.0);
                (current - expected).abs() <= tolerance
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PayloadTarget {
    Total(f64),
    /// Pounds by station index
    PerStation(BTreeMap<u8, f64>),
}

impl PayloadTarget {
    pub fn total_lbs(&self) -> f64 {
        match self {
            PayloadTarget::Total(lbs) => *lbs,
            PayloadTarget::PerStation(stations) => stations.values().sum(),
        }
    }

    /// Station weights to load, spread evenly when only a total is known
    pub fn weights(&self, live: &PayloadStations) -> BTreeMap<u8, f64> {
        match self {
            PayloadTarget::PerStation(stations) => stations.clone(),
            PayloadTarget::Total(lbs) => {
                let count = live.count();
                if count == 0 {
                    return BTreeMap::new();
                }
                let each = lbs / count as f64;
                live.stations.keys().map(|index| (*index, each)).collect()
            }
        }
    }

    fn is_met(&self, live: &PayloadStations, tolerance: f64) -> bool {
        match self {
            PayloadTarget::Total(lbs) => (live.total_weight_lbs() - lbs).abs() <= tolerance,
            PayloadTarget::PerStation(stations) => stations.iter().all(|(index, expected)| {
                let current = live.stations.get(index).map(|s| s.weight_lbs).unwrap_or(0.0);
                (current - expected).abs() <= tolerance
            }),
        }
    }
}

/// What the simulator has to look like before tracking may start
#[derive(Clone, Debug, PartialEq)]
pub struct Expectations {
    /// `None` means "real UTC now"
    pub sim_time: Option<DateTime<Utc>>,
    pub fuel: FuelTarget,
    pub payload: PayloadTarget,
    pub plane_model_hash: Option<String>,
    pub location: GeoPosition,
    pub location_radius_m: f64,
    /// Resume only: saved attitude to slew back to
    pub resume_position: Option<ResumePosition>,
    pub altitude_tolerance_ft: f64,
    pub allow_slew: bool,
}

impl Expectations {
    pub fn fresh(flight: &Flight, config: &TrackerConfig) -> Self {
        Expectations {
            sim_time: flight.departure_utc,
            fuel: FuelTarget::Total(flight.fuel_gallons),
            payload: PayloadTarget::Total(flight.payload_lbs),
            plane_model_hash: flight.plane_model_hash.clone(),
            location: flight.origin,
            location_radius_m: config.start_distance_m,
            resume_position: None,
            altitude_tolerance_ft: config.resume_altitude_ft,
            allow_slew: false,
        }
    }

    pub fn resume(flight: &Flight, artifact: &SaveArtifact, config: &TrackerConfig) -> Self {
        Expectations {
            sim_time: artifact.sim_utc,
            fuel: FuelTarget::PerTank(artifact.fuel.clone()),
            payload: PayloadTarget::PerStation(artifact.payload.clone()),
            plane_model_hash: flight.plane_model_hash.clone(),
            location: artifact.position.position(),
            location_radius_m: config.resume_distance_m,
            resume_position: Some(artifact.position),
            altitude_tolerance_ft: config.resume_altitude_ft,
            allow_slew: true,
        }
    }
}

/// Live values the conditions are checked against
#[derive(Clone, Copy, Debug)]
pub struct LiveValues<'a> {
    pub now: DateTime<Utc>,
    pub primary: Option<&'a PrimaryTracking>,
    pub secondary: Option<&'a SecondaryTracking>,
    pub fuel: Option<&'a FuelTanks>,
    pub payload: Option<&'a PayloadStations>,
    pub identity: Option<&'a AircraftIdentity>,
}

/// Something to send to the simulator to satisfy a condition
#[derive(Clone, Debug, PartialEq)]
pub enum AutoSetCommand {
    Event(SimEvent, u32),
    Write(RawSample),
}

const NO_DATA: &str = "no data";

/// The condition table of one session
#[derive(Clone, Debug)]
pub struct TrackingConditions {
    conditions: BTreeMap<ConditionKind, TrackingCondition>,
    expectations: Expectations,
    time_tolerance_secs: i64,
    fuel_tolerance_gallons: f64,
    payload_tolerance_lbs: f64,
}

impl TrackingConditions {
    pub fn new(expectations: Expectations, config: &TrackerConfig) -> Self {
        let resuming = expectations.resume_position.is_some();
        let conditions = ConditionKind::ALL
            .iter()
            .map(|kind| {
                let enabled = match kind {
                    ConditionKind::Time => config.require_time_sync,
                    ConditionKind::Fuel => config.require_fuel_match,
                    ConditionKind::Payload => config.require_payload_match,
                    ConditionKind::PlaneModel => config.require_plane_match,
                    ConditionKind::Realism => config.require_realism,
                    ConditionKind::Location => config.require_location,
                };
                // Slewing a fresh flight to its origin is left to the pilot
                let auto_set = match kind {
                    ConditionKind::Location => resuming,
                    other => other.can_auto_set(),
                };
                let condition = TrackingCondition {
                    kind: *kind,
                    expected: String::new(),
                    current: NO_DATA.to_string(),
                    met: false,
                    auto_set,
                    enabled,
                };
                (*kind, condition)
            })
            .collect();

        let mut table = TrackingConditions {
            conditions,
            expectations,
            time_tolerance_secs: config.time_sync_tolerance_secs,
            fuel_tolerance_gallons: config.fuel_tolerance_gallons,
            payload_tolerance_lbs: config.payload_tolerance_lbs,
        };
        table.describe_expectations(Utc::now());
        table
    }

    pub fn expectations(&self) -> &Expectations {
        &self.expectations
    }

    pub fn get(&self, kind: ConditionKind) -> Option<&TrackingCondition> {
        self.conditions.get(&kind)
    }

    pub fn all(&self) -> Vec<TrackingCondition> {
        self.conditions.values().cloned().collect()
    }

    pub fn set_enabled(&mut self, kind: ConditionKind, enabled: bool) {
        if let Some(condition) = self.conditions.get_mut(&kind) {
            condition.enabled = enabled;
        }
    }

    pub fn set_auto_set(&mut self, kind: ConditionKind, auto_set: bool) {
        if let Some(condition) = self.conditions.get_mut(&kind) {
            condition.auto_set = auto_set && kind.can_auto_set();
        }
    }

    /// Enabled conditions that are currently not met
    pub fn unmet_enabled(&self) -> Vec<ConditionKind> {
        self.conditions
            .values()
            .filter(|c| c.enabled && !c.met)
            .map(|c| c.kind)
            .collect()
    }

    pub fn all_met(&self) -> bool {
        self.unmet_enabled().is_empty()
    }

    /// Recompute current value and met flag of every condition; returns
    /// whether anything changed
    pub fn evaluate(&mut self, live: &LiveValues<'_>) -> bool {
        self.describe_expectations(live.now);
        let mut changed = false;
        for kind in ConditionKind::ALL {
            let (current, met) = self.check(kind, live);
            if let Some(condition) = self.conditions.get_mut(&kind) {
                if condition.current != current || condition.met != met {
                    changed = true;
                }
                condition.current = current;
                condition.met = met;
            }
        }
        changed
    }

    fn describe_expectations(&mut self, now: DateTime<Utc>) {
        let e = &self.expectations;
        let texts = [
            (ConditionKind::Time, format_time(e.sim_time.unwrap_or(now))),
            (ConditionKind::Fuel, format!("{:.1} gal", e.fuel.total_gallons())),
            (ConditionKind::Payload, format!("{:.0} lbs", e.payload.total_lbs())),
            (
                ConditionKind::PlaneModel,
                e.plane_model_hash.clone().unwrap_or_else(|| "any".to_string()),
            ),
            (
                ConditionKind::Realism,
                if e.allow_slew {
                    "crash detection on, unlimited fuel off".to_string()
                } else {
                    "crash detection on, unlimited fuel off, slew off".to_string()
                },
            ),
            (
                ConditionKind::Location,
                match e.resume_position {
                    Some(p) => format!(
                        "within {:.0} m of {:.5},{:.5} at {:.0} ft AGL",
                        e.location_radius_m, p.latitude, p.longitude, p.radio_height_ft
                    ),
                    None => format!(
                        "within {:.1} km of {:.5},{:.5}",
                        e.location_radius_m / 1000.0,
                        e.location.latitude,
                        e.location.longitude
                    ),
                },
            ),
        ];
        for (kind, text) in texts {
            if let Some(condition) = self.conditions.get_mut(&kind) {
                condition.expected = text;
            }
        }
    }

    fn check(&self, kind: ConditionKind, live: &LiveValues<'_>) -> (String, bool) {
        let e = &self.expectations;
        match kind {
            ConditionKind::Time => match live.secondary.and_then(|s| s.utc_time) {
                Some(sim) => {
                    let expected = e.sim_time.unwrap_or(live.now);
                    let delta = (sim - expected).num_seconds().abs();
                    (format_time(sim), delta <= self.time_tolerance_secs)
                }
                None => (NO_DATA.to_string(), false),
            },
            ConditionKind::Fuel => match live.fuel {
                Some(fuel) => (
                    format!("{:.1} gal", fuel.total_gallons()),
                    e.fuel.is_met(fuel, self.fuel_tolerance_gallons),
                ),
                None => (NO_DATA.to_string(), false),
            },
            ConditionKind::Payload => match live.payload {
                Some(payload) => (
                    format!("{:.0} lbs", payload.total_weight_lbs()),
                    e.payload.is_met(payload, self.payload_tolerance_lbs),
                ),
                None => (NO_DATA.to_string(), false),
            },
            ConditionKind::PlaneModel => match live.identity {
                Some(identity) if identity.is_known() => {
                    let hash = identity.model_hash();
                    let met = e.plane_model_hash.as_ref().map(|h| *h == hash).unwrap_or(true);
                    (format!("{} ({})", identity.title, hash), met)
                }
                _ => (NO_DATA.to_string(), false),
            },
            ConditionKind::Realism => match (live.secondary, live.primary) {
                (Some(secondary), Some(primary)) => {
                    let slew_ok = e.allow_slew || !primary.slew_active;
                    let met = secondary.crash_detection_enabled && !secondary.unlimited_fuel && slew_ok;
                    let current = format!(
                        "crash detection {}, unlimited fuel {}, slew {}",
                        on_off(secondary.crash_detection_enabled),
                        on_off(secondary.unlimited_fuel),
                        on_off(primary.slew_active)
                    );
                    (current, met)
                }
                _ => (NO_DATA.to_string(), false),
            },
            ConditionKind::Location => match live.primary {
                Some(primary) => {
                    let distance = primary.position().distance_m(&e.location);
                    let mut met = distance <= e.location_radius_m;
                    if let Some(resume) = e.resume_position {
                        met &= (primary.radio_height_ft - resume.radio_height_ft).abs()
                            <= e.altitude_tolerance_ft;
                    }
                    let current = if distance >= 1000.0 {
                        format!("{:.1} km away, {:.0} ft AGL", distance / 1000.0, primary.radio_height_ft)
                    } else {
                        format!("{:.0} m away, {:.0} ft AGL", distance, primary.radio_height_ft)
                    };
                    (current, met)
                }
                None => (NO_DATA.to_string(), false),
            },
        }
    }

    /// Commands that would satisfy `kind`; empty when the condition is
    /// met, disabled, not auto-set or the live values needed are missing
    pub fn auto_set_commands(&self, kind: ConditionKind, live: &LiveValues<'_>) -> Vec<AutoSetCommand> {
        let Some(condition) = self.conditions.get(&kind) else {
            return Vec::new();
        };
        if condition.met || !condition.enabled || !condition.auto_set {
            return Vec::new();
        }
        let e = &self.expectations;
        match kind {
            ConditionKind::Time => time_commands(e.sim_time.unwrap_or(live.now)),
            ConditionKind::Fuel => match live.fuel {
                Some(fuel) => {
                    let quantities = e.fuel.quantities(fuel);
                    if quantities.is_empty() {
                        Vec::new()
                    } else {
                        vec![AutoSetCommand::Write(fuel_to_raw(&quantities))]
                    }
                }
                None => Vec::new(),
            },
            ConditionKind::Payload => match live.payload {
                Some(payload) => {
                    let weights = e.payload.weights(payload);
                    if weights.is_empty() {
                        Vec::new()
                    } else {
                        vec![AutoSetCommand::Write(payload_to_raw(&weights))]
                    }
                }
                None => Vec::new(),
            },
            ConditionKind::Location => match e.resume_position {
                Some(position) => vec![
                    AutoSetCommand::Event(SimEvent::SlewOn, 1),
                    AutoSetCommand::Write(position_sample(&position)),
                    AutoSetCommand::Event(SimEvent::SlewOff, 0),
                ],
                None => Vec::new(),
            },
            ConditionKind::PlaneModel | ConditionKind::Realism => Vec::new(),
        }
    }
}

fn time_commands(at: DateTime<Utc>) -> Vec<AutoSetCommand> {
    vec![
        AutoSetCommand::Event(SimEvent::ZuluYearSet, at.year().max(0) as u32),
        AutoSetCommand::Event(SimEvent::ZuluDaySet, at.ordinal()),
        AutoSetCommand::Event(SimEvent::ZuluHoursSet, at.hour()),
        AutoSetCommand::Event(SimEvent::ZuluMinutesSet, at.minute()),
    ]
}

fn position_sample(position: &ResumePosition) -> RawSample {
    RawSample::new(Category::Primary)
        .with_number("PLANE LATITUDE", position.latitude)
        .with_number("PLANE LONGITUDE", position.longitude)
        .with_number("PLANE ALT ABOVE GROUND", position.radio_height_ft)
        .with_number("PLANE HEADING DEGREES TRUE", position.heading_true_deg)
        .with_number("PLANE PITCH DEGREES", position.pitch_deg)
        .with_number("PLANE BANK DEGREES", position.bank_deg)
        .with_number("AIRSPEED TRUE", position.airspeed_true_kt)
        .with_number("VERTICAL SPEED", position.vertical_speed_fpm / 60.0)
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::artifact::fixtures::sample_artifact;
    use crate::types::{EngineType, FuelTank, PayloadStation, TankLevel};
    use approx::assert_relative_eq;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn flight() -> Flight {
        Flight {
            id: "F-100".to_string(),
            origin_icao: "LSZH".to_string(),
            origin: GeoPosition::new(47.4647, 8.5492),
            destination_icao: "EDDF".to_string(),
            departure_utc: Some(Utc.with_ymd_and_hms(2026, 5, 1, 14, 30, 0).unwrap()),
            fuel_gallons: 600.0,
            payload_lbs: 1_200.0,
            plane_model_hash: None,
            resumable: false,
        }
    }

    fn fuel(left: f64, right: f64) -> FuelTanks {
        let mut tanks = FuelTanks { weight_per_gallon_lbs: 6.7, ..Default::default() };
        tanks.tanks.insert(FuelTank::LeftMain, TankLevel { capacity_gallons: 400.0, quantity_gallons: left });
        tanks.tanks.insert(FuelTank::RightMain, TankLevel { capacity_gallons: 400.0, quantity_gallons: right });
        tanks.tanks.insert(FuelTank::Center, TankLevel::default());
        tanks
    }

    fn payload(weights: &[f64]) -> PayloadStations {
        let mut stations = PayloadStations::default();
        for (i, w) in weights.iter().enumerate() {
            stations
                .stations
                .insert(i as u8 + 1, PayloadStation { name: format!("Station {}", i + 1), weight_lbs: *w });
        }
        stations
    }

    fn ready_secondary(at: DateTime<Utc>) -> SecondaryTracking {
        SecondaryTracking {
            utc_time: Some(at),
            crash_detection_enabled: true,
            ..Default::default()
        }
    }

    fn at_origin() -> PrimaryTracking {
        PrimaryTracking { latitude: 47.47, longitude: 8.55, on_ground: true, ..Default::default() }
    }

    fn identity() -> AircraftIdentity {
        AircraftIdentity {
            title: "Cessna 208".into(),
            atc_type: "CESSNA".into(),
            atc_model: "C208".into(),
            engine_type: EngineType::Turboprop,
            engine_count: 1,
        }
    }

    #[test]
    fn test_all_met_for_matching_sim() {
        let config = TrackerConfig::default();
        let f = flight();
        let mut table = TrackingConditions::new(Expectations::fresh(&f, &config), &config);
        assert!(!table.all_met());
        assert_eq!(table.unmet_enabled().len(), 6);

        let secondary = ready_secondary(f.departure_utc.unwrap() + ChronoDuration::seconds(45));
        let primary = at_origin();
        let fuel = fuel(300.0, 300.4);
        let payload = payload(&[600.0, 602.0]);
        let identity = identity();
        let live = LiveValues {
            now: Utc::now(),
            primary: Some(&primary),
            secondary: Some(&secondary),
            fuel: Some(&fuel),
            payload: Some(&payload),
            identity: Some(&identity),
        };
        assert!(table.evaluate(&live));
        assert!(table.all_met(), "{:?}", table.all());
        assert!(!table.evaluate(&live));
    }

    #[test]
    fn test_time_outside_tolerance_is_unmet() {
        let config = TrackerConfig::default();
        let f = flight();
        let mut table = TrackingConditions::new(Expectations::fresh(&f, &config), &config);
        let secondary = ready_secondary(f.departure_utc.unwrap() + ChronoDuration::seconds(61));
        let live = LiveValues {
            now: Utc::now(),
            primary: None,
            secondary: Some(&secondary),
            fuel: None,
            payload: None,
            identity: None,
        };
        table.evaluate(&live);
        assert!(!table.get(ConditionKind::Time).unwrap().met);
    }

    #[test]
    fn test_disabled_condition_does_not_gate() {
        let config = TrackerConfig {
            require_time_sync: false,
            require_fuel_match: false,
            require_payload_match: false,
            require_plane_match: false,
            require_realism: false,
            ..Default::default()
        };
        let f = flight();
        let mut table = TrackingConditions::new(Expectations::fresh(&f, &config), &config);
        let far = PrimaryTracking { latitude: 50.0, longitude: 8.55, ..Default::default() };
        let live = LiveValues {
            now: Utc::now(),
            primary: Some(&far),
            secondary: None,
            fuel: None,
            payload: None,
            identity: None,
        };
        table.evaluate(&live);
        assert_eq!(table.unmet_enabled(), vec![ConditionKind::Location]);

        table.set_enabled(ConditionKind::Location, false);
        assert!(table.all_met());
    }

    #[test]
    fn test_resume_location_needs_altitude() {
        let config = TrackerConfig::default();
        let artifact = sample_artifact("F-100");
        let mut table = TrackingConditions::new(Expectations::resume(&flight(), &artifact, &config), &config);

        let primary = PrimaryTracking {
            latitude: artifact.position.latitude + 0.0005,
            longitude: artifact.position.longitude,
            radio_height_ft: artifact.position.radio_height_ft,
            slew_active: true,
            ..Default::default()
        };
        let secondary = ready_secondary(Utc::now());
        let mut live = LiveValues {
            now: Utc::now(),
            primary: Some(&primary),
            secondary: Some(&secondary),
            fuel: None,
            payload: None,
            identity: None,
        };
        table.evaluate(&live);
        // ~55 m away, same height, slew tolerated while resuming
        assert!(table.get(ConditionKind::Location).unwrap().met);
        assert!(table.get(ConditionKind::Realism).unwrap().met);

        let mut raised = primary.clone();
        raised.radio_height_ft += 80.0;
        live.primary = Some(&raised);
        table.evaluate(&live);
        assert!(!table.get(ConditionKind::Location).unwrap().met);
    }

    #[test]
    fn test_fresh_realism_rejects_slew() {
        let config = TrackerConfig::default();
        let mut table = TrackingConditions::new(Expectations::fresh(&flight(), &config), &config);
        let primary = PrimaryTracking { slew_active: true, ..at_origin() };
        let secondary = ready_secondary(Utc::now());
        let live = LiveValues {
            now: Utc::now(),
            primary: Some(&primary),
            secondary: Some(&secondary),
            fuel: None,
            payload: None,
            identity: None,
        };
        table.evaluate(&live);
        assert!(!table.get(ConditionKind::Realism).unwrap().met);
    }

    #[test]
    fn test_fuel_total_spread_by_capacity() {
        let live = fuel(0.0, 0.0);
        let quantities = FuelTarget::Total(300.0).quantities(&live);
        assert_eq!(quantities.len(), 2);
        assert_relative_eq!(quantities[&FuelTank::LeftMain.id()], 150.0);
        assert_relative_eq!(quantities[&FuelTank::RightMain.id()], 150.0);

        // clamped to what fits
        let full = FuelTarget::Total(2_000.0).quantities(&live);
        assert_relative_eq!(full.values().sum::<f64>(), 800.0);
    }

    #[test]
    fn test_auto_set_commands() {
        let config = TrackerConfig::default();
        let f = flight();
        let table = TrackingConditions::new(Expectations::fresh(&f, &config), &config);
        let fuel = fuel(10.0, 10.0);
        let payload = payload(&[0.0, 0.0, 0.0]);
        let live = LiveValues {
            now: Utc::now(),
            primary: None,
            secondary: None,
            fuel: Some(&fuel),
            payload: Some(&payload),
            identity: None,
        };

        let time = table.auto_set_commands(ConditionKind::Time, &live);
        assert_eq!(time[0], AutoSetCommand::Event(SimEvent::ZuluYearSet, 2026));
        assert_eq!(time[2], AutoSetCommand::Event(SimEvent::ZuluHoursSet, 14));
        assert_eq!(time[3], AutoSetCommand::Event(SimEvent::ZuluMinutesSet, 30));

        match &table.auto_set_commands(ConditionKind::Payload, &live)[..] {
            [AutoSetCommand::Write(sample)] => {
                assert_eq!(sample.category, Category::Payload);
                assert_relative_eq!(sample.number("PAYLOAD STATION WEIGHT:3").unwrap(), 400.0);
            }
            other => panic!("unexpected {:?}", other),
        }

        // fresh flights never slew to the origin on their own
        assert!(table.auto_set_commands(ConditionKind::Location, &live).is_empty());
        assert!(table.auto_set_commands(ConditionKind::PlaneModel, &live).is_empty());
    }

    #[test]
    fn test_resume_slews_to_saved_position() {
        let config = TrackerConfig::default();
        let artifact = sample_artifact("F-100");
        let table = TrackingConditions::new(Expectations::resume(&flight(), &artifact, &config), &config);
        let live = LiveValues {
            now: Utc::now(),
            primary: None,
            secondary: None,
            fuel: None,
            payload: None,
            identity: None,
        };
        let commands = table.auto_set_commands(ConditionKind::Location, &live);
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], AutoSetCommand::Event(SimEvent::SlewOn, 1));
        match &commands[1] {
            AutoSetCommand::Write(sample) => {
                assert_eq!(sample.number("PLANE LATITUDE").unwrap(), artifact.position.latitude)
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
