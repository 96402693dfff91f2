//! Logical sample schema and the pure raw → snapshot mapping.
//!
//! The simulator delivers each category as a bag of named simulation
//! variables. The field list registered for a category is declared here
//! next to the function that turns such a bag into a typed snapshot, so
//! the snapshot records themselves stay plain data.

use std::collections::BTreeMap;

use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::position::KNOTS_PER_FOOT_PER_SECOND;
use super::snapshots::{
    AircraftIdentity, CrashSequence, EngineType, FuelTank, FuelTanks, LandingAnalysis,
    PayloadStation, PayloadStations, PrimaryTracking, PushbackState, SecondaryTracking, TankLevel,
    WeightAndBalance,
};
use super::Category;
use crate::error::{TrackerError, TrackerResult};

pub const MAX_PAYLOAD_STATIONS: u8 = 15;
const MAX_ENGINES: u8 = 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

/// One pushed sample: the category plus its named values
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub category: Category,
    pub values: BTreeMap<String, RawValue>,
}

impl RawSample {
    pub fn new(category: Category) -> Self {
        Self { category, values: BTreeMap::new() }
    }

    pub fn with_number(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), RawValue::Number(value));
        self
    }

    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), RawValue::Text(value.into()));
        self
    }

    pub fn set_number(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), RawValue::Number(value));
    }

    pub fn number(&self, name: &str) -> TrackerResult<f64> {
        match self.values.get(name) {
            Some(RawValue::Number(v)) => Ok(*v),
            Some(RawValue::Text(t)) => t.trim().parse().map_err(|_| {
                TrackerError::Mapping(format!("{:?}: {} is not numeric", self.category, name))
            }),
            None => Err(TrackerError::Mapping(format!(
                "{:?}: missing field {}",
                self.category, name
            ))),
        }
    }

    pub fn number_or(&self, name: &str, fallback: f64) -> f64 {
        self.number(name).unwrap_or(fallback)
    }

    pub fn flag(&self, name: &str) -> TrackerResult<bool> {
        Ok(self.number(name)? != 0.0)
    }

    pub fn text(&self, name: &str) -> TrackerResult<String> {
        match self.values.get(name) {
            Some(RawValue::Text(t)) => Ok(t.clone()),
            Some(RawValue::Number(v)) => Ok(v.to_string()),
            None => Err(TrackerError::Mapping(format!(
                "{:?}: missing field {}",
                self.category, name
            ))),
        }
    }
}

/// A simulation variable and the unit it is requested in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub unit: &'static str,
}

impl FieldSpec {
    fn new(name: impl Into<String>, unit: &'static str) -> Self {
        Self { name: name.into(), unit }
    }
}

/// Field list registered with the simulator for a category
pub fn schema(category: Category) -> Vec<FieldSpec> {
    match category {
        Category::Primary => vec![
            FieldSpec::new("PLANE LATITUDE", "degrees"),
            FieldSpec::new("PLANE LONGITUDE", "degrees"),
            FieldSpec::new("PLANE ALTITUDE", "feet"),
            FieldSpec::new("PLANE ALT ABOVE GROUND", "feet"),
            FieldSpec::new("PLANE HEADING DEGREES TRUE", "degrees"),
            FieldSpec::new("PLANE PITCH DEGREES", "degrees"),
            FieldSpec::new("PLANE BANK DEGREES", "degrees"),
            FieldSpec::new("AIRSPEED TRUE", "knots"),
            FieldSpec::new("AIRSPEED INDICATED", "knots"),
            FieldSpec::new("GROUND VELOCITY", "knots"),
            FieldSpec::new("VERTICAL SPEED", "feet per second"),
            FieldSpec::new("SIM ON GROUND", "bool"),
            FieldSpec::new("OVERSPEED WARNING", "bool"),
            FieldSpec::new("STALL WARNING", "bool"),
            FieldSpec::new("IS SLEW ACTIVE", "bool"),
            FieldSpec::new("CRASH SEQUENCE", "enum"),
            FieldSpec::new("SIMULATION RATE", "number"),
        ],
        Category::Secondary => {
            let mut fields = vec![
                FieldSpec::new("ZULU YEAR", "number"),
                FieldSpec::new("ZULU MONTH OF YEAR", "number"),
                FieldSpec::new("ZULU DAY OF MONTH", "number"),
                FieldSpec::new("ZULU TIME", "seconds"),
            ];
            for engine in 1..=MAX_ENGINES {
                fields.push(FieldSpec::new(format!("GENERAL ENG COMBUSTION:{}", engine), "bool"));
            }
            fields.extend([
                FieldSpec::new("LIGHT BEACON", "bool"),
                FieldSpec::new("LIGHT NAV", "bool"),
                FieldSpec::new("LIGHT STROBE", "bool"),
                FieldSpec::new("LIGHT TAXI", "bool"),
                FieldSpec::new("LIGHT LANDING", "bool"),
                FieldSpec::new("GEAR HANDLE POSITION", "bool"),
                FieldSpec::new("FLAPS HANDLE PERCENT", "percent"),
                FieldSpec::new("AUTOPILOT MASTER", "bool"),
                FieldSpec::new("BRAKE PARKING POSITION", "bool"),
                FieldSpec::new("SPOILERS ARMED", "bool"),
                FieldSpec::new("APU PCT RPM", "percent"),
                FieldSpec::new("CABIN SEATBELTS ALERT SWITCH", "bool"),
                FieldSpec::new("CABIN NO SMOKING ALERT SWITCH", "bool"),
                FieldSpec::new("PUSHBACK STATE", "enum"),
                FieldSpec::new("REALISM CRASH DETECTION", "bool"),
                FieldSpec::new("UNLIMITED FUEL", "bool"),
            ]);
            fields
        }
        Category::Fuel => {
            let mut fields = Vec::with_capacity(FuelTank::ALL.len() * 2 + 1);
            for tank in FuelTank::ALL {
                fields.push(FieldSpec::new(format!("{} CAPACITY", tank.variable_stem()), "gallons"));
                fields.push(FieldSpec::new(format!("{} QUANTITY", tank.variable_stem()), "gallons"));
            }
            fields.push(FieldSpec::new("FUEL WEIGHT PER GALLON", "pounds"));
            fields
        }
        Category::Payload => {
            let mut fields = vec![FieldSpec::new("PAYLOAD STATION COUNT", "number")];
            for station in 1..=MAX_PAYLOAD_STATIONS {
                fields.push(FieldSpec::new(format!("PAYLOAD STATION WEIGHT:{}", station), "pounds"));
                fields.push(FieldSpec::new(format!("PAYLOAD STATION NAME:{}", station), "string"));
            }
            fields
        }
        Category::Identity => vec![
            FieldSpec::new("TITLE", "string"),
            FieldSpec::new("ATC TYPE", "string"),
            FieldSpec::new("ATC MODEL", "string"),
            FieldSpec::new("ENGINE TYPE", "enum"),
            FieldSpec::new("NUMBER OF ENGINES", "number"),
        ],
        Category::WeightAndBalance => vec![
            FieldSpec::new("EMPTY WEIGHT", "pounds"),
            FieldSpec::new("TOTAL WEIGHT", "pounds"),
            FieldSpec::new("MAX GROSS WEIGHT", "pounds"),
            FieldSpec::new("FUEL TOTAL CAPACITY", "gallons"),
            FieldSpec::new("FUEL WEIGHT PER GALLON", "pounds"),
            FieldSpec::new("CG PERCENT", "percent"),
        ],
        Category::LandingAnalysis => vec![
            FieldSpec::new("SIM ON GROUND", "bool"),
            FieldSpec::new("PLANE LATITUDE", "degrees"),
            FieldSpec::new("PLANE LONGITUDE", "degrees"),
            FieldSpec::new("PLANE HEADING DEGREES TRUE", "degrees"),
            FieldSpec::new("PLANE ALT ABOVE GROUND", "feet"),
            FieldSpec::new("VELOCITY WORLD Y", "feet per second"),
            FieldSpec::new("G FORCE", "gforce"),
            FieldSpec::new("VELOCITY BODY X", "feet per second"),
            FieldSpec::new("VELOCITY BODY Z", "feet per second"),
            FieldSpec::new("AIRCRAFT WIND X", "knots"),
            FieldSpec::new("AIRCRAFT WIND Z", "knots"),
            FieldSpec::new("PLANE BANK DEGREES", "degrees"),
            FieldSpec::new("GROUND VELOCITY", "knots"),
            FieldSpec::new("AIRSPEED TRUE", "knots"),
        ],
    }
}

/// A typed snapshot of any category
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot {
    Primary(PrimaryTracking),
    Secondary(SecondaryTracking),
    Fuel(FuelTanks),
    Payload(PayloadStations),
    Identity(AircraftIdentity),
    WeightAndBalance(WeightAndBalance),
    LandingAnalysis(LandingAnalysis),
}

impl Snapshot {
    pub fn category(&self) -> Category {
        match self {
            Snapshot::Primary(_) => Category::Primary,
            Snapshot::Secondary(_) => Category::Secondary,
            Snapshot::Fuel(_) => Category::Fuel,
            Snapshot::Payload(_) => Category::Payload,
            Snapshot::Identity(_) => Category::Identity,
            Snapshot::WeightAndBalance(_) => Category::WeightAndBalance,
            Snapshot::LandingAnalysis(_) => Category::LandingAnalysis,
        }
    }

    /// Zero-value stand-in for "nothing received yet"
    pub fn sentinel(category: Category) -> Self {
        match category {
            Category::Primary => Snapshot::Primary(PrimaryTracking::default()),
            Category::Secondary => Snapshot::Secondary(SecondaryTracking::default()),
            Category::Fuel => Snapshot::Fuel(FuelTanks::default()),
            Category::Payload => Snapshot::Payload(PayloadStations::default()),
            Category::Identity => Snapshot::Identity(AircraftIdentity::default()),
            Category::WeightAndBalance => Snapshot::WeightAndBalance(WeightAndBalance::default()),
            Category::LandingAnalysis => Snapshot::LandingAnalysis(LandingAnalysis::default()),
        }
    }
}

pub fn snapshot_from_raw(sample: &RawSample) -> TrackerResult<Snapshot> {
    Ok(match sample.category {
        Category::Primary => Snapshot::Primary(primary_from_raw(sample)?),
        Category::Secondary => Snapshot::Secondary(secondary_from_raw(sample)?),
        Category::Fuel => Snapshot::Fuel(fuel_from_raw(sample)?),
        Category::Payload => Snapshot::Payload(payload_from_raw(sample)?),
        Category::Identity => Snapshot::Identity(identity_from_raw(sample)?),
        Category::WeightAndBalance => Snapshot::WeightAndBalance(weight_and_balance_from_raw(sample)?),
        Category::LandingAnalysis => Snapshot::LandingAnalysis(landing_from_raw(sample)?),
    })
}

pub fn primary_from_raw(s: &RawSample) -> TrackerResult<PrimaryTracking> {
    Ok(PrimaryTracking {
        latitude: s.number("PLANE LATITUDE")?,
        longitude: s.number("PLANE LONGITUDE")?,
        altitude_ft: s.number("PLANE ALTITUDE")?,
        radio_height_ft: s.number("PLANE ALT ABOVE GROUND")?,
        heading_true_deg: s.number("PLANE HEADING DEGREES TRUE")?,
        pitch_deg: s.number("PLANE PITCH DEGREES")?,
        bank_deg: s.number("PLANE BANK DEGREES")?,
        airspeed_true_kt: s.number("AIRSPEED TRUE")?,
        airspeed_indicated_kt: s.number("AIRSPEED INDICATED")?,
        ground_speed_kt: s.number("GROUND VELOCITY")?,
        vertical_speed_fpm: s.number("VERTICAL SPEED")? * 60.0,
        on_ground: s.flag("SIM ON GROUND")?,
        overspeed_warning: s.flag("OVERSPEED WARNING")?,
        stall_warning: s.flag("STALL WARNING")?,
        slew_active: s.flag("IS SLEW ACTIVE")?,
        crash_sequence: CrashSequence::from_raw(s.number("CRASH SEQUENCE")?),
        sim_rate: s.number_or("SIMULATION RATE", 1.0),
    })
}

pub fn secondary_from_raw(s: &RawSample) -> TrackerResult<SecondaryTracking> {
    let utc_time = NaiveDate::from_ymd_opt(
        s.number("ZULU YEAR")? as i32,
        s.number("ZULU MONTH OF YEAR")? as u32,
        s.number("ZULU DAY OF MONTH")? as u32,
    )
    .and_then(|date| date.and_hms_opt(0, 0, 0))
    .map(|midnight| {
        Utc.from_utc_datetime(&midnight)
            + ChronoDuration::milliseconds((s.number_or("ZULU TIME", 0.0) * 1000.0) as i64)
    });

    let engines_running = (1..=MAX_ENGINES)
        .any(|engine| s.number_or(&format!("GENERAL ENG COMBUSTION:{}", engine), 0.0) != 0.0);

    Ok(SecondaryTracking {
        utc_time,
        engines_running,
        light_beacon: s.flag("LIGHT BEACON")?,
        light_nav: s.flag("LIGHT NAV")?,
        light_strobe: s.flag("LIGHT STROBE")?,
        light_taxi: s.flag("LIGHT TAXI")?,
        light_landing: s.flag("LIGHT LANDING")?,
        gear_down: s.flag("GEAR HANDLE POSITION")?,
        flaps_percent: s.number("FLAPS HANDLE PERCENT")?,
        autopilot_engaged: s.flag("AUTOPILOT MASTER")?,
        parking_brake_set: s.flag("BRAKE PARKING POSITION")?,
        spoilers_armed: s.flag("SPOILERS ARMED")?,
        apu_running: s.number_or("APU PCT RPM", 0.0) > 10.0,
        seatbelt_sign: s.flag("CABIN SEATBELTS ALERT SWITCH")?,
        no_smoking_sign: s.flag("CABIN NO SMOKING ALERT SWITCH")?,
        pushback: PushbackState::from_raw(s.number_or("PUSHBACK STATE", 3.0)),
        crash_detection_enabled: s.flag("REALISM CRASH DETECTION")?,
        unlimited_fuel: s.flag("UNLIMITED FUEL")?,
    })
}

pub fn fuel_from_raw(s: &RawSample) -> TrackerResult<FuelTanks> {
    let mut tanks = BTreeMap::new();
    for tank in FuelTank::ALL {
        let capacity = s.number_or(&format!("{} CAPACITY", tank.variable_stem()), 0.0);
        let quantity = s.number_or(&format!("{} QUANTITY", tank.variable_stem()), 0.0);
        tanks.insert(
            tank,
            TankLevel { capacity_gallons: capacity, quantity_gallons: quantity },
        );
    }
    Ok(FuelTanks {
        tanks,
        weight_per_gallon_lbs: s.number("FUEL WEIGHT PER GALLON")?,
    })
}

pub fn payload_from_raw(s: &RawSample) -> TrackerResult<PayloadStations> {
    let count = s.number("PAYLOAD STATION COUNT")?.max(0.0).min(MAX_PAYLOAD_STATIONS as f64) as u8;
    let mut stations = BTreeMap::new();
    for index in 1..=count {
        let weight_lbs = s.number(&format!("PAYLOAD STATION WEIGHT:{}", index))?;
        let name = s
            .text(&format!("PAYLOAD STATION NAME:{}", index))
            .unwrap_or_else(|_| format!("Station {}", index));
        stations.insert(index, PayloadStation { name, weight_lbs });
    }
    Ok(PayloadStations { stations })
}

pub fn identity_from_raw(s: &RawSample) -> TrackerResult<AircraftIdentity> {
    Ok(AircraftIdentity {
        title: s.text("TITLE")?,
        atc_type: s.text("ATC TYPE").unwrap_or_default(),
        atc_model: s.text("ATC MODEL").unwrap_or_default(),
        engine_type: EngineType::from_raw(s.number("ENGINE TYPE")?),
        engine_count: s.number_or("NUMBER OF ENGINES", 0.0).max(0.0) as u8,
    })
}

pub fn weight_and_balance_from_raw(s: &RawSample) -> TrackerResult<WeightAndBalance> {
    Ok(WeightAndBalance {
        empty_weight_lbs: s.number("EMPTY WEIGHT")?,
        total_weight_lbs: s.number("TOTAL WEIGHT")?,
        max_gross_weight_lbs: s.number("MAX GROSS WEIGHT")?,
        fuel_total_capacity_gallons: s.number("FUEL TOTAL CAPACITY")?,
        fuel_weight_per_gallon_lbs: s.number("FUEL WEIGHT PER GALLON")?,
        cg_percent: s.number_or("CG PERCENT", 0.0),
    })
}

pub fn landing_from_raw(s: &RawSample) -> TrackerResult<LandingAnalysis> {
    Ok(LandingAnalysis {
        on_ground: s.flag("SIM ON GROUND")?,
        latitude: s.number("PLANE LATITUDE")?,
        longitude: s.number("PLANE LONGITUDE")?,
        heading_true_deg: s.number("PLANE HEADING DEGREES TRUE")?,
        radio_height_ft: s.number_or("PLANE ALT ABOVE GROUND", 0.0),
        vertical_speed_fpm: s.number("VELOCITY WORLD Y")? * 60.0,
        g_force: s.number("G FORCE")?,
        speed_lateral_kt: s.number("VELOCITY BODY X")? * KNOTS_PER_FOOT_PER_SECOND,
        speed_longitudinal_kt: s.number("VELOCITY BODY Z")? * KNOTS_PER_FOOT_PER_SECOND,
        wind_lateral_kt: s.number("AIRCRAFT WIND X")?,
        wind_longitudinal_kt: s.number("AIRCRAFT WIND Z")?,
        bank_deg: s.number("PLANE BANK DEGREES")?,
        ground_speed_kt: s.number("GROUND VELOCITY")?,
        airspeed_true_kt: s.number("AIRSPEED TRUE")?,
    })
}

/// Tank quantities to write back into the simulator
pub fn fuel_to_raw(quantities: &BTreeMap<u8, f64>) -> RawSample {
    let mut sample = RawSample::new(Category::Fuel);
    for (id, quantity) in quantities {
        if let Some(tank) = FuelTank::from_id(*id) {
            sample.set_number(format!("{} QUANTITY", tank.variable_stem()), *quantity);
        }
    }
    sample
}

/// Station weights to write back into the simulator
pub fn payload_to_raw(weights: &BTreeMap<u8, f64>) -> RawSample {
    let mut sample = RawSample::new(Category::Payload);
    for (index, weight) in weights {
        sample.set_number(format!("PAYLOAD STATION WEIGHT:{}", index), *weight);
    }
    sample
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn primary_raw(lat: f64, lon: f64, heading: f64, on_ground: bool) -> RawSample {
        RawSample::new(Category::Primary)
            .with_number("PLANE LATITUDE", lat)
            .with_number("PLANE LONGITUDE", lon)
            .with_number("PLANE ALTITUDE", 1200.0)
            .with_number("PLANE ALT ABOVE GROUND", if on_ground { 0.0 } else { 800.0 })
            .with_number("PLANE HEADING DEGREES TRUE", heading)
            .with_number("PLANE PITCH DEGREES", 0.0)
            .with_number("PLANE BANK DEGREES", 0.0)
            .with_number("AIRSPEED TRUE", 110.0)
            .with_number("AIRSPEED INDICATED", 100.0)
            .with_number("GROUND VELOCITY", 105.0)
            .with_number("VERTICAL SPEED", 5.0)
            .with_number("SIM ON GROUND", if on_ground { 1.0 } else { 0.0 })
            .with_number("OVERSPEED WARNING", 0.0)
            .with_number("STALL WARNING", 0.0)
            .with_number("IS SLEW ACTIVE", 0.0)
            .with_number("CRASH SEQUENCE", 0.0)
            .with_number("SIMULATION RATE", 1.0)
    }
}
