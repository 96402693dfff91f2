//! Telemetry snapshot records, one per sampled category.
//!
//! Every snapshot is a plain value: it is built in one piece by the raw
//! sample mapping in [`super::raw`] and never patched afterwards. The
//! `Default` value of each record doubles as the "nothing received yet"
//! sentinel handed to processors as the old side of the first change.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::{feet_to_meters, knots_to_mps, GeoPosition};

/// Crash sequence reported by the simulator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrashSequence {
    #[default]
    Off,
    Complete,
    Reset,
    Pause,
    Start,
}

impl CrashSequence {
    pub fn from_raw(value: f64) -> Self {
        match value.round() as i64 {
            0 => CrashSequence::Off,
            1 => CrashSequence::Complete,
            3 => CrashSequence::Reset,
            4 => CrashSequence::Pause,
            _ => CrashSequence::Start,
        }
    }
}

/// Engine type of the loaded aircraft
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineType {
    #[default]
    Piston,
    Jet,
    NoEngine,
    HeloTurbine,
    Unsupported,
    Turboprop,
}

impl EngineType {
    pub fn from_raw(value: f64) -> Self {
        match value.round() as i64 {
            0 => EngineType::Piston,
            1 => EngineType::Jet,
            2 => EngineType::NoEngine,
            3 => EngineType::HeloTurbine,
            5 => EngineType::Turboprop,
            _ => EngineType::Unsupported,
        }
    }

    /// Jets and turboprops get the stricter landing light and altitude rules
    pub fn is_jet_or_turboprop(&self) -> bool {
        matches!(self, EngineType::Jet | EngineType::Turboprop)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushbackState {
    Straight,
    Left,
    Right,
    #[default]
    NotActive,
}

impl PushbackState {
    pub fn from_raw(value: f64) -> Self {
        match value.round() as i64 {
            0 => PushbackState::Straight,
            1 => PushbackState::Left,
            2 => PushbackState::Right,
            _ => PushbackState::NotActive,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, PushbackState::NotActive)
    }
}

/// High-rate position, attitude and speed state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryTracking {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_ft: f64,
    pub radio_height_ft: f64,
    pub heading_true_deg: f64,
    pub pitch_deg: f64,
    pub bank_deg: f64,
    pub airspeed_true_kt: f64,
    pub airspeed_indicated_kt: f64,
    pub ground_speed_kt: f64,
    pub vertical_speed_fpm: f64,
    pub on_ground: bool,
    pub overspeed_warning: bool,
    pub stall_warning: bool,
    pub slew_active: bool,
    pub crash_sequence: CrashSequence,
    pub sim_rate: f64,
}

impl PrimaryTracking {
    pub fn position(&self) -> GeoPosition {
        GeoPosition::new(self.latitude, self.longitude)
    }

    pub fn altitude_m(&self) -> f64 {
        feet_to_meters(self.altitude_ft)
    }

    pub fn ground_speed_mps(&self) -> f64 {
        knots_to_mps(self.ground_speed_kt)
    }

    /// Simulation rate, treating a missing value as real time
    pub fn effective_sim_rate(&self) -> f64 {
        if self.sim_rate > 0.0 {
            self.sim_rate
        } else {
            1.0
        }
    }
}

/// Lower-rate switch and system state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryTracking {
    pub utc_time: Option<DateTime<Utc>>,
    pub engines_running: bool,
    pub light_beacon: bool,
    pub light_nav: bool,
    pub light_strobe: bool,
    pub light_taxi: bool,
    pub light_landing: bool,
    pub gear_down: bool,
    pub flaps_percent: f64,
    pub autopilot_engaged: bool,
    pub parking_brake_set: bool,
    pub spoilers_armed: bool,
    pub apu_running: bool,
    pub seatbelt_sign: bool,
    pub no_smoking_sign: bool,
    pub pushback: PushbackState,
    pub crash_detection_enabled: bool,
    pub unlimited_fuel: bool,
}

/// Fuel tanks known to the simulator, keyed by their stable tank id
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FuelTank {
    Center,
    Center2,
    Center3,
    LeftMain,
    LeftAux,
    LeftTip,
    RightMain,
    RightAux,
    RightTip,
    External1,
    External2,
}

impl FuelTank {
    pub const ALL: [FuelTank; 11] = [
        FuelTank::Center,
        FuelTank::Center2,
        FuelTank::Center3,
        FuelTank::LeftMain,
        FuelTank::LeftAux,
        FuelTank::LeftTip,
        FuelTank::RightMain,
        FuelTank::RightAux,
        FuelTank::RightTip,
        FuelTank::External1,
        FuelTank::External2,
    ];

    pub fn id(&self) -> u8 {
        match self {
            FuelTank::Center => 0,
            FuelTank::Center2 => 1,
            FuelTank::Center3 => 2,
            FuelTank::LeftMain => 3,
            FuelTank::LeftAux => 4,
            FuelTank::LeftTip => 5,
            FuelTank::RightMain => 6,
            FuelTank::RightAux => 7,
            FuelTank::RightTip => 8,
            FuelTank::External1 => 9,
            FuelTank::External2 => 10,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|tank| tank.id() == id)
    }

    /// Simulator variable stem, e.g. `FUEL TANK LEFT MAIN`
    pub fn variable_stem(&self) -> &'static str {
        match self {
            FuelTank::Center => "FUEL TANK CENTER",
            FuelTank::Center2 => "FUEL TANK CENTER2",
            FuelTank::Center3 => "FUEL TANK CENTER3",
            FuelTank::LeftMain => "FUEL TANK LEFT MAIN",
            FuelTank::LeftAux => "FUEL TANK LEFT AUX",
            FuelTank::LeftTip => "FUEL TANK LEFT TIP",
            FuelTank::RightMain => "FUEL TANK RIGHT MAIN",
            FuelTank::RightAux => "FUEL TANK RIGHT AUX",
            FuelTank::RightTip => "FUEL TANK RIGHT TIP",
            FuelTank::External1 => "FUEL TANK EXTERNAL1",
            FuelTank::External2 => "FUEL TANK EXTERNAL2",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TankLevel {
    pub capacity_gallons: f64,
    pub quantity_gallons: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FuelTanks {
    pub tanks: BTreeMap<FuelTank, TankLevel>,
    pub weight_per_gallon_lbs: f64,
}

impl FuelTanks {
    pub fn total_gallons(&self) -> f64 {
        self.tanks.values().map(|t| t.quantity_gallons).sum()
    }

    pub fn total_capacity_gallons(&self) -> f64 {
        self.tanks.values().map(|t| t.capacity_gallons).sum()
    }

    pub fn total_weight_lbs(&self) -> f64 {
        self.total_gallons() * self.weight_per_gallon_lbs
    }

    /// Tanks that actually exist on this aircraft
    pub fn installed(&self) -> impl Iterator<Item = (&FuelTank, &TankLevel)> {
        self.tanks.iter().filter(|(_, level)| level.capacity_gallons > 0.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadStation {
    pub name: String,
    pub weight_lbs: f64,
}

/// Payload stations keyed by their 1-based station index
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadStations {
    pub stations: BTreeMap<u8, PayloadStation>,
}

impl PayloadStations {
    pub fn total_weight_lbs(&self) -> f64 {
        self.stations.values().map(|s| s.weight_lbs).sum()
    }

    pub fn count(&self) -> usize {
        self.stations.len()
    }
}

/// What aircraft is loaded
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AircraftIdentity {
    pub title: String,
    pub atc_type: String,
    pub atc_model: String,
    pub engine_type: EngineType,
    pub engine_count: u8,
}

impl AircraftIdentity {
    /// Stable hash of the plane model, independent of livery title
    pub fn model_hash(&self) -> String {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.atc_type.trim().to_uppercase().as_bytes());
        hasher.update(b"|");
        hasher.update(self.atc_model.trim().to_uppercase().as_bytes());
        hasher.update(b"|");
        hasher.update(format!("{:?}|{}", self.engine_type, self.engine_count).as_bytes());
        format!("{:08x}", hasher.finalize())
    }

    pub fn is_known(&self) -> bool {
        !self.atc_type.is_empty() || !self.atc_model.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightAndBalance {
    pub empty_weight_lbs: f64,
    pub total_weight_lbs: f64,
    pub max_gross_weight_lbs: f64,
    pub fuel_total_capacity_gallons: f64,
    pub fuel_weight_per_gallon_lbs: f64,
    pub cg_percent: f64,
}

impl WeightAndBalance {
    pub fn is_overweight(&self) -> bool {
        self.max_gross_weight_lbs > 0.0 && self.total_weight_lbs > self.max_gross_weight_lbs
    }
}

/// Touchdown-oriented state, sampled fast near the ground
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandingAnalysis {
    pub on_ground: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub heading_true_deg: f64,
    pub radio_height_ft: f64,
    pub vertical_speed_fpm: f64,
    pub g_force: f64,
    pub speed_lateral_kt: f64,
    pub speed_longitudinal_kt: f64,
    pub wind_lateral_kt: f64,
    pub wind_longitudinal_kt: f64,
    pub bank_deg: f64,
    pub ground_speed_kt: f64,
    pub airspeed_true_kt: f64,
}

impl LandingAnalysis {
    pub fn position(&self) -> GeoPosition {
        GeoPosition::new(self.latitude, self.longitude)
    }
}
