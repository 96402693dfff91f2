//! Flight binding, the per-flight session record and the state machine.

pub mod conditions;
pub mod ground_handling;
pub mod machine;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::TrackerResult;
use crate::persistence::artifact::{SaveArtifact, SessionProgress};
use crate::processors::landing::LandingReport;
use crate::types::{
    AircraftIdentity, Category, FuelTanks, GeoPosition, LandingAnalysis, PayloadStations,
    PrimaryTracking, SecondaryTracking, Snapshot, WeightAndBalance,
};
use conditions::{ConditionKind, Expectations, LiveValues, TrackingConditions};
use ground_handling::GroundHandling;

pub use machine::{Tracker, TrackerEvent};

/// The booked flight a session is tracked against
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: String,
    pub origin_icao: String,
    pub origin: GeoPosition,
    pub destination_icao: String,
    /// Simulator time to depart at; `None` means real time
    #[serde(default)]
    pub departure_utc: Option<DateTime<Utc>>,
    pub fuel_gallons: f64,
    pub payload_lbs: f64,
    #[serde(default)]
    pub plane_model_hash: Option<String>,
    /// Paused earlier; bind resumes from the save instead of starting over
    #[serde(default)]
    pub resumable: bool,
}

impl Flight {
    pub fn load(path: &Path) -> TrackerResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Everything that lives exactly as long as one bound flight
#[derive(Clone, Debug)]
pub struct TrackingSession {
    pub flight_id: String,
    pub tracking_started_at: Option<DateTime<Utc>>,
    pub paused_secs: f64,
    pub time_saved_secs: f64,
    pub was_airborne: bool,
    pub landings: Vec<LandingReport>,
    pub conditions: TrackingConditions,
    pub ground_handling: GroundHandling,
    pub auto_set_attempted: BTreeSet<ConditionKind>,
    /// When the save being resumed from was written
    pub resumed_from: Option<DateTime<Utc>>,
}

impl TrackingSession {
    pub fn fresh(flight: &Flight, config: &TrackerConfig) -> Self {
        TrackingSession {
            flight_id: flight.id.clone(),
            tracking_started_at: None,
            paused_secs: 0.0,
            time_saved_secs: 0.0,
            was_airborne: false,
            landings: Vec::new(),
            conditions: TrackingConditions::new(Expectations::fresh(flight, config), config),
            ground_handling: GroundHandling::estimate(flight.fuel_gallons, flight.payload_lbs, config),
            auto_set_attempted: BTreeSet::new(),
            resumed_from: None,
        }
    }

    pub fn resuming(flight: &Flight, artifact: &SaveArtifact, config: &TrackerConfig) -> Self {
        let progress = &artifact.progress;
        let ground_handling = if progress.ground_handling_complete {
            GroundHandling::completed()
        } else {
            GroundHandling::estimate(flight.fuel_gallons, flight.payload_lbs, config)
        };
        TrackingSession {
            flight_id: flight.id.clone(),
            tracking_started_at: progress.tracking_started_at,
            paused_secs: progress.paused_secs,
            time_saved_secs: progress.time_saved_secs,
            was_airborne: progress.was_airborne,
            landings: progress.landings.clone(),
            conditions: TrackingConditions::new(Expectations::resume(flight, artifact, config), config),
            ground_handling,
            auto_set_attempted: BTreeSet::new(),
            resumed_from: Some(artifact.saved_at),
        }
    }

    pub fn progress(&mut self, now: DateTime<Utc>) -> SessionProgress {
        SessionProgress {
            tracking_started_at: self.tracking_started_at,
            ground_handling_complete: self.ground_handling.is_complete(now),
            was_airborne: self.was_airborne,
            time_saved_secs: self.time_saved_secs,
            paused_secs: self.paused_secs,
            landings: self.landings.clone(),
        }
    }
}

/// Most recent snapshot of every category, shared between the
/// acquisition loop and the state machine
#[derive(Clone, Debug, Default)]
pub struct LatestSnapshots {
    pub primary: Option<PrimaryTracking>,
    pub secondary: Option<SecondaryTracking>,
    pub fuel: Option<FuelTanks>,
    pub payload: Option<PayloadStations>,
    pub identity: Option<AircraftIdentity>,
    pub weight_and_balance: Option<WeightAndBalance>,
    pub landing: Option<LandingAnalysis>,
    pub received_at: BTreeMap<Category, DateTime<Utc>>,
}

impl LatestSnapshots {
    /// Store `snapshot`, handing back the value it replaces
    pub fn replace(
        &mut self,
        snapshot: Snapshot,
        at: DateTime<Utc>,
    ) -> (Option<Snapshot>, Option<DateTime<Utc>>) {
        let category = snapshot.category();
        let previous = self.get(category);
        match snapshot {
            Snapshot::Primary(s) => self.primary = Some(s),
            Snapshot::Secondary(s) => self.secondary = Some(s),
            Snapshot::Fuel(s) => self.fuel = Some(s),
            Snapshot::Payload(s) => self.payload = Some(s),
            Snapshot::Identity(s) => self.identity = Some(s),
            Snapshot::WeightAndBalance(s) => self.weight_and_balance = Some(s),
            Snapshot::LandingAnalysis(s) => self.landing = Some(s),
        }
        let previous_at = self.received_at.insert(category, at);
        (previous, previous_at)
    }

    pub fn get(&self, category: Category) -> Option<Snapshot> {
        match category {
            Category::Primary => self.primary.clone().map(Snapshot::Primary),
            Category::Secondary => self.secondary.clone().map(Snapshot::Secondary),
            Category::Fuel => self.fuel.clone().map(Snapshot::Fuel),
            Category::Payload => self.payload.clone().map(Snapshot::Payload),
            Category::Identity => self.identity.clone().map(Snapshot::Identity),
            Category::WeightAndBalance => self.weight_and_balance.clone().map(Snapshot::WeightAndBalance),
            Category::LandingAnalysis => self.landing.clone().map(Snapshot::LandingAnalysis),
        }
    }

    pub fn live_values(&self, now: DateTime<Utc>) -> LiveValues<'_> {
        LiveValues {
            now,
            primary: self.primary.as_ref(),
            secondary: self.secondary.as_ref(),
            fuel: self.fuel.as_ref(),
            payload: self.payload.as_ref(),
            identity: self.identity.as_ref(),
        }
    }
}
