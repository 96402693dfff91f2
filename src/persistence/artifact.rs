use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use super::lock::NamedLock;
use crate::error::{TrackerError, TrackerResult};
use crate::processors::landing::LandingReport;
use crate::types::{FuelTanks, GeoPosition, PayloadStations, PrimaryTracking};

const SAVE_EXTENSION: &str = "save";

/// Where and how the aircraft was when the session was saved
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumePosition {
    pub latitude: f64,
    pub longitude: f64,
    pub radio_height_ft: f64,
    pub heading_true_deg: f64,
    pub airspeed_true_kt: f64,
    pub pitch_deg: f64,
    pub bank_deg: f64,
    pub vertical_speed_fpm: f64,
    pub on_ground: bool,
}

impl ResumePosition {
    pub fn from_primary(primary: &PrimaryTracking) -> Self {
        ResumePosition {
            latitude: primary.latitude,
            longitude: primary.longitude,
            radio_height_ft: primary.radio_height_ft,
            heading_true_deg: primary.heading_true_deg,
            airspeed_true_kt: primary.airspeed_true_kt,
            pitch_deg: primary.pitch_deg,
            bank_deg: primary.bank_deg,
            vertical_speed_fpm: primary.vertical_speed_fpm,
            on_ground: primary.on_ground,
        }
    }

    pub fn position(&self) -> GeoPosition {
        GeoPosition::new(self.latitude, self.longitude)
    }
}

/// Session bookkeeping that has to survive a pause
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub tracking_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ground_handling_complete: bool,
    pub was_airborne: bool,
    pub time_saved_secs: f64,
    pub paused_secs: f64,
    pub landings: Vec<LandingReport>,
}

/// In-progress session state persisted per flight
///
/// Only quantities are stored. Tank capacities, station names and counts
/// are re-queried from the simulator on resume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveArtifact {
    pub flight_id: String,
    pub saved_at: DateTime<Utc>,
    pub sim_utc: Option<DateTime<Utc>>,
    /// Gallons by tank id
    pub fuel: BTreeMap<u8, f64>,
    /// Pounds by 1-based station index
    pub payload: BTreeMap<u8, f64>,
    pub position: ResumePosition,
    #[serde(default)]
    pub progress: SessionProgress,
}

impl SaveArtifact {
    pub fn capture(
        flight_id: &str,
        saved_at: DateTime<Utc>,
        sim_utc: Option<DateTime<Utc>>,
        primary: &PrimaryTracking,
        fuel: &FuelTanks,
        payload: &PayloadStations,
        progress: SessionProgress,
    ) -> Self {
        SaveArtifact {
            flight_id: flight_id.to_string(),
            saved_at,
            sim_utc,
            fuel: fuel
                .installed()
                .map(|(tank, level)| (tank.id(), level.quantity_gallons))
                .collect(),
            payload: payload
                .stations
                .iter()
                .map(|(index, station)| (*index, station.weight_lbs))
                .collect(),
            position: ResumePosition::from_primary(primary),
            progress,
        }
    }

    pub fn fuel_total_gallons(&self) -> f64 {
        self.fuel.values().sum()
    }

    pub fn payload_total_lbs(&self) -> f64 {
        self.payload.values().sum()
    }

    /// Gzip-compressed JSON
    pub fn encode(&self) -> TrackerResult<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    pub fn decode(bytes: &[u8]) -> TrackerResult<Self> {
        let mut decoder = GzDecoder::new(bytes);
        let mut json = String::new();
        decoder
            .read_to_string(&mut json)
            .map_err(|e| TrackerError::Serialization(format!("Failed to decompress save: {}", e)))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// A save downloaded from the flight service
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteSave {
    pub saved_at: DateTime<Utc>,
    pub blob: Vec<u8>,
}

/// Per-flight save files guarded by the save lock
///
/// Every file operation takes `save_lock` with the configured bounded
/// wait. Auto-save additionally takes `autosave_lock` with a short wait
/// and skips the cycle when it is busy.
pub struct SaveStore {
    dir: PathBuf,
    save_lock: NamedLock,
    autosave_lock: NamedLock,
    save_wait: Duration,
    autosave_wait: Duration,
}

impl SaveStore {
    pub fn new(dir: impl Into<PathBuf>, save_wait: Duration, autosave_wait: Duration) -> Self {
        SaveStore {
            dir: dir.into(),
            save_lock: NamedLock::new("flight_save"),
            autosave_lock: NamedLock::new("flight_autosave"),
            save_wait,
            autosave_wait,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, flight_id: &str) -> PathBuf {
        let safe: String = flight_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.{}", safe, SAVE_EXTENSION))
    }

    pub fn exists(&self, flight_id: &str) -> bool {
        self.path(flight_id).exists()
    }

    pub fn save(&self, artifact: &SaveArtifact) -> TrackerResult<()> {
        let _guard = self.save_lock.acquire_recovering(self.save_wait)?;
        self.write_unlocked(&artifact.flight_id, &artifact.encode()?)
            .map_err(|e| {
                log::error!("Failed to save flight {}: {}", artifact.flight_id, e);
                e
            })
    }

    /// Background save; returns false when another auto-save holds the
    /// lock or `still_wanted` says the session moved on while waiting
    /// for the save lock
    pub fn try_autosave(&self, artifact: &SaveArtifact, still_wanted: impl FnOnce() -> bool) -> TrackerResult<bool> {
        let _auto = match self.autosave_lock.acquire_recovering(self.autosave_wait) {
            Ok(guard) => guard,
            Err(TrackerError::LockTimeout { .. }) => {
                log::debug!("Auto-save for {} skipped, previous one still running", artifact.flight_id);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        let _guard = self.save_lock.acquire_recovering(self.save_wait)?;
        if !still_wanted() {
            log::debug!("Auto-save for {} dropped, session changed", artifact.flight_id);
            return Ok(false);
        }
        self.write_unlocked(&artifact.flight_id, &artifact.encode()?)?;
        Ok(true)
    }

    pub fn load(&self, flight_id: &str) -> TrackerResult<Option<SaveArtifact>> {
        let bytes = match self.read_bytes(flight_id)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        SaveArtifact::decode(&bytes).map(Some).map_err(|e| {
            log::error!("Failed to load save for flight {}: {}", flight_id, e);
            e
        })
    }

    /// Raw file contents, for upload
    pub fn read_bytes(&self, flight_id: &str) -> TrackerResult<Option<Vec<u8>>> {
        let _guard = self.save_lock.acquire_recovering(self.save_wait)?;
        let path = self.path(flight_id);
        if !path.exists() {
            return Ok(None);
        }
        let mut bytes = Vec::new();
        File::open(&path)?.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    /// Returns true if a file was removed
    pub fn delete(&self, flight_id: &str) -> TrackerResult<bool> {
        let _guard = self.save_lock.acquire_recovering(self.save_wait)?;
        let path = self.path(flight_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        log::info!("Deleted save for flight {}", flight_id);
        Ok(true)
    }

    /// Replace the local save with a remote one if the remote is newer.
    /// Returns true when the local file was replaced.
    pub fn restore_if_newer(&self, flight_id: &str, remote: &RemoteSave) -> TrackerResult<bool> {
        let remote_artifact = SaveArtifact::decode(&remote.blob)?;
        let _guard = self.save_lock.acquire_recovering(self.save_wait)?;

        let path = self.path(flight_id);
        if path.exists() {
            let mut bytes = Vec::new();
            File::open(&path)?.read_to_end(&mut bytes)?;
            match SaveArtifact::decode(&bytes) {
                Ok(local) if local.saved_at >= remote.saved_at => return Ok(false),
                Ok(_) => {}
                Err(e) => log::warn!("Local save for {} unreadable, replacing: {}", flight_id, e),
            }
        }

        self.write_unlocked(flight_id, &remote.blob)?;
        log::info!(
            "Restored save for flight {} from remote copy of {}",
            flight_id,
            remote_artifact.saved_at
        );
        Ok(true)
    }

    /// Temp file then rename, so a reader never sees a partial write
    fn write_unlocked(&self, flight_id: &str, bytes: &[u8]) -> TrackerResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(flight_id);
        let tmp = path.with_extension(format!("{}.tmp", SAVE_EXTENSION));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::types::{FuelTank, PayloadStation, TankLevel};

    pub fn sample_artifact(flight_id: &str) -> SaveArtifact {
        let primary = PrimaryTracking {
            latitude: 47.458_012_345_678_9,
            longitude: 8.548_123_456_789_1,
            radio_height_ft: 0.1,
            heading_true_deg: 283.742_1,
            airspeed_true_kt: 0.3,
            pitch_deg: 1.05,
            bank_deg: -0.2,
            vertical_speed_fpm: -1.5,
            on_ground: true,
            ..Default::default()
        };
        let mut fuel = FuelTanks { weight_per_gallon_lbs: 6.7, ..Default::default() };
        fuel.tanks.insert(
            FuelTank::LeftMain,
            TankLevel { capacity_gallons: 1_000.0, quantity_gallons: 512.123_456_789 },
        );
        fuel.tanks.insert(
            FuelTank::RightMain,
            TankLevel { capacity_gallons: 1_000.0, quantity_gallons: 498.000_000_1 },
        );
        let mut payload = PayloadStations::default();
        payload.stations.insert(1, PayloadStation { name: "Pilot".into(), weight_lbs: 170.25 });
        payload.stations.insert(2, PayloadStation { name: "Cargo".into(), weight_lbs: 1_234.567 });

        SaveArtifact::capture(
            flight_id,
            Utc::now(),
            Some(Utc::now()),
            &primary,
            &fuel,
            &payload,
            SessionProgress::default(),
        )
    }
}
