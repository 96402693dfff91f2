use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TrackerResult;
use crate::types::Category;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // ── Sample intervals (ms) ──
    pub primary_interval_ms: u64,
    pub secondary_interval_ms: u64,
    pub fuel_interval_ms: u64,
    pub payload_interval_ms: u64,
    pub identity_interval_ms: u64,
    pub weight_and_balance_interval_ms: u64,
    pub landing_interval_ms: u64,
    pub landing_fast_interval_ms: u64,
    pub landing_fast_below_ft: f64,

    // ── Loop pacing ──
    pub processor_idle_ms: u64,
    pub reconnect_idle_secs: u64,
    pub reconnect_bound_secs: u64,

    // ── Persistence & upload ──
    pub save_dir: PathBuf,
    pub save_interval_secs: u64,
    pub position_report_interval_secs: u64,
    pub autosave_upload_interval_secs: u64,
    pub save_lock_wait_secs: u64,
    pub autosave_lock_wait_ms: u64,

    // ── Signal analysis ──
    pub turn_threshold_deg: f64,
    pub turn_sample_spacing_ms: i64,
    pub vertical_profile_threshold_fpm: f64,
    pub warning_debounce_secs: f64,

    // ── Integrity ──
    pub teleport_max_speed_kt: f64,
    pub utc_jump_secs: f64,
    pub fuel_tolerance_gallons: f64,
    pub payload_tolerance_lbs: f64,

    // ── Events ──
    pub event_coalesce_distance_m: f64,

    // ── Start conditions ──
    pub start_distance_m: f64,
    pub resume_distance_m: f64,
    pub resume_altitude_ft: f64,
    pub time_sync_tolerance_secs: i64,
    pub require_time_sync: bool,
    pub require_fuel_match: bool,
    pub require_payload_match: bool,
    pub require_plane_match: bool,
    pub require_realism: bool,
    pub require_location: bool,

    // ── Ground handling ──
    pub fuel_loading_gallons_per_min: f64,
    pub payload_loading_lbs_per_min: f64,
    pub ground_handling_min_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            primary_interval_ms: 100,
            secondary_interval_ms: 500,
            fuel_interval_ms: 5_000,
            payload_interval_ms: 5_000,
            identity_interval_ms: 10_000,
            weight_and_balance_interval_ms: 5_000,
            landing_interval_ms: 500,
            landing_fast_interval_ms: 25,
            landing_fast_below_ft: 500.0,

            processor_idle_ms: 500,
            reconnect_idle_secs: 30,
            reconnect_bound_secs: 5,

            save_dir: PathBuf::from("flight_tracker_saves"),
            save_interval_secs: 120,
            position_report_interval_secs: 30,
            autosave_upload_interval_secs: 600,
            save_lock_wait_secs: 30,
            autosave_lock_wait_ms: 50,

            turn_threshold_deg: 3.0,
            turn_sample_spacing_ms: 500,
            vertical_profile_threshold_fpm: 300.0,
            warning_debounce_secs: 10.0,

            teleport_max_speed_kt: 1_500.0,
            utc_jump_secs: 30.0,
            fuel_tolerance_gallons: 1.0,
            payload_tolerance_lbs: 5.0,

            event_coalesce_distance_m: 20.0,

            start_distance_m: 5_000.0,
            resume_distance_m: 100.0,
            resume_altitude_ft: 50.0,
            time_sync_tolerance_secs: 60,
            require_time_sync: true,
            require_fuel_match: true,
            require_payload_match: true,
            require_plane_match: true,
            require_realism: true,
            require_location: true,

            fuel_loading_gallons_per_min: 150.0,
            payload_loading_lbs_per_min: 1_000.0,
            ground_handling_min_secs: 30,
        }
    }
}

impl TrackerConfig {
    /// Load from a JSON file; keys that are absent keep their defaults
    pub fn load(path: &Path) -> TrackerResult<Self> {
        let text = fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Normal (slow) sample interval of a category
    pub fn interval(&self, category: Category) -> Duration {
        let ms = match category {
            Category::Primary => self.primary_interval_ms,
            Category::Secondary => self.secondary_interval_ms,
            Category::Fuel => self.fuel_interval_ms,
            Category::Payload => self.payload_interval_ms,
            Category::Identity => self.identity_interval_ms,
            Category::WeightAndBalance => self.weight_and_balance_interval_ms,
            Category::LandingAnalysis => self.landing_interval_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn processor_idle(&self) -> Duration {
        Duration::from_millis(self.processor_idle_ms)
    }

    pub fn save_lock_wait(&self) -> Duration {
        Duration::from_secs(self.save_lock_wait_secs)
    }

    pub fn autosave_lock_wait(&self) -> Duration {
        Duration::from_millis(self.autosave_lock_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = env::temp_dir().join("flight_tracker_config_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{ "primary_interval_ms": 250, "require_time_sync": false }"#).unwrap();

        let config = TrackerConfig::load(&path).unwrap();
        assert_eq!(config.primary_interval_ms, 250);
        assert!(!config.require_time_sync);
        assert_eq!(config.secondary_interval_ms, 500);
        assert_eq!(config.interval(Category::LandingAnalysis), Duration::from_millis(500));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_storage_error() {
        let result = TrackerConfig::load(Path::new("/nonexistent/flight_tracker.json"));
        assert!(matches!(result, Err(crate::error::TrackerError::Storage(_))));
    }
}
