//! Telemetry source capability and the recorded-file implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::error::{SourceError, TrackerResult};
use crate::types::raw::FieldSpec;
use crate::types::{Category, RawSample};

/// Control events sent to the simulator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEvent {
    SlewOn,
    SlewOff,
    ZuluYearSet,
    ZuluDaySet,
    ZuluHoursSet,
    ZuluMinutesSet,
}

/// The simulator as seen by the tracker
///
/// Samples are requested per category and pushed back asynchronously;
/// `receive` drains whatever arrived since the last call.
pub trait TelemetrySource: Send + Sync {
    fn connect(&self) -> Result<(), SourceError>;
    fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn register_schema(&self, category: Category, fields: &[FieldSpec]) -> Result<(), SourceError>;
    fn request_sample(&self, category: Category) -> Result<(), SourceError>;
    fn receive(&self) -> Result<Vec<RawSample>, SourceError>;
    /// Write values back, e.g. fuel quantities or a slew position
    fn set_sample(&self, sample: &RawSample) -> Result<(), SourceError>;
    /// In-sim text banner
    fn set_text(&self, message: &str, duration_secs: u32) -> Result<(), SourceError>;
    fn transmit_event(&self, event: SimEvent, value: u32) -> Result<(), SourceError>;
}

/// One line of a recording
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    /// Seconds since the start of the recording
    pub timestamp: f64,
    #[serde(flatten)]
    pub sample: RawSample,
}

#[derive(Debug, Deserialize)]
struct Recording {
    samples: Vec<RecordedSample>,
}

#[derive(Debug, Default)]
struct ReplayState {
    connected: bool,
    started: Option<Instant>,
    manual_clock: Option<f64>,
    cursor: usize,
    latest: BTreeMap<Category, RawSample>,
    requested: BTreeSet<Category>,
    registered: BTreeSet<Category>,
}

/// Replays a recorded session (`.json` or `.json.gz`) in real time
///
/// A requested category is answered with the most recent recorded sample
/// of that category. The source reports itself disconnected once the
/// recording is exhausted.
pub struct ReplaySource {
    samples: Vec<RecordedSample>,
    speed: f64,
    state: Mutex<ReplayState>,
}

impl ReplaySource {
    pub fn load(path: &Path, speed: f64) -> TrackerResult<Self> {
        let file = File::open(path)?;
        let recording: Recording = if path.extension().map(|e| e == "gz").unwrap_or(false) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
        } else {
            serde_json::from_reader(BufReader::new(file))?
        };
        log::info!("Loaded {} recorded samples from {}", recording.samples.len(), path.display());
        Ok(Self::from_samples(recording.samples, speed))
    }

    pub fn from_samples(mut samples: Vec<RecordedSample>, speed: f64) -> Self {
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        ReplaySource {
            samples,
            speed: if speed > 0.0 { speed } else { 1.0 },
            state: Mutex::new(ReplayState::default()),
        }
    }

    /// Drive the replay clock by hand instead of wall time
    pub fn set_clock(&self, secs: f64) {
        self.lock_state().manual_clock = Some(secs);
    }

    pub fn is_finished(&self) -> bool {
        self.lock_state().cursor >= self.samples.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ReplayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn elapsed(&self, state: &ReplayState) -> f64 {
        match (state.manual_clock, state.started) {
            (Some(secs), _) => secs,
            (None, Some(started)) => started.elapsed().as_secs_f64() * self.speed,
            (None, None) => 0.0,
        }
    }
}

impl TelemetrySource for ReplaySource {
    fn connect(&self) -> Result<(), SourceError> {
        let mut state = self.lock_state();
        if state.cursor >= self.samples.len() && !self.samples.is_empty() {
            return Err(SourceError::Unavailable("recording finished".to_string()));
        }
        if self.samples.is_empty() {
            return Err(SourceError::Unavailable("recording is empty".to_string()));
        }
        state.connected = true;
        state.started.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn disconnect(&self) {
        self.lock_state().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.lock_state().connected
    }

    fn register_schema(&self, category: Category, fields: &[FieldSpec]) -> Result<(), SourceError> {
        log::debug!("[replay] register {} ({} fields)", category.name(), fields.len());
        self.lock_state().registered.insert(category);
        Ok(())
    }

    fn request_sample(&self, category: Category) -> Result<(), SourceError> {
        let mut state = self.lock_state();
        if !state.connected {
            return Err(SourceError::Disconnected);
        }
        state.requested.insert(category);
        Ok(())
    }

    fn receive(&self) -> Result<Vec<RawSample>, SourceError> {
        let mut state = self.lock_state();
        if !state.connected {
            return Err(SourceError::Disconnected);
        }
        let now = self.elapsed(&state);
        while state.cursor < self.samples.len() && self.samples[state.cursor].timestamp <= now {
            let recorded = &self.samples[state.cursor];
            state.latest.insert(recorded.sample.category, recorded.sample.clone());
            state.cursor += 1;
        }

        let requested = std::mem::take(&mut state.requested);
        let out: Vec<RawSample> = requested
            .into_iter()
            .filter_map(|category| state.latest.remove(&category))
            .collect();

        if state.cursor >= self.samples.len() && state.latest.is_empty() && out.is_empty() {
            state.connected = false;
            return Err(SourceError::Disconnected);
        }
        Ok(out)
    }

    fn set_sample(&self, sample: &RawSample) -> Result<(), SourceError> {
        log::info!("[replay] ignoring write of {} {} value(s)", sample.category.name(), sample.values.len());
        Ok(())
    }

    fn set_text(&self, message: &str, duration_secs: u32) -> Result<(), SourceError> {
        log::info!("[sim text {}s] {}", duration_secs, message);
        Ok(())
    }

    fn transmit_event(&self, event: SimEvent, value: u32) -> Result<(), SourceError> {
        log::info!("[replay] ignoring event {:?}={}", event, value);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::raw::fixtures::primary_raw;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::env;
    use std::fs;
    use std::io::Write;

    fn recorded(timestamp: f64, lat: f64) -> RecordedSample {
        RecordedSample { timestamp, sample: primary_raw(lat, 8.0, 90.0, true) }
    }

    #[test]
    fn test_replay_serves_latest_requested() {
        let source = ReplaySource::from_samples(
            vec![recorded(0.0, 47.0), recorded(0.5, 47.1), recorded(2.0, 47.2)],
            1.0,
        );
        source.connect().unwrap();
        source.set_clock(1.0);

        // nothing requested yet
        assert!(source.receive().unwrap().is_empty());

        source.request_sample(Category::Primary).unwrap();
        source.request_sample(Category::Fuel).unwrap();
        let got = source.receive().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].number("PLANE LATITUDE").unwrap(), 47.1);

        source.set_clock(5.0);
        source.request_sample(Category::Primary).unwrap();
        assert_eq!(source.receive().unwrap()[0].number("PLANE LATITUDE").unwrap(), 47.2);

        // exhausted
        assert!(source.is_finished());
        assert_eq!(source.receive(), Err(SourceError::Disconnected));
        assert!(!source.is_connected());
    }

    #[test]
    fn test_load_gzip_recording() {
        let dir = env::temp_dir().join(format!("flight_tracker_replay_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.json.gz");

        let json = serde_json::json!({ "samples": [recorded(0.0, 47.0), recorded(1.0, 47.5)] });
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(json.to_string().as_bytes()).unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let source = ReplaySource::load(&path, 2.0).unwrap();
        assert_eq!(source.samples.len(), 2);
        assert_eq!(source.samples[1].sample.category, Category::Primary);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_empty_recording_refuses_connect() {
        let source = ReplaySource::from_samples(Vec::new(), 1.0);
        assert!(matches!(source.connect(), Err(SourceError::Unavailable(_))));
    }
}
