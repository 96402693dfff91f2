//! Flight simulator tracking core: telemetry acquisition, change
//! processors, the tracking session state machine, the event log and
//! save persistence. Headless; front ends subscribe to [`TrackerEvent`]s.

pub mod acquisition;
pub mod announce;
pub mod config;
pub mod error;
pub mod event_log;
pub mod freshness;
pub mod persistence;
pub mod processors;
pub mod queue;
pub mod reconnect;
pub mod service;
pub mod session;
pub mod source;
pub mod status;
pub mod types;

pub use config::TrackerConfig;
pub use error::{TrackerError, TrackerResult};
pub use session::{Flight, Tracker, TrackerEvent};
pub use types::TrackingStatus;
