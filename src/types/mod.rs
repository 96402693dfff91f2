pub mod position;
pub mod raw;
pub mod snapshots;

pub use position::*;
pub use raw::{RawSample, RawValue, Snapshot};
pub use snapshots::*;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Telemetry categories, each sampled at its own interval
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Primary,
    Secondary,
    Fuel,
    Payload,
    Identity,
    WeightAndBalance,
    LandingAnalysis,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Primary,
        Category::Secondary,
        Category::Fuel,
        Category::Payload,
        Category::Identity,
        Category::WeightAndBalance,
        Category::LandingAnalysis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Primary => "primary",
            Category::Secondary => "secondary",
            Category::Fuel => "fuel",
            Category::Payload => "payload",
            Category::Identity => "identity",
            Category::WeightAndBalance => "weight_and_balance",
            Category::LandingAnalysis => "landing_analysis",
        }
    }
}

/// Tracking session state machine states
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingStatus {
    /// No flight bound, or tracking stopped
    #[default]
    NotTracking,
    /// Fresh flight bound, evaluating start conditions
    Preparing,
    /// Paused flight bound, evaluating resume conditions
    Resuming,
    /// Fuel and payload loading before tracking proper
    GroundOperations,
    /// Flight is being tracked
    Tracking,
    /// Final report is being submitted
    Finished,
}

impl TrackingStatus {
    /// States in which the bound flight cannot be replaced
    pub fn is_active(&self) -> bool {
        matches!(self, TrackingStatus::GroundOperations | TrackingStatus::Tracking)
    }

    /// States in which start conditions are monitored
    pub fn is_preparing(&self) -> bool {
        matches!(self, TrackingStatus::Preparing | TrackingStatus::Resuming)
    }
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TrackingStatus::NotTracking => "not tracking",
            TrackingStatus::Preparing => "preparing",
            TrackingStatus::Resuming => "resuming",
            TrackingStatus::GroundOperations => "ground operations",
            TrackingStatus::Tracking => "tracking",
            TrackingStatus::Finished => "finished",
        };
        write!(f, "{}", text)
    }
}

/// Consecutive pair of snapshots of one category
///
/// `old` is the previously accepted snapshot, or the zero-value sentinel
/// (`previous_at == None`) when `new` is the first sample received.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent<T> {
    pub old: T,
    pub new: T,
    pub previous_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

impl<T> ChangeEvent<T> {
    pub fn new(old: T, new: T, previous_at: Option<DateTime<Utc>>, received_at: DateTime<Utc>) -> Self {
        Self { old, new, previous_at, received_at }
    }

    pub fn is_first(&self) -> bool {
        self.previous_at.is_none()
    }

    /// Arrival spacing between the two samples
    pub fn elapsed(&self) -> Option<ChronoDuration> {
        self.previous_at.map(|previous| self.received_at - previous)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed()
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

impl<T: Default> ChangeEvent<T> {
    pub fn first(new: T, received_at: DateTime<Utc>) -> Self {
        Self::new(T::default(), new, None, received_at)
    }
}
