//! Save artifact storage, the locks guarding it and the background save
//! and upload schedule.

pub mod artifact;
pub mod lock;
pub mod schedule;

pub use artifact::{RemoteSave, SaveArtifact, SaveStore, SessionProgress};
pub use schedule::{run_schedule_loop, Cadence, SessionSchedule};
