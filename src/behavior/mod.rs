//! Behavior pattern aggregation
//!
//! Converts a stream of browsing signals (scroll samples, interactions, reel
//! sightings, classifier detections) into coarse status snapshots.
//!
//! Events → Adapter → Triggers → Window counters → Policy → Pattern → Encoder

pub mod adapter;
pub mod aggregator;
pub mod encoder;
pub mod history;
pub mod policy;
pub mod replay;
pub mod triggers;
pub mod types;
pub mod window;

pub use aggregator::{Aggregator, IngestOutcome};
pub use encoder::{ActivityLog, PatternUpdate};
pub use history::PatternHistory;
pub use policy::{AbsoluteThresholdPolicy, StatusPolicy, TrendPolicy};
pub use replay::{replay, ReplayReport};
pub use types::{
    DetectionCategory, DoomscrollTrigger, Event, Pattern, PatternKind, PatternRates,
    PatternStatus, Recorded,
};
pub use window::WindowState;
