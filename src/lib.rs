//! Aigis Pulse - Behavior pattern aggregation for the Aigis browsing safety extension
//!
//! Pulse turns browsing signals (scroll samples, interactions, reel sightings,
//! classifier detections) into coarse usage patterns: rolling rates of
//! doomscrolling and violent-content exposure plus a status label, published
//! to listeners and persisted for the parent dashboard.
//!
//! ## Modules
//!
//! - **Behavior**: the synchronous core (triggers, window counters, status policy, history)
//! - **Service**: the live tokio runtime that owns the aggregator
//! - **Classifier / Monitor**: clients for the remote classification and monitoring backends

pub mod behavior;
pub mod classifier;
pub mod config;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod service;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use behavior::{Aggregator, Event, Pattern, PatternStatus};
pub use config::{EndpointSettings, PatternConfig};
pub use error::PulseError;
pub use notify::PatternBus;
pub use service::{PatternHandle, PatternService};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, PatternStore};

/// Pulse version reported by the CLI and doctor
pub const PULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI and doctor
pub const PRODUCER_NAME: &str = "aigis-pulse";
