//! Outbound message encoding
//!
//! Shapes patterns into the messages listeners and the monitoring backend
//! consume: the `pattern_update` broadcast and the `usage_pattern` activity log.

use crate::behavior::types::{Pattern, PatternStatus};
use crate::error::PulseError;
use serde::{Deserialize, Serialize};

/// Broadcast message type understood by the popup and dashboard
pub const PATTERN_UPDATE_TYPE: &str = "pattern_update";

/// Activity type recorded by the monitoring backend
pub const USAGE_PATTERN_ACTIVITY: &str = "usage_pattern";

/// `{type: "pattern_update", data: Pattern}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternUpdate {
    #[serde(rename = "type")]
    pub message_type: String,
    pub data: Pattern,
}

impl PatternUpdate {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            message_type: PATTERN_UPDATE_TYPE.to_string(),
            data: pattern,
        }
    }

    pub fn to_json(&self) -> Result<String, PulseError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Details attached to an activity log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDetails {
    pub status: PatternStatus,
    pub doomscroll_rate: f64,
    pub violence_rate: f64,
    pub avg_violence_score: f64,
    pub doomscroll_count: u32,
    pub violence_count: u32,
}

/// Payload for the monitoring backend's log-activity endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub child_id: u64,
    pub activity_type: String,
    pub url: String,
    /// Seconds the reported window has been open
    pub duration: f64,
    pub risk_level: u8,
    pub details: ActivityDetails,
}

impl ActivityLog {
    pub fn from_pattern(pattern: &Pattern, child_id: u64, url: Option<&str>) -> Self {
        Self {
            child_id,
            activity_type: USAGE_PATTERN_ACTIVITY.to_string(),
            url: url.unwrap_or_default().to_string(),
            duration: pattern.elapsed_secs(),
            risk_level: risk_level(pattern.status),
            details: ActivityDetails {
                status: pattern.status,
                doomscroll_rate: pattern.doomscroll_rate,
                violence_rate: pattern.violence_rate,
                avg_violence_score: pattern.avg_violence_score,
                doomscroll_count: pattern.doomscroll_count,
                violence_count: pattern.violence_count,
            },
        }
    }
}

/// 0 for healthy statuses, 1 for stable, 2 for bad or worsening
pub fn risk_level(status: PatternStatus) -> u8 {
    match status {
        PatternStatus::Good | PatternStatus::Improving => 0,
        PatternStatus::Stable => 1,
        PatternStatus::Bad | PatternStatus::Worsening => 2,
    }
}
