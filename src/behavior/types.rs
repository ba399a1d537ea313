//! Behavior pattern data types
//!
//! Inbound browsing-signal events and the derived [`Pattern`] snapshots that flow
//! out to storage and listeners.

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Content category reported by the remote classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionCategory {
    Violence,
    Nudity,
    Deepfake,
    Brainrot,
    /// Flashing-light / epilepsy risk
    #[serde(alias = "epilepsy")]
    Flash,
}

impl DetectionCategory {
    pub const ALL: [DetectionCategory; 5] = [
        DetectionCategory::Violence,
        DetectionCategory::Nudity,
        DetectionCategory::Deepfake,
        DetectionCategory::Brainrot,
        DetectionCategory::Flash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionCategory::Violence => "violence",
            DetectionCategory::Nudity => "nudity",
            DetectionCategory::Deepfake => "deepfake",
            DetectionCategory::Brainrot => "brainrot",
            DetectionCategory::Flash => "flash",
        }
    }
}

impl fmt::Display for DetectionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped browsing signal
///
/// Events are ephemeral: the aggregator folds them into window counters and
/// never stores them individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// Page scroll offset sampled by the scroll listener
    Scroll {
        /// Vertical scroll offset in pixels
        position: f64,
        #[serde(with = "ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    /// Click, keydown, mousedown or touchstart
    Interaction {
        #[serde(with = "ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    /// Short-form video elements currently observed on the page
    ReelAppeared {
        count: u32,
        #[serde(with = "ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    /// Labeled result from the remote classifier
    Detection {
        category: DetectionCategory,
        is_positive: bool,
        /// Classifier confidence (0-1)
        confidence: f64,
        #[serde(with = "ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    /// Navigation to a new page; restarts the time-on-page clock
    PageVisit {
        url: String,
        #[serde(with = "ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Scroll { timestamp, .. }
            | Event::Interaction { timestamp }
            | Event::ReelAppeared { timestamp, .. }
            | Event::Detection { timestamp, .. }
            | Event::PageVisit { timestamp, .. } => *timestamp,
        }
    }

    /// Short name used in log fields
    pub fn kind_name(&self) -> &'static str {
        match self {
            Event::Scroll { .. } => "scroll",
            Event::Interaction { .. } => "interaction",
            Event::ReelAppeared { .. } => "reel_appeared",
            Event::Detection { .. } => "detection",
            Event::PageVisit { .. } => "page_visit",
        }
    }
}

/// Heuristic that produced a doomscroll increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoomscrollTrigger {
    RapidScrolling,
    PassiveConsumption,
    ReelBinge,
}

impl DoomscrollTrigger {
    pub const ALL: [DoomscrollTrigger; 3] = [
        DoomscrollTrigger::RapidScrolling,
        DoomscrollTrigger::PassiveConsumption,
        DoomscrollTrigger::ReelBinge,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            DoomscrollTrigger::RapidScrolling => 0,
            DoomscrollTrigger::PassiveConsumption => 1,
            DoomscrollTrigger::ReelBinge => 2,
        }
    }
}

/// What an ingested event changed in the current window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recorded {
    Doomscroll(DoomscrollTrigger),
    Detection {
        category: DetectionCategory,
        confidence: f64,
    },
}

/// Coarse status summarizing the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    Good,
    Bad,
    Stable,
    Improving,
    Worsening,
}

impl fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatternStatus::Good => "good",
            PatternStatus::Bad => "bad",
            PatternStatus::Stable => "stable",
            PatternStatus::Improving => "improving",
            PatternStatus::Worsening => "worsening",
        };
        f.write_str(s)
    }
}

/// Why a pattern was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// After a qualifying event
    Current,
    /// At window rollover
    Periodic,
    /// On demand from a listener
    Query,
}

/// Per-minute rates for one window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRates {
    pub doomscroll_rate: f64,
    pub violence_rate: f64,
    /// Mean confidence of counted violence detections, 0 when none
    pub avg_violence_score: f64,
}

/// Immutable snapshot of a window, persisted and broadcast to listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub doomscroll_rate: f64,
    pub violence_rate: f64,
    pub avg_violence_score: f64,
    pub status: PatternStatus,
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub window_id: Uuid,
    #[serde(with = "ts_milliseconds")]
    pub window_start: DateTime<Utc>,
    pub doomscroll_count: u32,
    pub violence_count: u32,
    #[serde(default)]
    pub detection_counts: BTreeMap<DetectionCategory, u32>,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Pattern {
    pub fn rates(&self) -> PatternRates {
        PatternRates {
            doomscroll_rate: self.doomscroll_rate,
            violence_rate: self.violence_rate,
            avg_violence_score: self.avg_violence_score,
        }
    }

    /// Seconds between the window start and this snapshot
    pub fn elapsed_secs(&self) -> f64 {
        ((self.timestamp - self.window_start).num_milliseconds() as f64 / 1000.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_scroll_event_deserialization() {
        let json = r#"{"kind": "scroll", "position": 1200.5, "timestamp": 1705327200000}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            Event::Scroll {
                position: 1200.5,
                timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
            }
        );
        assert_eq!(event.kind_name(), "scroll");
    }

    #[test]
    fn test_detection_event_deserialization() {
        let json = r#"{
            "kind": "detection",
            "category": "epilepsy",
            "is_positive": true,
            "confidence": 0.8,
            "timestamp": 1705327200000
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        match event {
            Event::Detection {
                category,
                is_positive,
                confidence,
                ..
            } => {
                assert_eq!(category, DetectionCategory::Flash);
                assert!(is_positive);
                assert_eq!(confidence, 0.8);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&PatternStatus::Improving).unwrap(),
            "\"improving\""
        );
        assert_eq!(PatternStatus::Bad.to_string(), "bad");
    }

    #[test]
    fn test_pattern_wire_shape() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let mut detection_counts = BTreeMap::new();
        detection_counts.insert(DetectionCategory::Violence, 2);

        let pattern = Pattern {
            doomscroll_rate: 0.5,
            violence_rate: 1.0,
            avg_violence_score: 0.7,
            status: PatternStatus::Bad,
            kind: PatternKind::Periodic,
            window_id: Uuid::nil(),
            window_start: start,
            doomscroll_count: 1,
            violence_count: 2,
            detection_counts,
            timestamp: start + chrono::Duration::minutes(2),
        };

        let value = serde_json::to_value(&pattern).unwrap();
        assert_eq!(value["doomscrollRate"], 0.5);
        assert_eq!(value["avgViolenceScore"], 0.7);
        assert_eq!(value["status"], "bad");
        assert_eq!(value["type"], "periodic");
        assert_eq!(value["detectionCounts"]["violence"], 2);
        assert_eq!(value["timestamp"], 1705327320000i64);
        assert_eq!(pattern.elapsed_secs(), 120.0);

        let back: Pattern = serde_json::from_value(value).unwrap();
        assert_eq!(back, pattern);
    }
}
