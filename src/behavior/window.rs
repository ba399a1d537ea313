//! Measurement window state
//!
//! Counters for the window currently accumulating, and the per-minute rates
//! derived from them. Counters only grow between rollovers; [`WindowState::reset`]
//! is the single place they return to zero.

use crate::behavior::types::{DetectionCategory, PatternRates};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Rates are never computed over less than one minute
const MIN_ELAPSED_MINUTES: f64 = 1.0;

/// Mutable counters for the current window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowState {
    pub window_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub doomscroll_count: u32,
    pub violence_count: u32,
    pub total_violence_score: f64,
    pub detection_counts: BTreeMap<DetectionCategory, u32>,
}

impl WindowState {
    /// Fresh, zeroed window starting at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_id: Uuid::new_v4(),
            window_start: now,
            doomscroll_count: 0,
            violence_count: 0,
            total_violence_score: 0.0,
            detection_counts: BTreeMap::new(),
        }
    }

    pub fn record_doomscroll(&mut self) {
        self.doomscroll_count = self.doomscroll_count.saturating_add(1);
    }

    /// Count a positive detection that already cleared the confidence threshold
    pub fn record_detection(&mut self, category: DetectionCategory, confidence: f64) {
        let count = self.detection_counts.entry(category).or_insert(0);
        *count = count.saturating_add(1);

        if category == DetectionCategory::Violence {
            self.violence_count = self.violence_count.saturating_add(1);
            self.total_violence_score += confidence.clamp(0.0, 1.0);
        }
    }

    /// Minutes since the window opened, floored at one
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        let elapsed_ms = (now - self.window_start).num_milliseconds() as f64;
        (elapsed_ms / 60_000.0).max(MIN_ELAPSED_MINUTES)
    }

    pub fn rates(&self, now: DateTime<Utc>) -> PatternRates {
        let minutes = self.elapsed_minutes(now);

        let avg_violence_score = if self.violence_count > 0 {
            self.total_violence_score / self.violence_count as f64
        } else {
            0.0
        };

        PatternRates {
            doomscroll_rate: self.doomscroll_count as f64 / minutes,
            violence_rate: self.violence_count as f64 / minutes,
            avg_violence_score,
        }
    }

    /// Zero every counter and open a new window at `now`
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::new(now);
    }

    pub fn is_empty(&self) -> bool {
        self.doomscroll_count == 0 && self.detection_counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_new_window_is_zeroed() {
        let window = WindowState::new(t0());
        assert!(window.is_empty());
        assert_eq!(window.rates(t0()), PatternRates::default());
    }

    #[test]
    fn test_elapsed_is_floored_at_one_minute() {
        let window = WindowState::new(t0());
        assert_eq!(window.elapsed_minutes(t0() + Duration::seconds(10)), 1.0);
        assert_eq!(window.elapsed_minutes(t0() + Duration::minutes(4)), 4.0);
    }

    #[test]
    fn test_rates_over_elapsed_minutes() {
        let mut window = WindowState::new(t0());
        for _ in 0..6 {
            window.record_doomscroll();
        }
        window.record_detection(DetectionCategory::Violence, 0.8);
        window.record_detection(DetectionCategory::Violence, 0.6);

        let rates = window.rates(t0() + Duration::minutes(2));
        assert_eq!(rates.doomscroll_rate, 3.0);
        assert_eq!(rates.violence_rate, 1.0);
        assert!((rates.avg_violence_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_non_violence_detection_only_counts_category() {
        let mut window = WindowState::new(t0());
        window.record_detection(DetectionCategory::Deepfake, 0.9);

        assert_eq!(window.violence_count, 0);
        assert_eq!(window.total_violence_score, 0.0);
        assert_eq!(window.detection_counts[&DetectionCategory::Deepfake], 1);
        assert_eq!(window.rates(t0()).avg_violence_score, 0.0);
    }

    #[test]
    fn test_reset_opens_new_window() {
        let mut window = WindowState::new(t0());
        let first_id = window.window_id;
        window.record_doomscroll();
        window.record_detection(DetectionCategory::Violence, 0.9);

        let later = t0() + Duration::minutes(5);
        window.reset(later);

        assert!(window.is_empty());
        assert_eq!(window.violence_count, 0);
        assert_eq!(window.total_violence_score, 0.0);
        assert_eq!(window.window_start, later);
        assert_ne!(window.window_id, first_id);
    }
}
