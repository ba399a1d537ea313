//! Engine configuration
//!
//! [`PatternConfig`] carries every threshold the aggregator recognizes, with the
//! values observed in the extension as defaults. Durations are milliseconds so
//! the JSON form matches what the extension stores. [`EndpointSettings`] holds
//! the remote service locations, read from the environment.

use crate::error::PulseError;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default classifier backend base URL
pub const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:8000";

/// Default per-request timeout for remote calls, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Upper bound for every millisecond interval and threshold (one week)
pub const MAX_INTERVAL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Whether doomscroll trigger cooldowns are shared or tracked per trigger kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// One cooldown shared by rapid scrolling, passive consumption and reel binge
    Global,
    /// Each trigger kind has its own cooldown
    PerTrigger,
}

/// Which status derivation the aggregator applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicyKind {
    /// `good` / `bad` against fixed rate thresholds
    Absolute,
    /// `improving` / `worsening` / `stable` against the previous closed window
    Trend,
}

/// Thresholds and timing for the behavior pattern aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatternConfig {
    /// Doomscroll events per minute at which status turns `bad`
    pub doomscroll_rate_threshold: f64,
    /// Violence detections per minute at which status turns `bad`
    pub violence_rate_threshold: f64,
    /// Confidence a positive detection must exceed to be counted
    pub detection_confidence_threshold: f64,
    /// Scroll speed (px/s) considered rapid
    pub scroll_speed_threshold: f64,
    /// How long rapid scrolling must be sustained (ms)
    pub scroll_duration_threshold: u64,
    /// Time on page before passive consumption can fire (ms)
    pub page_time_threshold: u64,
    /// Time without interaction before passive consumption can fire (ms)
    pub interaction_idle_threshold: u64,
    /// Short-form videos on page that count as a reel binge
    pub reel_count_threshold: u32,
    /// Minimum spacing between doomscroll increments (ms)
    pub warning_cooldown: u64,
    /// Window length (ms)
    pub rollover_interval: u64,
    /// Closed-window patterns retained for trend comparison
    pub history_cap: usize,
    pub cooldown_scope: CooldownScope,
    pub status_policy: StatusPolicyKind,
    /// How often the live service re-checks passive consumption (ms)
    pub idle_check_interval: u64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            doomscroll_rate_threshold: 2.0,
            violence_rate_threshold: 0.5,
            detection_confidence_threshold: 0.5,
            scroll_speed_threshold: 1000.0,
            scroll_duration_threshold: 2_000,
            page_time_threshold: 60_000,
            interaction_idle_threshold: 30_000,
            reel_count_threshold: 3,
            warning_cooldown: 30_000,
            rollover_interval: 300_000,
            history_cap: 10,
            cooldown_scope: CooldownScope::Global,
            status_policy: StatusPolicyKind::Absolute,
            idle_check_interval: 5_000,
        }
    }
}

impl PatternConfig {
    /// Parse a configuration document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, PulseError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration (pretty-printed)
    pub fn to_json(&self) -> Result<String, PulseError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject thresholds the aggregator cannot work with
    pub fn validate(&self) -> Result<(), PulseError> {
        let rates = [
            ("doomscrollRateThreshold", self.doomscroll_rate_threshold),
            ("violenceRateThreshold", self.violence_rate_threshold),
            ("scrollSpeedThreshold", self.scroll_speed_threshold),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value <= 0.0 {
                return Err(PulseError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.detection_confidence_threshold) {
            return Err(PulseError::InvalidConfig(format!(
                "detectionConfidenceThreshold must be within [0, 1], got {}",
                self.detection_confidence_threshold
            )));
        }

        let intervals = [
            ("rolloverInterval", self.rollover_interval),
            ("idleCheckInterval", self.idle_check_interval),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(PulseError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }

        let bounded = [
            ("scrollDurationThreshold", self.scroll_duration_threshold),
            ("pageTimeThreshold", self.page_time_threshold),
            ("interactionIdleThreshold", self.interaction_idle_threshold),
            ("warningCooldown", self.warning_cooldown),
            ("rolloverInterval", self.rollover_interval),
            ("idleCheckInterval", self.idle_check_interval),
        ];
        for (name, value) in bounded {
            if value > MAX_INTERVAL_MS {
                return Err(PulseError::InvalidConfig(format!(
                    "{name} must be at most {MAX_INTERVAL_MS} ms, got {value}"
                )));
            }
        }

        if self.history_cap == 0 {
            return Err(PulseError::InvalidConfig(
                "historyCap must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn scroll_duration(&self) -> Duration {
        millis(self.scroll_duration_threshold)
    }

    pub fn page_time(&self) -> Duration {
        millis(self.page_time_threshold)
    }

    pub fn interaction_idle(&self) -> Duration {
        millis(self.interaction_idle_threshold)
    }

    pub fn cooldown(&self) -> Duration {
        millis(self.warning_cooldown)
    }

    pub fn rollover(&self) -> Duration {
        millis(self.rollover_interval)
    }

    /// Idle re-check period on the event clock
    pub fn idle_check(&self) -> Duration {
        millis(self.idle_check_interval)
    }

    /// Rollover period as a timer interval
    pub fn rollover_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rollover_interval.min(MAX_INTERVAL_MS))
    }

    /// Idle re-check period as a timer interval
    pub fn idle_check_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.idle_check_interval.min(MAX_INTERVAL_MS))
    }
}

/// Accessors clamp so an unvalidated config cannot overflow clock arithmetic
fn millis(ms: u64) -> Duration {
    Duration::milliseconds(ms.min(MAX_INTERVAL_MS) as i64)
}

/// Remote endpoints used by the classifier and activity-log clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    /// Base URL of the classification backend
    pub classifier_url: String,
    /// Base URL of the monitoring backend; `None` disables activity logging
    pub monitor_url: Option<String>,
    /// Child profile the activity log is attributed to
    pub child_id: u64,
    /// Timeout applied to every remote call
    pub request_timeout_secs: u64,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            classifier_url: DEFAULT_CLASSIFIER_URL.to_string(),
            monitor_url: None,
            child_id: 1,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl EndpointSettings {
    /// Read settings from the process environment, loading `.env` first if present
    pub fn from_env() -> Result<Self, PulseError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PulseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let child_id = match lookup("AIGIS_CHILD_ID") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                PulseError::InvalidConfig(format!("AIGIS_CHILD_ID must be an integer, got {raw:?}"))
            })?,
            None => defaults.child_id,
        };

        let request_timeout_secs = match lookup("AIGIS_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                PulseError::InvalidConfig(format!(
                    "AIGIS_REQUEST_TIMEOUT_SECS must be an integer, got {raw:?}"
                ))
            })?,
            None => defaults.request_timeout_secs,
        };

        Ok(Self {
            classifier_url: lookup("AIGIS_CLASSIFIER_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.classifier_url),
            monitor_url: lookup("AIGIS_MONITOR_URL").filter(|url| !url.trim().is_empty()),
            child_id,
            request_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PatternConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history_cap, 10);
        assert_eq!(config.rollover(), Duration::minutes(5));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            PatternConfig::from_json(r#"{"statusPolicy": "trend", "warningCooldown": 60000}"#)
                .unwrap();
        assert_eq!(config.status_policy, StatusPolicyKind::Trend);
        assert_eq!(config.cooldown(), Duration::seconds(60));
        assert_eq!(config.reel_count_threshold, 3);
        assert_eq!(config.cooldown_scope, CooldownScope::Global);
    }

    #[test]
    fn test_cooldown_scope_serialization() {
        let json = serde_json::to_string(&CooldownScope::PerTrigger).unwrap();
        assert_eq!(json, "\"per_trigger\"");
    }

    #[test]
    fn test_rejects_zero_history_cap() {
        let result = PatternConfig::from_json(r#"{"historyCap": 0}"#);
        assert!(matches!(result, Err(PulseError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        let config = PatternConfig {
            detection_confidence_threshold: 1.5,
            ..PatternConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_intervals() {
        let result = PatternConfig::from_json(r#"{"rolloverInterval": 18446744073709551615}"#);
        assert!(matches!(result, Err(PulseError::InvalidConfig(_))));

        let config = PatternConfig {
            warning_cooldown: MAX_INTERVAL_MS + 1,
            ..PatternConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PatternConfig {
            idle_check_interval: MAX_INTERVAL_MS,
            ..PatternConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_accessors_clamp_unvalidated_values() {
        let config = PatternConfig {
            rollover_interval: u64::MAX,
            page_time_threshold: u64::MAX,
            ..PatternConfig::default()
        };
        assert_eq!(config.rollover().num_milliseconds() as u64, MAX_INTERVAL_MS);
        assert_eq!(config.page_time().num_milliseconds() as u64, MAX_INTERVAL_MS);
        assert_eq!(config.rollover_period().as_millis() as u64, MAX_INTERVAL_MS);
    }

    #[test]
    fn test_rejects_non_positive_rate_threshold() {
        let config = PatternConfig {
            doomscroll_rate_threshold: 0.0,
            ..PatternConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_defaults() {
        let settings = EndpointSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, EndpointSettings::default());
        assert!(settings.monitor_url.is_none());
    }

    #[test]
    fn test_endpoint_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AIGIS_CLASSIFIER_URL", "http://classifier:9000"),
            ("AIGIS_MONITOR_URL", "http://monitor:8000"),
            ("AIGIS_CHILD_ID", "42"),
        ]
        .into_iter()
        .collect();

        let settings =
            EndpointSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.classifier_url, "http://classifier:9000");
        assert_eq!(settings.monitor_url.as_deref(), Some("http://monitor:8000"));
        assert_eq!(settings.child_id, 42);
        assert_eq!(settings.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_endpoint_bad_child_id() {
        let result = EndpointSettings::from_lookup(|k| {
            (k == "AIGIS_CHILD_ID").then(|| "abc".to_string())
        });
        assert!(matches!(result, Err(PulseError::InvalidConfig(_))));
    }
}
