//! Status derivation policies
//!
//! Two incompatible status vocabularies exist for the same rates: an absolute
//! `good`/`bad` split against fixed thresholds, and a trend comparison against
//! the previous closed window. Both sit behind [`StatusPolicy`]; the
//! configuration picks one.

use crate::behavior::types::{Pattern, PatternRates, PatternStatus};
use crate::config::{PatternConfig, StatusPolicyKind};

/// Maps window rates (and optionally the previous pattern) to a status
pub trait StatusPolicy: Send + Sync + std::fmt::Debug {
    fn derive(&self, rates: &PatternRates, previous: Option<&Pattern>) -> PatternStatus;
}

/// `bad` when either rate reaches its threshold, otherwise `good`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsoluteThresholdPolicy {
    pub doomscroll_threshold: f64,
    pub violence_threshold: f64,
}

impl StatusPolicy for AbsoluteThresholdPolicy {
    fn derive(&self, rates: &PatternRates, _previous: Option<&Pattern>) -> PatternStatus {
        if rates.doomscroll_rate >= self.doomscroll_threshold
            || rates.violence_rate >= self.violence_threshold
        {
            PatternStatus::Bad
        } else {
            PatternStatus::Good
        }
    }
}

/// Compares both rates against the previous pattern.
///
/// `improving` when both dropped, `worsening` when both rose, `stable`
/// otherwise. With no previous pattern, an all-zero window is `improving`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrendPolicy;

impl StatusPolicy for TrendPolicy {
    fn derive(&self, rates: &PatternRates, previous: Option<&Pattern>) -> PatternStatus {
        let Some(previous) = previous else {
            return if rates.doomscroll_rate == 0.0 && rates.violence_rate == 0.0 {
                PatternStatus::Improving
            } else {
                PatternStatus::Stable
            };
        };

        let doomscroll_down = rates.doomscroll_rate < previous.doomscroll_rate;
        let violence_down = rates.violence_rate < previous.violence_rate;
        let doomscroll_up = rates.doomscroll_rate > previous.doomscroll_rate;
        let violence_up = rates.violence_rate > previous.violence_rate;

        if doomscroll_down && violence_down {
            PatternStatus::Improving
        } else if doomscroll_up && violence_up {
            PatternStatus::Worsening
        } else {
            PatternStatus::Stable
        }
    }
}

/// Build the policy selected by the configuration
pub fn policy_for(config: &PatternConfig) -> Box<dyn StatusPolicy> {
    match config.status_policy {
        StatusPolicyKind::Absolute => Box::new(AbsoluteThresholdPolicy {
            doomscroll_threshold: config.doomscroll_rate_threshold,
            violence_threshold: config.violence_rate_threshold,
        }),
        StatusPolicyKind::Trend => Box::new(TrendPolicy),
    }
}
