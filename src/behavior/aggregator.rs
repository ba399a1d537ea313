//! Behavior pattern aggregator
//!
//! The synchronous core: folds events into the current window, derives
//! [`Pattern`] snapshots, and closes windows on rollover. It performs no I/O and
//! never fails; time is always passed in so callers decide whether it comes
//! from the wall clock (live service) or from event timestamps (replay).
//!
//! ```text
//! Accumulating --event--> Accumulating --rollover--> persist + reset --> Accumulating
//! ```

use crate::behavior::history::PatternHistory;
use crate::behavior::policy::{policy_for, StatusPolicy};
use crate::behavior::triggers::TriggerDetector;
use crate::behavior::types::{Event, Pattern, PatternKind, Recorded};
use crate::behavior::window::WindowState;
use crate::config::PatternConfig;
use chrono::{DateTime, Utc};

/// Result of ingesting a single event
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// Counter change caused by the event; `None` when it only updated tracking state
    pub recorded: Option<Recorded>,
    /// Pattern recomputed after the event
    pub pattern: Pattern,
}

impl IngestOutcome {
    /// Whether the event changed a counter and listeners should be told
    pub fn is_qualifying(&self) -> bool {
        self.recorded.is_some()
    }
}

/// Stateful aggregator owning one monitored context's window and history
#[derive(Debug)]
pub struct Aggregator {
    config: PatternConfig,
    window: WindowState,
    triggers: TriggerDetector,
    history: PatternHistory,
    policy: Box<dyn StatusPolicy>,
}

impl Aggregator {
    /// Start accumulating a fresh window at `now`, using the configured policy
    pub fn new(config: PatternConfig, now: DateTime<Utc>) -> Self {
        let policy = policy_for(&config);
        Self::with_policy(config, policy, now)
    }

    /// Start with a caller-supplied status policy
    pub fn with_policy(
        config: PatternConfig,
        policy: Box<dyn StatusPolicy>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            window: WindowState::new(now),
            triggers: TriggerDetector::new(&config, now),
            history: PatternHistory::new(config.history_cap),
            policy,
            config,
        }
    }

    /// Fold one event into the current window and recompute.
    ///
    /// Every delivery counts: the same logical event delivered twice is
    /// counted twice.
    pub fn ingest(&mut self, event: &Event, now: DateTime<Utc>) -> IngestOutcome {
        let recorded = match event {
            Event::Detection {
                category,
                is_positive,
                confidence,
                ..
            } => {
                if *is_positive && *confidence > self.config.detection_confidence_threshold {
                    self.window.record_detection(*category, *confidence);
                    Some(Recorded::Detection {
                        category: *category,
                        confidence: *confidence,
                    })
                } else {
                    None
                }
            }
            _ => self.triggers.observe(event, now).map(|trigger| {
                self.window.record_doomscroll();
                Recorded::Doomscroll(trigger)
            }),
        };

        if let Some(recorded) = &recorded {
            tracing::debug!(
                event = event.kind_name(),
                ?recorded,
                doomscroll_count = self.window.doomscroll_count,
                violence_count = self.window.violence_count,
                "event recorded"
            );
        }

        IngestOutcome {
            recorded,
            pattern: self.recompute(now),
        }
    }

    /// Re-evaluate the passive-consumption heuristic without a new event.
    ///
    /// Returns the recomputed pattern when it fired.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<Pattern> {
        let trigger = self.triggers.check_passive(now)?;
        self.window.record_doomscroll();
        tracing::debug!(
            ?trigger,
            doomscroll_count = self.window.doomscroll_count,
            "passive consumption recorded"
        );
        Some(self.recompute(now))
    }

    /// Snapshot of the current window
    pub fn recompute(&self, now: DateTime<Utc>) -> Pattern {
        self.snapshot(PatternKind::Current, now)
    }

    /// Snapshot requested by a listener
    pub fn query(&self, now: DateTime<Utc>) -> Pattern {
        self.snapshot(PatternKind::Query, now)
    }

    /// Close the current window: record its final pattern in history and
    /// reset every counter. Trigger cooldowns carry over into the new window.
    pub fn rollover(&mut self, now: DateTime<Utc>) -> Pattern {
        let pattern = self.snapshot(PatternKind::Periodic, now);
        self.history.push(pattern.clone());
        self.window.reset(now);

        tracing::info!(
            status = %pattern.status,
            doomscroll_rate = pattern.doomscroll_rate,
            violence_rate = pattern.violence_rate,
            history_len = self.history.len(),
            "window rolled over"
        );

        pattern
    }

    /// Seed history from persisted patterns (oldest first)
    pub fn restore_history(&mut self, patterns: Vec<Pattern>) {
        self.history = PatternHistory::from_patterns(patterns, self.config.history_cap);
    }

    pub fn window(&self) -> &WindowState {
        &self.window
    }

    pub fn history(&self) -> &PatternHistory {
        &self.history
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// URL of the most recent page visit, if any
    pub fn current_url(&self) -> Option<&str> {
        self.triggers.current_url()
    }

    fn snapshot(&self, kind: PatternKind, now: DateTime<Utc>) -> Pattern {
        let rates = self.window.rates(now);
        let status = self.policy.derive(&rates, self.history.latest());

        Pattern {
            doomscroll_rate: rates.doomscroll_rate,
            violence_rate: rates.violence_rate,
            avg_violence_score: rates.avg_violence_score,
            status,
            kind,
            window_id: self.window.window_id,
            window_start: self.window.window_start,
            doomscroll_count: self.window.doomscroll_count,
            violence_count: self.window.violence_count,
            detection_counts: self.window.detection_counts.clone(),
            timestamp: now,
        }
    }
}
