//! Offline replay
//!
//! Drives an [`Aggregator`] from a recorded event stream using the events' own
//! timestamps as the clock. Windows roll over every `rolloverInterval` of event
//! time and passive consumption is checked at every `idleCheckInterval` step up
//! to each event, the way the live service's idle timer does.

use crate::behavior::aggregator::Aggregator;
use crate::behavior::types::{Event, Pattern};
use crate::config::PatternConfig;
use chrono::{DateTime, Duration, Utc};

/// Everything a replay produced
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    /// Patterns emitted along the way: one per counter change and one per rollover
    pub patterns: Vec<Pattern>,
    /// Query snapshot at the last event's time
    pub final_pattern: Option<Pattern>,
    /// Closed-window history at the end of the replay, oldest first
    pub history: Vec<Pattern>,
}

/// Replay `events` in order.
///
/// An event stamped earlier than its predecessor is processed at the
/// predecessor's time so the clock never runs backwards.
pub fn replay(config: PatternConfig, events: &[Event]) -> ReplayReport {
    let Some(first) = events.first() else {
        return ReplayReport {
            patterns: Vec::new(),
            final_pattern: None,
            history: Vec::new(),
        };
    };

    let start = first.timestamp();
    let tick = Duration::milliseconds(1);
    let period = config.rollover().max(tick);
    let idle = config.idle_check().max(tick);
    let mut aggregator = Aggregator::new(config, start);
    let mut next_rollover = start + period;
    let mut next_check = start + idle;
    let mut clock: DateTime<Utc> = start;
    let mut patterns = Vec::new();

    for event in events {
        clock = clock.max(event.timestamp());

        // Timers due up to this event, in time order; an idle check due at a
        // window boundary still belongs to the closing window
        loop {
            if next_check <= next_rollover && next_check <= clock {
                if let Some(pattern) = aggregator.poll(next_check) {
                    patterns.push(pattern);
                }
                next_check += idle;
            } else if next_rollover <= clock {
                patterns.push(aggregator.rollover(next_rollover));
                next_rollover += period;
            } else {
                break;
            }
        }

        let outcome = aggregator.ingest(event, clock);
        if outcome.is_qualifying() {
            patterns.push(outcome.pattern);
        }
    }

    tracing::debug!(
        events = events.len(),
        patterns = patterns.len(),
        windows = aggregator.history().len(),
        "replay finished"
    );

    ReplayReport {
        patterns,
        final_pattern: Some(aggregator.query(clock)),
        history: aggregator.history().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::types::{DetectionCategory, PatternKind, PatternStatus};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn violence_at(secs: i64) -> Event {
        Event::Detection {
            category: DetectionCategory::Violence,
            is_positive: true,
            confidence: 0.9,
            timestamp: t0() + Duration::seconds(secs),
        }
    }

    #[test]
    fn test_empty_replay() {
        let report = replay(PatternConfig::default(), &[]);
        assert!(report.patterns.is_empty());
        assert!(report.final_pattern.is_none());
    }

    #[test]
    fn test_detections_counted_per_window() {
        // Two detections in the first window, one after the five minute mark
        let events = vec![violence_at(10), violence_at(20), violence_at(320)];
        let config = PatternConfig {
            page_time_threshold: 3_600_000,
            ..PatternConfig::default()
        };
        let report = replay(config, &events);

        let kinds: Vec<PatternKind> = report.patterns.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PatternKind::Current,
                PatternKind::Current,
                PatternKind::Periodic,
                PatternKind::Current
            ]
        );

        let closed = &report.patterns[2];
        assert_eq!(closed.violence_count, 2);
        assert_eq!(closed.timestamp, t0() + Duration::seconds(310));
        assert_eq!(report.history.len(), 1);

        let last = report.final_pattern.unwrap();
        assert_eq!(last.kind, PatternKind::Query);
        assert_eq!(last.violence_count, 1);
    }

    #[test]
    fn test_quiet_gap_rolls_several_windows() {
        let events = vec![violence_at(0), violence_at(16 * 60)];
        let config = PatternConfig {
            page_time_threshold: 3_600_000,
            ..PatternConfig::default()
        };
        let report = replay(config, &events);

        assert_eq!(report.history.len(), 3);
        assert_eq!(report.history[0].violence_count, 1);
        assert_eq!(report.history[1].violence_count, 0);
        assert_eq!(report.history[1].status, PatternStatus::Good);
    }

    #[test]
    fn test_passive_consumption_between_events() {
        let events = vec![
            Event::PageVisit {
                url: "https://video.example/feed".to_string(),
                timestamp: t0(),
            },
            Event::ReelAppeared {
                count: 1,
                timestamp: t0() + Duration::seconds(90),
            },
        ];
        let report = replay(PatternConfig::default(), &events);

        assert_eq!(report.patterns.len(), 1);
        assert_eq!(report.patterns[0].doomscroll_count, 1);
        // Found by the idle check at 65s, not when the next event arrived
        assert_eq!(report.patterns[0].timestamp, t0() + Duration::seconds(65));
    }

    #[test]
    fn test_idle_gap_polls_like_live_timer() {
        // Two minutes on one page without interaction: the idle timer fires
        // at 65s and again once the 30s cooldown lapses at 95s
        let events = vec![
            Event::PageVisit {
                url: "https://video.example/feed".to_string(),
                timestamp: t0(),
            },
            Event::ReelAppeared {
                count: 1,
                timestamp: t0() + Duration::seconds(120),
            },
        ];
        let report = replay(PatternConfig::default(), &events);

        let times: Vec<_> = report.patterns.iter().map(|p| p.timestamp).collect();
        assert_eq!(
            times,
            vec![t0() + Duration::seconds(65), t0() + Duration::seconds(95)]
        );
        assert_eq!(report.final_pattern.unwrap().doomscroll_count, 2);
    }

    #[test]
    fn test_passive_due_at_boundary_stays_in_closing_window() {
        let config = PatternConfig {
            rollover_interval: 65_000,
            ..PatternConfig::default()
        };
        let events = vec![
            Event::PageVisit {
                url: "https://video.example/feed".to_string(),
                timestamp: t0(),
            },
            Event::Interaction {
                timestamp: t0() + Duration::seconds(70),
            },
        ];
        let report = replay(config, &events);

        assert_eq!(report.history.len(), 1);
        assert_eq!(report.history[0].doomscroll_count, 1);
    }

    #[test]
    fn test_oversized_rollover_does_not_overflow() {
        let config = PatternConfig {
            rollover_interval: u64::MAX,
            ..PatternConfig::default()
        };
        let report = replay(config, &[violence_at(0), violence_at(60)]);

        assert!(report.history.is_empty());
        assert_eq!(report.final_pattern.unwrap().violence_count, 2);
    }

    #[test]
    fn test_out_of_order_event_does_not_rewind() {
        let events = vec![violence_at(100), violence_at(50)];
        let report = replay(PatternConfig::default(), &events);

        assert_eq!(report.patterns.len(), 2);
        assert_eq!(report.patterns[1].timestamp, t0() + Duration::seconds(100));
    }
}
