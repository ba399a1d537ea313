//! Doomscroll trigger detection
//!
//! Turns raw scroll, interaction, reel and page signals into discrete
//! doomscroll triggers. Three heuristics feed the same counter:
//!
//! - rapid scrolling: speed above `scrollSpeedThreshold` sustained for
//!   `scrollDurationThreshold`
//! - passive consumption: on a page longer than `pageTimeThreshold` with no
//!   interaction for `interactionIdleThreshold`
//! - reel binge: the short-form video count on the page rising to
//!   `reelCountThreshold`
//!
//! A cooldown gate keeps a single continuous gesture from counting more than
//! once per `warningCooldown`.

use crate::behavior::types::{DoomscrollTrigger, Event};
use crate::config::{CooldownScope, PatternConfig};
use chrono::{DateTime, Duration, Utc};

/// Stateful detector for the three doomscroll heuristics
#[derive(Debug, Clone)]
pub struct TriggerDetector {
    speed_threshold: f64,
    sustain: Duration,
    page_time: Duration,
    idle: Duration,
    reel_threshold: u32,
    cooldown: Duration,
    scope: CooldownScope,

    last_scroll: Option<(f64, DateTime<Utc>)>,
    /// Start of the current run of above-threshold scroll samples
    fast_since: Option<DateTime<Utc>>,
    page_started: DateTime<Utc>,
    last_interaction: DateTime<Utc>,
    current_url: Option<String>,
    /// Reel count from the previous sighting on this page
    last_reel_count: u32,
    /// Last firing per trigger kind; slot 0 doubles as the global slot
    last_fired: [Option<DateTime<Utc>>; 3],
}

impl TriggerDetector {
    pub fn new(config: &PatternConfig, now: DateTime<Utc>) -> Self {
        Self {
            speed_threshold: config.scroll_speed_threshold,
            sustain: config.scroll_duration(),
            page_time: config.page_time(),
            idle: config.interaction_idle(),
            reel_threshold: config.reel_count_threshold,
            cooldown: config.cooldown(),
            scope: config.cooldown_scope,
            last_scroll: None,
            fast_since: None,
            page_started: now,
            last_interaction: now,
            current_url: None,
            last_reel_count: 0,
            last_fired: [None; 3],
        }
    }

    /// Feed one event; returns the trigger it fired, if any.
    ///
    /// Sample timing (scroll speed, page clock) comes from the event's own
    /// timestamp, the cooldown from `now`.
    pub fn observe(&mut self, event: &Event, now: DateTime<Utc>) -> Option<DoomscrollTrigger> {
        match event {
            Event::Scroll {
                position,
                timestamp,
            } => {
                if self.scroll_sample(*position, *timestamp) {
                    let fired = self.fire(DoomscrollTrigger::RapidScrolling, now);
                    if fired.is_some() {
                        // A new trigger needs a freshly sustained run
                        self.fast_since = Some(*timestamp);
                    }
                    fired
                } else {
                    None
                }
            }
            Event::Interaction { timestamp } => {
                if *timestamp > self.last_interaction {
                    self.last_interaction = *timestamp;
                }
                None
            }
            Event::ReelAppeared { count, .. } => {
                // Fires on the upward crossing only; a crossing inside the
                // cooldown is spent
                let crossed =
                    self.last_reel_count < self.reel_threshold && *count >= self.reel_threshold;
                self.last_reel_count = *count;
                if crossed {
                    self.fire(DoomscrollTrigger::ReelBinge, now)
                } else {
                    None
                }
            }
            Event::PageVisit { url, timestamp } => {
                self.page_started = *timestamp;
                self.last_interaction = *timestamp;
                self.last_scroll = None;
                self.fast_since = None;
                self.current_url = Some(url.clone());
                self.last_reel_count = 0;
                None
            }
            Event::Detection { .. } => None,
        }
    }

    /// Evaluate the passive-consumption heuristic at `now`
    pub fn check_passive(&mut self, now: DateTime<Utc>) -> Option<DoomscrollTrigger> {
        let on_page = now - self.page_started;
        let idle_for = now - self.last_interaction;

        if on_page > self.page_time && idle_for > self.idle {
            self.fire(DoomscrollTrigger::PassiveConsumption, now)
        } else {
            None
        }
    }

    /// URL from the most recent page visit
    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// Record a scroll sample; true once a fast run has lasted long enough
    fn scroll_sample(&mut self, position: f64, at: DateTime<Utc>) -> bool {
        let Some((prev_position, prev_at)) = self.last_scroll.replace((position, at)) else {
            return false;
        };

        let dt_ms = (at - prev_at).num_milliseconds();
        if dt_ms <= 0 {
            self.fast_since = None;
            return false;
        }

        let speed = (position - prev_position).abs() / (dt_ms as f64 / 1000.0);
        if speed <= self.speed_threshold {
            self.fast_since = None;
            return false;
        }

        let since = *self.fast_since.get_or_insert(prev_at);
        at - since >= self.sustain
    }

    fn fire(
        &mut self,
        trigger: DoomscrollTrigger,
        now: DateTime<Utc>,
    ) -> Option<DoomscrollTrigger> {
        let slot = match self.scope {
            CooldownScope::Global => 0,
            CooldownScope::PerTrigger => trigger.index(),
        };

        if let Some(last) = self.last_fired[slot] {
            if now - last < self.cooldown {
                tracing::trace!(?trigger, "doomscroll trigger suppressed by cooldown");
                return None;
            }
        }

        self.last_fired[slot] = Some(now);
        tracing::debug!(?trigger, "doomscroll trigger fired");
        Some(trigger)
    }
}
