//! Live pattern service
//!
//! Runs the [`Aggregator`] on a single tokio task. Producers reach it through
//! a cloneable [`PatternHandle`]; the task interleaves their commands with the
//! rollover and idle-check timers, so no two mutations ever overlap.
//!
//! ```text
//! handle.ingest ──┐
//! handle.query  ──┼──> mpsc ──> select! ──> Aggregator ──> store/bus/monitor
//! rollover tick ──┤
//! idle tick     ──┘
//! ```

use crate::behavior::adapter::validate_event;
use crate::behavior::aggregator::Aggregator;
use crate::behavior::types::{Event, Pattern};
use crate::config::PatternConfig;
use crate::error::PulseError;
use crate::monitor::ActivityLogger;
use crate::notify::PatternBus;
use crate::storage::{KeyValueStore, PatternStore};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Pending commands buffered per service
const COMMAND_BUFFER: usize = 256;

#[derive(Debug)]
enum Command {
    Ingest(Event),
    Query(oneshot::Sender<Pattern>),
}

/// Cloneable entry point for producers and listeners
#[derive(Debug, Clone)]
pub struct PatternHandle {
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl PatternHandle {
    /// Queue an event for the aggregator
    pub async fn ingest(&self, event: Event) -> Result<(), PulseError> {
        validate_event(&event)?;
        self.commands
            .send(Command::Ingest(event))
            .await
            .map_err(|_| PulseError::ServiceStopped)
    }

    /// Current pattern, computed after every previously queued event
    pub async fn query(&self) -> Result<Pattern, PulseError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Query(reply))
            .await
            .map_err(|_| PulseError::ServiceStopped)?;
        response.await.map_err(|_| PulseError::ServiceStopped)
    }

    /// Ask the service to stop.
    ///
    /// Commands queued before the call are still processed and the final
    /// pattern is persisted; later commands fail with `ServiceStopped`.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Wall-clock time derived from the tokio clock.
///
/// Pausing or advancing tokio time moves pattern timestamps with it.
#[derive(Debug, Clone, Copy)]
struct ServiceClock {
    origin: Instant,
    origin_wall: DateTime<Utc>,
}

impl ServiceClock {
    fn start() -> Self {
        Self {
            origin: Instant::now(),
            origin_wall: Utc::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_wall + elapsed
    }
}

/// Owner of the aggregator and its side effects
pub struct PatternService<S> {
    aggregator: Aggregator,
    store: PatternStore<S>,
    bus: PatternBus,
    logger: Option<ActivityLogger>,
    commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
    clock: ServiceClock,
}

impl<S: KeyValueStore> PatternService<S> {
    /// Build a service and the handle that drives it. Nothing runs until
    /// [`PatternService::run`] is awaited or spawned.
    pub fn new(config: PatternConfig, store: S, bus: PatternBus) -> (Self, PatternHandle) {
        let clock = ServiceClock::start();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel = CancellationToken::new();

        let service = Self {
            aggregator: Aggregator::new(config, clock.now()),
            store: PatternStore::new(store),
            bus,
            logger: None,
            commands: rx,
            cancel: cancel.clone(),
            clock,
        };
        let handle = PatternHandle {
            commands: tx,
            cancel,
        };
        (service, handle)
    }

    /// Report qualifying patterns to the monitoring backend
    pub fn with_activity_logger(mut self, logger: ActivityLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        self.restore().await;

        let rollover_period = self.aggregator.config().rollover_period();
        let mut rollover =
            tokio::time::interval_at(Instant::now() + rollover_period, rollover_period);
        rollover.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let idle_period = self.aggregator.config().idle_check_period();
        let mut idle = tokio::time::interval_at(Instant::now() + idle_period, idle_period);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            rollover_secs = rollover_period.as_secs(),
            idle_check_ms = idle_period.as_millis() as u64,
            "pattern service started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("pattern service stopping");
                    self.drain().await;
                    break;
                }
                _ = rollover.tick() => self.handle_rollover().await,
                _ = idle.tick() => self.handle_idle_check().await,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::info!("all pattern handles dropped, stopping");
                        break;
                    }
                },
            }
        }

        let pattern = self.aggregator.recompute(self.clock.now());
        if let Err(e) = self.store.save_current(&pattern).await {
            tracing::warn!(error = %e, "failed to persist final pattern");
        }
    }

    /// Refuse new commands and process everything already queued
    async fn drain(&mut self) {
        self.commands.close();
        let mut drained = 0usize;
        while let Some(command) = self.commands.recv().await {
            self.handle_command(command).await;
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!(drained, "processed queued commands before stopping");
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Ingest(event) => self.handle_ingest(event).await,
            Command::Query(reply) => {
                let _ = reply.send(self.aggregator.query(self.clock.now()));
            }
        }
    }

    async fn restore(&mut self) {
        match self.store.load_history().await {
            Ok(patterns) => {
                tracing::debug!(restored = patterns.len(), "pattern history restored");
                self.aggregator.restore_history(patterns);
            }
            Err(e) => tracing::warn!(error = %e, "failed to load pattern history, starting empty"),
        }
    }

    async fn handle_ingest(&mut self, event: Event) {
        let outcome = self.aggregator.ingest(&event, self.clock.now());
        if outcome.is_qualifying() {
            self.announce(outcome.pattern).await;
        }
    }

    async fn handle_idle_check(&mut self) {
        if let Some(pattern) = self.aggregator.poll(self.clock.now()) {
            self.announce(pattern).await;
        }
    }

    async fn handle_rollover(&mut self) {
        let pattern = self.aggregator.rollover(self.clock.now());

        if let Err(e) = self.store.save_current(&pattern).await {
            tracing::warn!(error = %e, "failed to persist current pattern");
        }
        let history = self.aggregator.history().to_vec();
        if let Err(e) = self.store.save_history(&history).await {
            tracing::warn!(error = %e, "failed to persist pattern history");
        }
        self.bus.publish(pattern);
    }

    async fn announce(&mut self, pattern: Pattern) {
        if let Err(e) = self.store.save_current(&pattern).await {
            tracing::warn!(error = %e, "failed to persist current pattern");
        }
        if let Some(logger) = &self.logger {
            logger.log(&pattern, self.aggregator.current_url());
        }
        self.bus.publish(pattern);
    }
}
