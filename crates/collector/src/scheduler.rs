//! Fixed-interval collection scheduler
//!
//! Runs one cycle immediately, then one per slot on the grid
//! `start + n * interval`. Cancellation is honoured between cycles and
//! during every sleep, never in the middle of a fetch or publish.

use crate::orchestrator::{CycleOrchestrator, CycleOutcome};
use crate::publisher::Publisher;
use crate::retry::RetryPolicy;
use collector_common::{CollectorError, Result};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::ShuttingDown => "shutting_down",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Fire Schedule
// ============================================================================

/// Fire times on a fixed grid anchored at the first cycle
///
/// After an overrun the next cycle fires immediately once, then the schedule
/// realigns to the first grid slot still in the future.
#[derive(Debug, Clone)]
pub struct FireSchedule {
    start: Instant,
    interval: Duration,
    slot: u32,
}

impl FireSchedule {
    pub fn new(start: Instant, interval: Duration) -> Self {
        Self {
            start,
            interval,
            slot: 0,
        }
    }

    /// Time of the next cycle, given that the current one finished at `now`
    ///
    /// Returns `None` when the next slot is not representable as an
    /// [`Instant`], meaning no further cycle is due.
    pub fn next_fire(&mut self, now: Instant) -> Option<Instant> {
        self.slot = self.slot.checked_add(1)?;
        let next = self.slot_time(self.slot)?;

        if next >= now {
            return Some(next);
        }

        // Overran at least one slot: run now, resume after the last passed slot
        let elapsed = now.saturating_duration_since(self.start).as_nanos();
        let passed = elapsed / self.interval.as_nanos().max(1);
        self.slot = u32::try_from(passed).unwrap_or(u32::MAX);
        Some(now)
    }

    fn slot_time(&self, slot: u32) -> Option<Instant> {
        self.interval
            .checked_mul(slot)
            .and_then(|offset| self.start.checked_add(offset))
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Drives the orchestrator on a fixed interval with one publisher session
pub struct Scheduler<P: Publisher> {
    orchestrator: CycleOrchestrator,
    publisher: P,
    interval: Duration,
    reconnect: RetryPolicy,
    state: SchedulerState,
    cycles_run: u64,
}

impl<P: Publisher> Scheduler<P> {
    pub fn new(
        orchestrator: CycleOrchestrator,
        publisher: P,
        interval: Duration,
        reconnect: RetryPolicy,
    ) -> Self {
        Self {
            orchestrator,
            publisher,
            interval,
            reconnect,
            state: SchedulerState::Idle,
            cycles_run: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of cycles started so far
    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Run until `shutdown` is cancelled
    ///
    /// Returns an error only when the broker cannot be reached at startup.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        self.transition(SchedulerState::Running);

        if !self.ensure_connected(&shutdown).await {
            self.shutdown().await;
            if shutdown.is_cancelled() {
                return Ok(());
            }
            return Err(CollectorError::connection_lost(format!(
                "broker unreachable after {} attempt(s)",
                self.reconnect.max_attempts()
            )));
        }

        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        let mut schedule = FireSchedule::new(Instant::now(), self.interval);

        loop {
            if self.ensure_connected(&shutdown).await {
                self.run_cycle().await;
            } else if !shutdown.is_cancelled() {
                warn!("Skipping cycle, broker unavailable");
            }

            if shutdown.is_cancelled() {
                break;
            }

            self.transition(SchedulerState::Sleeping);
            match schedule.next_fire(Instant::now()) {
                Some(next) => {
                    debug!(
                        wait_ms = next.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "Waiting for next cycle"
                    );

                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep_until(next) => {}
                    }
                },
                None => {
                    warn!("Next cycle is beyond the clock range, waiting for shutdown");
                    shutdown.cancelled().await;
                    break;
                },
            }

            self.transition(SchedulerState::Running);
        }

        info!("Shutdown requested");
        self.shutdown().await;
        Ok(())
    }

    /// Connect, run exactly one cycle, close
    pub async fn run_once(&mut self) -> Result<CycleOutcome> {
        self.transition(SchedulerState::Running);

        let never = CancellationToken::new();
        if !self.ensure_connected(&never).await {
            self.shutdown().await;
            return Err(CollectorError::connection_lost(format!(
                "broker unreachable after {} attempt(s)",
                self.reconnect.max_attempts()
            )));
        }

        let outcome = self.run_cycle().await;
        self.shutdown().await;
        Ok(outcome)
    }

    async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles_run += 1;
        self.orchestrator.run_cycle(&mut self.publisher).await
    }

    /// Make sure the publisher is usable, reconnecting with backoff
    async fn ensure_connected(&mut self, shutdown: &CancellationToken) -> bool {
        if self.publisher.is_connected() {
            return true;
        }

        if self.cycles_run > 0 {
            let err = CollectorError::connection_lost("connection dropped since last cycle");
            warn!(error = %err, "Reconnecting to broker");
            self.publisher.close().await;
        }

        let max_attempts = self.reconnect.max_attempts();
        for attempt in 1..=max_attempts {
            if shutdown.is_cancelled() {
                return false;
            }

            match self.publisher.connect().await {
                Ok(()) => return true,
                Err(e) => {
                    error!(attempt, max_attempts, error = %e, "Broker connection attempt failed");

                    if self.reconnect.has_attempts_after(attempt) {
                        let delay = self.reconnect.delay_for_attempt(attempt);
                        warn!(retry_in_ms = delay.as_millis() as u64, "Retrying broker connection");

                        tokio::select! {
                            _ = shutdown.cancelled() => return false,
                            _ = sleep(delay) => {}
                        }
                    }
                }
            }
        }

        false
    }

    async fn shutdown(&mut self) {
        self.transition(SchedulerState::ShuttingDown);
        self.publisher.close().await;
        self.transition(SchedulerState::Stopped);
        info!(cycles = self.cycles_run, "Scheduler stopped");
    }

    fn transition(&mut self, next: SchedulerState) {
        debug!(from = %self.state, to = %next, "Scheduler state change");
        self.state = next;
    }
}
