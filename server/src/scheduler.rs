//! Cancellable fixed-rate tick timer with a delayed restart
//!
//! The scheduler never runs anything itself. The owner awaits
//! [`TickScheduler::next_event`] inside its event loop and reacts to the
//! returned [`SchedulerEvent`]. At most one ticker exists at a time, and a
//! pending restart always replaces the ticker, so a match can never be driven
//! by two timers at once.

use std::future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// The periodic tick fired
    Tick,
    /// A delayed restart came due; the ticker is not running yet
    RestartDue,
}

#[derive(Debug)]
pub struct TickScheduler {
    period: Duration,
    ticker: Option<Interval>,
    restart: Option<Pin<Box<Sleep>>>,
}

impl TickScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
            restart: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Starts ticking one period from now, replacing any existing ticker or pending restart.
    pub fn start(&mut self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.restart = None;
        self.ticker = Some(ticker);
    }

    pub fn stop(&mut self) {
        self.ticker = None;
        self.restart = None;
    }

    /// Stops ticking and arms a single `RestartDue` event after `delay`.
    pub fn schedule_restart(&mut self, delay: Duration) {
        self.ticker = None;
        self.restart = Some(Box::pin(sleep(delay)));
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn restart_pending(&self) -> bool {
        self.restart.is_some()
    }

    /// Waits for the next event. Pending forever while stopped.
    ///
    /// Cancel safe: dropping the future before it completes loses no event.
    pub async fn next_event(&mut self) -> SchedulerEvent {
        if let Some(restart) = self.restart.as_mut() {
            restart.as_mut().await;
            self.restart = None;
            return SchedulerEvent::RestartDue;
        }

        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
                SchedulerEvent::Tick
            }
            None => future::pending().await,
        }
    }
}
