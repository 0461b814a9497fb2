//! Session expiry tracking and the periodic tick task.
//!
//! `SessionClock` owns the authoritative expiry instant of the active
//! session, a refresh-in-flight flag, and at most one periodic task. Each
//! tick the owner calls `evaluate()` which decides between doing nothing,
//! starting a refresh, or expiring the session. The clock itself never
//! talks to the network.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::AuthPolicy;
use crate::time::Clock;
use crate::utils::lock;

/// What a tick should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSignal {
    /// Nothing to do this tick
    Idle,
    /// Within the refresh lead; the caller now owns the in-flight flag
    RefreshDue,
    /// The expiry instant has passed
    Expired,
    /// The clock is not tracking a session
    Stopped,
}

pub struct SessionClock {
    clock: Arc<dyn Clock>,
    refresh_lead: Duration,
    tick_interval: std::time::Duration,
    expires_at: Mutex<Option<DateTime<Utc>>>,
    refresh_in_flight: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionClock {
    pub fn new(clock: Arc<dyn Clock>, policy: &AuthPolicy) -> Self {
        Self {
            clock,
            refresh_lead: policy.refresh_lead,
            tick_interval: policy.tick_interval,
            expires_at: Mutex::new(None),
            refresh_in_flight: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Track `expires_at` and spawn the periodic task.
    ///
    /// `on_tick` runs once per tick interval until it returns `Break` or the
    /// clock is stopped. Starting again replaces any running task. Must be
    /// called from within a Tokio runtime.
    pub fn start<F>(&self, expires_at: DateTime<Utc>, mut on_tick: F)
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        *lock(&self.expires_at) = Some(expires_at);
        self.refresh_in_flight.store(false, Ordering::SeqCst);

        let period = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if on_tick().is_break() {
                    break;
                }
            }
        });

        if let Some(previous) = lock(&self.task).replace(handle) {
            previous.abort();
        }
        debug!(%expires_at, "Session clock started");
    }

    /// Cancel the tick task and forget the expiry. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
            debug!("Session clock stopped");
        }
        *lock(&self.expires_at) = None;
        self.refresh_in_flight.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        *lock(&self.expires_at)
    }

    /// Move the expiry after a successful refresh
    pub fn extend(&self, expires_at: DateTime<Utc>) {
        let mut current = lock(&self.expires_at);
        if current.is_some() {
            *current = Some(expires_at);
        }
    }

    /// Time left before expiry, zero when stopped or already past
    pub fn time_remaining(&self) -> Duration {
        match self.expires_at() {
            Some(expires_at) => (expires_at - self.clock.now()).max(Duration::zero()),
            None => Duration::zero(),
        }
    }

    /// Decide what this tick should do.
    ///
    /// Returns `RefreshDue` at most once per refresh: it claims the
    /// in-flight flag, and later ticks see `Idle` until `end_refresh`.
    pub fn evaluate(&self) -> ClockSignal {
        let Some(expires_at) = self.expires_at() else {
            return ClockSignal::Stopped;
        };
        let now = self.clock.now();

        if now >= expires_at {
            return ClockSignal::Expired;
        }
        if expires_at - now <= self.refresh_lead && self.try_begin_refresh() {
            return ClockSignal::RefreshDue;
        }
        ClockSignal::Idle
    }

    /// Claim the in-flight flag. False if a refresh is already outstanding.
    pub fn try_begin_refresh(&self) -> bool {
        self.refresh_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_refresh(&self) {
        self.refresh_in_flight.store(false, Ordering::SeqCst);
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.refresh_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.stop();
    }
}
