//! Wall-clock sources and the elapsed-time clock shown during a session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Presentation refresh rate of the session clock.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Renders `H:MM:SS` from one hour on, `MM:SS` below that.
pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

fn elapsed_between(anchor: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - anchor).num_seconds()).unwrap_or(0)
}

#[derive(Default)]
struct ClockState {
    anchor: Option<DateTime<Utc>>,
    ticker: Option<JoinHandle<()>>,
}

/// Elapsed seconds since a session's stored start time.
///
/// The value is recomputed from the wall clock on every tick and every read
/// instead of being accumulated, so suspensions and late ticks do not cause
/// drift. Ticks are published on a watch channel for views to render.
pub struct SessionClock<C: Clock = SystemClock> {
    clock: Arc<C>,
    state: Mutex<ClockState>,
    elapsed_tx: Arc<watch::Sender<u64>>,
}

impl<C: Clock> SessionClock<C> {
    pub fn new(clock: Arc<C>) -> Self {
        let (elapsed_tx, _) = watch::channel(0);
        Self {
            clock,
            state: Mutex::new(ClockState::default()),
            elapsed_tx: Arc::new(elapsed_tx),
        }
    }

    fn state(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Anchors the clock at `reference_start` and begins ticking. Restarting
    /// a running clock replaces the previous anchor and ticker.
    ///
    /// Ticks are only scheduled when called inside a tokio runtime; reads
    /// recompute from the wall clock either way.
    pub fn start(&self, reference_start: DateTime<Utc>) {
        let mut state = self.state();
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        state.anchor = Some(reference_start);
        self.elapsed_tx
            .send_replace(elapsed_between(reference_start, self.clock.now()));

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let clock = Arc::clone(&self.clock);
            let tx = Arc::clone(&self.elapsed_tx);
            state.ticker = Some(handle.spawn(async move {
                let mut interval = tokio::time::interval(TICK_INTERVAL);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    let elapsed = elapsed_between(reference_start, clock.now());
                    tx.send_if_modified(|current| {
                        if elapsed > *current {
                            *current = elapsed;
                            true
                        } else {
                            false
                        }
                    });
                }
            }));
        } else {
            debug!("SessionClock started outside a runtime; ticks disabled");
        }
    }

    /// Halts ticking and freezes the displayed value. Returns the final
    /// elapsed seconds.
    pub fn stop(&self) -> u64 {
        let mut state = self.state();
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        if let Some(anchor) = state.anchor.take() {
            let elapsed = elapsed_between(anchor, self.clock.now());
            let last = *self.elapsed_tx.borrow();
            self.elapsed_tx.send_replace(elapsed.max(last));
        }
        *self.elapsed_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state().anchor.is_some()
    }

    /// Current elapsed seconds. While running this never goes backwards,
    /// even if the wall clock does.
    pub fn elapsed_seconds(&self) -> u64 {
        let state = self.state();
        let Some(anchor) = state.anchor else {
            return *self.elapsed_tx.borrow();
        };
        let elapsed = elapsed_between(anchor, self.clock.now());
        self.elapsed_tx.send_if_modified(|current| {
            if elapsed > *current {
                *current = elapsed;
                true
            } else {
                false
            }
        });
        *self.elapsed_tx.borrow()
    }

    pub fn formatted(&self) -> String {
        format_elapsed(self.elapsed_seconds())
    }

    /// Receives every published tick.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.elapsed_tx.subscribe()
    }
}

impl<C: Clock> Drop for SessionClock<C> {
    fn drop(&mut self) {
        if let Some(ticker) = self.state().ticker.take() {
            ticker.abort();
        }
    }
}
