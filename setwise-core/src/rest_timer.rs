//! Countdown used between sets of a single exercise.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

const REST_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestState {
    Idle,
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestEvent {
    Tick { remaining: u32 },
    /// Emitted once per countdown run, when it reaches zero.
    Completed,
}

/// The countdown itself, advanced one second per [`RestCountdown::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestCountdown {
    state: RestState,
    duration: u32,
    remaining: u32,
}

impl Default for RestCountdown {
    fn default() -> Self {
        Self::new()
    }
}

impl RestCountdown {
    pub fn new() -> Self {
        Self {
            state: RestState::Idle,
            duration: 0,
            remaining: 0,
        }
    }

    pub fn state(&self) -> RestState {
        self.state
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Starts a fresh countdown. Outside a tokio runtime the countdown is
    /// armed but nothing ticks it.
    pub fn start(&mut self, duration_seconds: u32) {
        self.duration = duration_seconds;
        self.remaining = duration_seconds;
        self.state = RestState::Running;
    }

    pub fn pause(&mut self) -> bool {
        if self.state == RestState::Running {
            self.state = RestState::Paused;
            true
        } else {
            false
        }
    }

    pub fn resume(&mut self) -> bool {
        if self.state == RestState::Paused {
            self.state = RestState::Running;
            true
        } else {
            false
        }
    }

    /// Stops the countdown and restores the last configured duration.
    pub fn reset(&mut self) {
        self.state = RestState::Idle;
        self.remaining = self.duration;
    }

    /// Adds time. A finished countdown is re-armed in the paused state so
    /// that resuming starts a new run.
    pub fn extend(&mut self, delta_seconds: u32) {
        self.remaining = self.remaining.saturating_add(delta_seconds);
        if self.state == RestState::Finished && self.remaining > 0 {
            self.state = RestState::Paused;
        }
    }

    pub fn tick(&mut self) -> Option<RestEvent> {
        if self.state != RestState::Running {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = RestState::Finished;
            Some(RestEvent::Completed)
        } else {
            Some(RestEvent::Tick {
                remaining: self.remaining,
            })
        }
    }
}

/// Drives a [`RestCountdown`] once per second on the tokio runtime and
/// delivers its events on a channel. The background ticker is cancelled on
/// pause, reset, restart and drop.
pub struct RestIntervalTimer {
    countdown: Arc<Mutex<RestCountdown>>,
    events: mpsc::UnboundedSender<RestEvent>,
    ticker: Option<JoinHandle<()>>,
}

impl RestIntervalTimer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RestEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let timer = Self {
            countdown: Arc::new(Mutex::new(RestCountdown::new())),
            events,
            ticker: None,
        };
        (timer, rx)
    }

    fn countdown(&self) -> MutexGuard<'_, RestCountdown> {
        self.countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RestState {
        self.countdown().state()
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.countdown().remaining()
    }

    /// Starts a fresh countdown. Outside a tokio runtime the countdown is
    /// armed but nothing ticks it.
    pub fn start(&mut self, duration_seconds: u32) {
        debug!("Rest timer started for {}s", duration_seconds);
        self.countdown().start(duration_seconds);
        self.spawn_ticker();
    }

    pub fn pause(&mut self) {
        if self.countdown().pause() {
            self.cancel_ticker();
        }
    }

    pub fn resume(&mut self) {
        if self.countdown().resume() {
            self.spawn_ticker();
        }
    }

    pub fn reset(&mut self) {
        self.cancel_ticker();
        self.countdown().reset();
    }

    pub fn extend(&mut self, delta_seconds: u32) {
        self.countdown().extend(delta_seconds);
    }

    fn spawn_ticker(&mut self) {
        self.cancel_ticker();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Rest timer has no tokio runtime to tick on");
            return;
        };
        let countdown = Arc::clone(&self.countdown);
        let events = self.events.clone();
        self.ticker = Some(handle.spawn(async move {
            let mut interval = interval_at(Instant::now() + REST_TICK, REST_TICK);
            loop {
                interval.tick().await;
                let event = countdown
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .tick();
                match event {
                    Some(event) => {
                        if events.send(event).is_err() || event == RestEvent::Completed {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }));
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for RestIntervalTimer {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_countdown_completes_once_at_new_total() {
        let mut countdown = RestCountdown::new();
        countdown.start(60);
        countdown.extend(30);

        let mut completions = Vec::new();
        for second in 1..=120 {
            if countdown.tick() == Some(RestEvent::Completed) {
                completions.push(second);
            }
        }
        assert_eq!(completions, vec![90]);
        assert_eq!(countdown.state(), RestState::Finished);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn pause_holds_remaining_time() {
        let mut countdown = RestCountdown::new();
        countdown.start(10);
        countdown.tick();
        assert!(countdown.pause());
        assert_eq!(countdown.tick(), None);
        assert_eq!(countdown.remaining(), 9);
        assert!(countdown.resume());
        assert_eq!(countdown.tick(), Some(RestEvent::Tick { remaining: 8 }));
    }

    #[test]
    fn extend_after_completion_rearms_a_new_run() {
        let mut countdown = RestCountdown::new();
        countdown.start(1);
        assert_eq!(countdown.tick(), Some(RestEvent::Completed));
        assert_eq!(countdown.tick(), None);

        countdown.extend(30);
        assert_eq!(countdown.state(), RestState::Paused);
        assert_eq!(countdown.remaining(), 30);
        assert!(countdown.resume());

        let completions = (0..40)
            .filter(|_| countdown.tick() == Some(RestEvent::Completed))
            .count();
        assert_eq!(completions, 1);
    }

    #[test]
    fn reset_restores_configured_duration() {
        let mut countdown = RestCountdown::new();
        countdown.start(45);
        countdown.tick();
        countdown.reset();
        assert_eq!(countdown.state(), RestState::Idle);
        assert_eq!(countdown.remaining(), 45);
        assert_eq!(countdown.tick(), None);
    }

    #[test]
    fn timer_outside_a_runtime_arms_without_ticking() {
        let (mut timer, mut events) = RestIntervalTimer::new();
        timer.start(45);
        assert_eq!(timer.state(), RestState::Running);
        timer.pause();
        assert_eq!(timer.state(), RestState::Paused);
        timer.resume();
        assert_eq!(timer.state(), RestState::Running);
        assert_eq!(timer.remaining_seconds(), 45);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_emits_single_completion_after_extension() {
        let (mut timer, mut rx) = RestIntervalTimer::new();
        timer.start(60);
        timer.extend(30);

        tokio::time::sleep(Duration::from_secs(89) + Duration::from_millis(500)).await;
        assert_eq!(timer.state(), RestState::Running);
        assert_eq!(timer.remaining_seconds(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(timer.state(), RestState::Finished);

        let mut ticks = 0;
        let mut completions = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                RestEvent::Tick { .. } => ticks += 1,
                RestEvent::Completed => completions += 1,
            }
        }
        assert_eq!(ticks, 89);
        assert_eq!(completions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_timer_does_not_count_down() {
        let (mut timer, _rx) = RestIntervalTimer::new();
        timer.start(20);
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(timer.remaining_seconds(), 15);

        timer.pause();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(timer.remaining_seconds(), 15);
        assert_eq!(timer.state(), RestState::Paused);

        timer.resume();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(timer.remaining_seconds(), 13);
    }
}
