//! Idle auto-shutdown.
//!
//! When the player count drops to zero a countdown of `empty_minutes`
//! starts. It ticks once per minute, fires the warning hook as configured
//! thresholds are crossed, and fires the shutdown hook when it reaches zero.
//! A join, `cancel`, `disable` or `reset` interrupts the wait immediately.

use crate::config::AutoShutdownConfig;
use crate::events::bus::panic_message;
use chrono::{DateTime, Local};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type WarningHook = Arc<dyn Fn(u32) + Send + Sync>;
pub type ShutdownHook = Arc<dyn Fn() + Send + Sync>;

pub const DEFAULT_WARNING_MINUTES: [u32; 3] = [10, 5, 1];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownState {
    Disabled,
    Armed,
    CountingDown {
        remaining_minutes: u32,
        started_at: DateTime<Local>,
    },
}

struct Countdown {
    generation: u64,
    token: CancellationToken,
    remaining_minutes: u32,
    started_at: DateTime<Local>,
}

struct Inner {
    enabled: bool,
    empty_minutes: u32,
    generation: u64,
    countdown: Option<Countdown>,
}

#[derive(Clone)]
struct Hooks {
    on_warning: Option<WarningHook>,
    on_shutdown: Option<ShutdownHook>,
}

pub struct IdleShutdown {
    inner: Arc<Mutex<Inner>>,
    warning_minutes: Vec<u32>,
    tick: Duration,
    hooks: Hooks,
}

impl IdleShutdown {
    pub fn new(empty_minutes: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                enabled: empty_minutes > 0,
                empty_minutes,
                generation: 0,
                countdown: None,
            })),
            warning_minutes: DEFAULT_WARNING_MINUTES.to_vec(),
            tick: Duration::from_secs(60),
            hooks: Hooks {
                on_warning: None,
                on_shutdown: None,
            },
        }
    }

    pub fn from_config(config: &AutoShutdownConfig) -> Self {
        let minutes = if config.enabled { config.empty_minutes } else { 0 };
        Self::new(minutes).with_warnings(config.warning_minutes.clone())
    }

    pub fn with_warnings(mut self, mut minutes: Vec<u32>) -> Self {
        minutes.sort_unstable_by(|a, b| b.cmp(a));
        minutes.dedup();
        self.warning_minutes = minutes;
        self
    }

    /// Length of one countdown step. One minute outside of tests.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Called with the minutes left when a warning threshold is crossed.
    pub fn on_warning<F>(mut self, hook: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.hooks.on_warning = Some(Arc::new(hook));
        self
    }

    pub fn on_shutdown<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.on_shutdown = Some(Arc::new(hook));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn is_counting_down(&self) -> bool {
        self.lock().countdown.is_some()
    }

    pub fn empty_minutes(&self) -> u32 {
        self.lock().empty_minutes
    }

    pub fn state(&self) -> CountdownState {
        let inner = self.lock();
        match (&inner.countdown, inner.enabled) {
            (Some(c), _) => CountdownState::CountingDown {
                remaining_minutes: c.remaining_minutes,
                started_at: c.started_at,
            },
            (None, true) => CountdownState::Armed,
            (None, false) => CountdownState::Disabled,
        }
    }

    pub fn remaining_minutes(&self) -> Option<u32> {
        self.lock().countdown.as_ref().map(|c| c.remaining_minutes)
    }

    /// Re-enable, optionally with a new idle period. Zero minutes disables.
    pub fn enable(&self, empty_minutes: Option<u32>) {
        let mut inner = self.lock();
        if let Some(m) = empty_minutes {
            inner.empty_minutes = m;
        }
        inner.enabled = inner.empty_minutes > 0;
        tracing::info!(
            "Auto-shutdown {} ({} min)",
            if inner.enabled { "enabled" } else { "disabled" },
            inner.empty_minutes
        );
    }

    pub fn disable(&self) {
        let mut inner = self.lock();
        inner.enabled = false;
        Self::cancel_locked(&mut inner);
    }

    pub fn on_player_count_changed(&self, count: usize) {
        if !self.is_enabled() {
            return;
        }
        if count == 0 {
            self.start_countdown();
        } else {
            self.cancel();
        }
    }

    pub fn cancel(&self) {
        Self::cancel_locked(&mut self.lock());
    }

    /// Drop any countdown, e.g. when the server stops.
    pub fn reset(&self) {
        self.cancel();
    }

    fn start_countdown(&self) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                tracing::warn!("Auto-shutdown countdown needs a tokio runtime");
                return;
            }
        };

        let mut inner = self.lock();
        if inner.countdown.is_some() || !inner.enabled {
            return;
        }
        inner.generation += 1;
        let generation = inner.generation;
        let minutes = inner.empty_minutes;
        let token = CancellationToken::new();
        inner.countdown = Some(Countdown {
            generation,
            token: token.clone(),
            remaining_minutes: minutes,
            started_at: Local::now(),
        });
        drop(inner);

        tracing::info!("No players online, auto-shutdown in {} minute(s)", minutes);
        handle.spawn(run_countdown(
            self.inner.clone(),
            generation,
            token,
            minutes,
            self.warning_minutes.clone(),
            self.tick,
            self.hooks.clone(),
        ));
    }

    fn cancel_locked(inner: &mut Inner) {
        if let Some(c) = inner.countdown.take() {
            c.token.cancel();
            tracing::info!("Auto-shutdown countdown cancelled at {} minute(s)", c.remaining_minutes);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for IdleShutdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_countdown(
    inner: Arc<Mutex<Inner>>,
    generation: u64,
    token: CancellationToken,
    minutes: u32,
    thresholds: Vec<u32>,
    tick: Duration,
    hooks: Hooks,
) {
    let mut remaining = minutes;
    let mut warned = BTreeSet::new();

    while remaining > 0 {
        let crossed: Vec<u32> = thresholds
            .iter()
            .copied()
            .filter(|w| remaining <= *w && !warned.contains(w))
            .collect();
        if !crossed.is_empty() {
            warned.extend(crossed);
            if token.is_cancelled() {
                return;
            }
            if let Some(hook) = &hooks.on_warning {
                tracing::info!("Auto-shutdown warning: {} minute(s) left", remaining);
                if let Err(p) = catch_unwind(AssertUnwindSafe(|| hook(remaining))) {
                    tracing::warn!("Auto-shutdown warning hook panicked: {}", panic_message(p));
                }
            }
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(tick) => {}
        }
        remaining -= 1;

        let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
        match guard.countdown.as_mut() {
            Some(c) if c.generation == generation => c.remaining_minutes = remaining,
            _ => return,
        }
    }

    {
        let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
        if token.is_cancelled() {
            return;
        }
        if matches!(&guard.countdown, Some(c) if c.generation == generation) {
            guard.countdown = None;
        }
    }

    tracing::info!("Server empty for {} minute(s), triggering auto-shutdown", minutes);
    if let Some(hook) = &hooks.on_shutdown {
        if let Err(p) = catch_unwind(AssertUnwindSafe(|| hook())) {
            tracing::warn!("Auto-shutdown hook panicked: {}", panic_message(p));
        }
    }
}
