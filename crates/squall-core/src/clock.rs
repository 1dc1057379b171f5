//! The session's simulated clock.
//!
//! Forecast-training sessions do not run on wall time: the session clock
//! can be frozen, run at a non-1.0 rate, and jump discontinuously in either
//! direction. The clock is injected as a trait so tests drive
//! discontinuities deterministically, and the expiration machinery listens
//! for discontinuities to re-arm its timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

/// Callback invoked when the simulated clock jumps or its frozen state
/// toggles. Listeners must not re-enter the clock they are registered on.
pub type ChangeListener = Box<dyn Fn() + Send + Sync>;

/// Handle returned from listener registration, used to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerToken(u64);

/// The session's notion of "now".
///
/// `now` and `is_frozen` are cheap and may be called from any thread.
/// Discontinuity listeners fire synchronously on the thread that caused
/// the discontinuity.
pub trait SessionClock: Send + Sync {
    /// Current simulated time.
    fn now(&self) -> DateTime<Utc>;

    /// Whether the clock is frozen.
    fn is_frozen(&self) -> bool;

    /// Register a listener for clock discontinuities (manual time change,
    /// freeze/unfreeze toggle).
    fn register_change_listener(&self, listener: ChangeListener) -> ListenerToken;

    /// Detach a previously registered listener. Returns whether the token
    /// was known.
    fn unregister_change_listener(&self, token: ListenerToken) -> bool;
}

// ---------------------------------------------------------------------------
// SimulatedClock
// ---------------------------------------------------------------------------

struct ClockState {
    /// Simulated instant corresponding to `wall_origin`.
    sim_origin: DateTime<Utc>,
    /// Monotonic wall instant the mapping was last rebased at.
    wall_origin: Instant,
    /// Simulated seconds per wall second.
    rate: f64,
    /// When frozen, `now` returns `sim_origin` unchanged.
    frozen: bool,
}

impl ClockState {
    fn current(&self) -> DateTime<Utc> {
        if self.frozen {
            return self.sim_origin;
        }
        let elapsed = self.wall_origin.elapsed();
        let scaled = Duration::try_from_secs_f64(elapsed.as_secs_f64() * self.rate)
            .unwrap_or(Duration::ZERO);
        let delta = chrono::Duration::from_std(scaled).unwrap_or(chrono::Duration::zero());
        self.sim_origin
            .checked_add_signed(delta)
            .unwrap_or(self.sim_origin)
    }

    /// Rebase the wall/sim mapping at the current reading, e.g. before a
    /// rate change, so the reading stays continuous.
    fn rebase(&mut self) {
        self.sim_origin = self.current();
        self.wall_origin = Instant::now();
    }
}

/// A simulated clock driven by wall time through a configurable rate.
///
/// Discontinuities -- [`SimulatedClock::set_time`] and the freeze toggle --
/// fire every registered [`ChangeListener`]. Rate changes rebase the
/// mapping continuously and do not fire listeners.
pub struct SimulatedClock {
    state: Mutex<ClockState>,
    listeners: Mutex<Vec<(ListenerToken, ChangeListener)>>,
    next_token: AtomicU64,
}

impl core::fmt::Debug for SimulatedClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulatedClock")
            .field("now", &self.now())
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

impl SimulatedClock {
    /// Create a clock reading `start`, running at rate 1.0.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_state(start, false)
    }

    /// Create a clock reading `start`, frozen if requested.
    pub fn with_state(start: DateTime<Utc>, frozen: bool) -> Self {
        Self {
            state: Mutex::new(ClockState {
                sim_origin: start,
                wall_origin: Instant::now(),
                rate: 1.0,
                frozen,
            }),
            listeners: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// Jump the clock to `instant`. Fires discontinuity listeners.
    pub fn set_time(&self, instant: DateTime<Utc>) {
        if let Ok(mut state) = self.state.lock() {
            state.sim_origin = instant;
            state.wall_origin = Instant::now();
        }
        debug!(%instant, "simulated clock jumped");
        self.notify_listeners();
    }

    /// Change the rate (simulated seconds per wall second). The reading
    /// stays continuous; no discontinuity is reported. Non-finite or
    /// negative rates are clamped to zero.
    pub fn set_rate(&self, rate: f64) {
        let clamped = if rate.is_finite() { rate.max(0.0) } else { 0.0 };
        if let Ok(mut state) = self.state.lock() {
            state.rebase();
            state.rate = clamped;
        }
    }

    /// Freeze the clock at its current reading. Fires discontinuity
    /// listeners. A no-op when already frozen.
    pub fn freeze(&self) {
        let toggled = self
            .state
            .lock()
            .map(|mut state| {
                if state.frozen {
                    return false;
                }
                state.rebase();
                state.frozen = true;
                true
            })
            .unwrap_or(false);
        if toggled {
            debug!("simulated clock frozen");
            self.notify_listeners();
        }
    }

    /// Resume the clock from its frozen reading. Fires discontinuity
    /// listeners. A no-op when already running.
    pub fn unfreeze(&self) {
        let toggled = self
            .state
            .lock()
            .map(|mut state| {
                if !state.frozen {
                    return false;
                }
                state.wall_origin = Instant::now();
                state.frozen = false;
                true
            })
            .unwrap_or(false);
        if toggled {
            debug!("simulated clock resumed");
            self.notify_listeners();
        }
    }

    fn notify_listeners(&self) {
        if let Ok(listeners) = self.listeners.lock() {
            for (_token, listener) in listeners.iter() {
                listener();
            }
        }
    }
}

impl SessionClock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        self.state
            .lock()
            .map(|state| state.current())
            .unwrap_or_default()
    }

    fn is_frozen(&self) -> bool {
        self.state.lock().map(|state| state.frozen).unwrap_or(false)
    }

    fn register_change_listener(&self, listener: ChangeListener) -> ListenerToken {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push((token, listener));
        }
        token
    }

    fn unregister_change_listener(&self, token: ListenerToken) -> bool {
        self.listeners
            .lock()
            .map(|mut listeners| {
                let before = listeners.len();
                listeners.retain(|(existing, _listener)| *existing != token);
                listeners.len() != before
            })
            .unwrap_or(false)
    }
}
