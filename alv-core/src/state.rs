//! State shared between the controller and its background threads.
//!
//! The window handle is written by the scan loop; the `acknowledged`
//! and `measuring` flags are written by the signal consumer. The
//! controller only reads them, except on forced-recovery paths
//! (timeouts, stop, stale handle) where it resets them under the same
//! lock. Waiters block on a condition variable instead of polling.
//!
//! The correlator acknowledges `SET_START` before it reports `STARTED`,
//! so a commanded start stays pending until `STARTED` arrives and counts
//! as measuring in the meantime.

use std::fmt;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::channel::WindowHandle;
use crate::message::Signal;

// ── MeasurementPhase ─────────────────────────────────────────────

/// Measurement axis of the controller state machine.
///
/// ```text
///  Idle ──STARTED──► Measuring
///   ▲                    │
///   └── STOPPED / stop() / wait() timeout
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementPhase {
    #[default]
    Idle,
    Measuring,
}

impl fmt::Display for MeasurementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Measuring => write!(f, "Measuring"),
        }
    }
}

// ── SharedState ──────────────────────────────────────────────────

#[derive(Debug)]
struct Flags {
    acknowledged: bool,
    measuring: bool,
    /// `SET_START` was sent but `STARTED` has not been seen yet.
    start_pending: bool,
    interrupted: bool,
}

impl Flags {
    fn running(&self) -> bool {
        self.measuring || self.start_pending
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            acknowledged: true,
            measuring: false,
            start_pending: false,
            interrupted: false,
        }
    }
}

/// Outcome of [`SharedState::wait_idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdleWait {
    Idle,
    TimedOut,
    Interrupted,
}

#[derive(Debug, Default)]
pub(crate) struct SharedState {
    handle: AtomicIsize,
    flags: Mutex<Flags>,
    changed: Condvar,
}

impl SharedState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Back to the state of a freshly constructed controller.
    pub(crate) fn reset(&self) {
        self.handle.store(0, Ordering::SeqCst);
        *self.lock() = Flags::default();
        self.changed.notify_all();
    }

    // ── Window handle ────────────────────────────────────────────

    pub(crate) fn handle(&self) -> WindowHandle {
        WindowHandle::from_raw(self.handle.load(Ordering::SeqCst))
    }

    pub(crate) fn set_handle(&self, handle: WindowHandle) {
        self.handle.store(handle.raw(), Ordering::SeqCst);
    }

    // ── Flags ────────────────────────────────────────────────────

    pub(crate) fn acknowledged(&self) -> bool {
        self.lock().acknowledged
    }

    /// `true` while measuring or while a commanded start is pending.
    pub(crate) fn measuring(&self) -> bool {
        self.lock().running()
    }

    /// Apply one inbound signal. Returns `false` for the shutdown signal.
    pub(crate) fn apply(&self, signal: Signal) -> bool {
        let mut flags = self.lock();
        match signal {
            Signal::Acknowledge => flags.acknowledged = true,
            Signal::Started => {
                flags.measuring = true;
                flags.start_pending = false;
                flags.acknowledged = true;
            }
            // A late STOPPED from the previous run must not cancel a
            // pending start, so only STARTED clears it.
            Signal::Stopped => {
                flags.measuring = false;
                flags.acknowledged = true;
            }
            Signal::Shutdown => return false,
        }
        drop(flags);
        self.changed.notify_all();
        true
    }

    /// Mark a command as outstanding.
    pub(crate) fn begin_command(&self) {
        self.lock().acknowledged = false;
    }

    /// Block until the outstanding command is acknowledged.
    ///
    /// On timeout the flag is forced back to `true` so the next command
    /// is not refused, and `false` is returned.
    pub(crate) fn wait_acknowledged(&self, timeout: Duration) -> bool {
        let flags = self.lock();
        let (mut flags, result) = self
            .changed
            .wait_timeout_while(flags, timeout, |f| !f.acknowledged)
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && !flags.acknowledged {
            flags.acknowledged = true;
            return false;
        }
        true
    }

    /// Mark a start as commanded, ahead of posting `SET_START`.
    pub(crate) fn begin_start(&self) {
        self.lock().start_pending = true;
    }

    /// Clear an outstanding command without an acknowledgment.
    pub(crate) fn force_acknowledged(&self) {
        self.lock().acknowledged = true;
        self.changed.notify_all();
    }

    /// Force the measurement flag off and drop any pending start.
    pub(crate) fn force_idle(&self) {
        let mut flags = self.lock();
        flags.measuring = false;
        flags.start_pending = false;
        drop(flags);
        self.changed.notify_all();
    }

    /// Block until not measuring, interrupted, or `budget` elapses.
    ///
    /// A pending interrupt is consumed by this call, and discarded if the
    /// measurement has already finished.
    pub(crate) fn wait_idle(&self, budget: Duration) -> IdleWait {
        let deadline = Instant::now() + budget;
        let mut flags = self.lock();
        loop {
            if !flags.running() {
                flags.interrupted = false;
                return IdleWait::Idle;
            }
            if flags.interrupted {
                flags.interrupted = false;
                return IdleWait::Interrupted;
            }
            let now = Instant::now();
            if now >= deadline {
                return IdleWait::TimedOut;
            }
            flags = self
                .changed
                .wait_timeout(flags, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub(crate) fn interrupt(&self) {
        self.lock().interrupted = true;
        self.changed.notify_all();
    }
}

// ── Public views ─────────────────────────────────────────────────

/// Read-only view of the live controller flags, usable from any thread.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    shared: Arc<SharedState>,
}

impl StatusHandle {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// `true` while a correlator window is known.
    pub fn activated(&self) -> bool {
        !self.shared.handle().is_null()
    }

    /// `true` when a window is known and no command is outstanding.
    pub fn ok_to_send(&self) -> bool {
        self.shared.acknowledged() && self.activated()
    }

    pub fn measuring(&self) -> bool {
        self.shared.measuring()
    }

    pub fn phase(&self) -> MeasurementPhase {
        if self.measuring() {
            MeasurementPhase::Measuring
        } else {
            MeasurementPhase::Idle
        }
    }
}

/// Wakes a blocked [`Controller::wait`](crate::Controller::wait).
///
/// Cloneable and `Send`; typically triggered from a Ctrl-C handler.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    shared: Arc<SharedState>,
}

impl InterruptHandle {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    pub fn interrupt(&self) {
        self.shared.interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_idle_and_acknowledged() {
        let state = SharedState::new();
        assert!(state.acknowledged());
        assert!(!state.measuring());
        assert!(state.handle().is_null());
    }

    #[test]
    fn signal_transitions() {
        let state = SharedState::new();
        state.begin_command();
        assert!(state.apply(Signal::Started));
        assert!(state.measuring());
        assert!(state.acknowledged());

        state.begin_command();
        assert!(state.apply(Signal::Acknowledge));
        assert!(state.measuring());

        state.begin_command();
        assert!(state.apply(Signal::Stopped));
        assert!(!state.measuring());
        assert!(state.acknowledged());

        assert!(!state.apply(Signal::Shutdown));
    }

    #[test]
    fn ack_timeout_forces_flag() {
        let state = SharedState::new();
        state.begin_command();
        assert!(!state.wait_acknowledged(Duration::from_millis(20)));
        assert!(state.acknowledged());
    }

    #[test]
    fn ack_wakes_waiter() {
        let state = SharedState::new();
        state.begin_command();
        let signaller = Arc::clone(&state);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.apply(Signal::Acknowledge);
        });
        assert!(state.wait_acknowledged(Duration::from_secs(5)));
        t.join().unwrap();
    }

    #[test]
    fn wait_idle_outcomes() {
        let state = SharedState::new();
        assert_eq!(state.wait_idle(Duration::ZERO), IdleWait::Idle);

        state.apply(Signal::Started);
        assert_eq!(state.wait_idle(Duration::from_millis(10)), IdleWait::TimedOut);

        state.interrupt();
        assert_eq!(state.wait_idle(Duration::from_secs(5)), IdleWait::Interrupted);
        // consumed
        assert_eq!(state.wait_idle(Duration::from_millis(10)), IdleWait::TimedOut);
    }

    #[test]
    fn pending_start_counts_as_measuring() {
        let state = SharedState::new();
        state.begin_start();
        state.apply(Signal::Acknowledge);
        assert!(state.measuring());
        assert_eq!(state.wait_idle(Duration::from_millis(10)), IdleWait::TimedOut);

        // a stale STOPPED leaves the start pending
        state.apply(Signal::Stopped);
        assert!(state.measuring());

        state.apply(Signal::Started);
        state.apply(Signal::Stopped);
        assert!(!state.measuring());
        assert_eq!(state.wait_idle(Duration::ZERO), IdleWait::Idle);
    }

    #[test]
    fn wait_idle_follows_delayed_start() {
        let state = SharedState::new();
        state.begin_start();
        let signaller = Arc::clone(&state);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.apply(Signal::Started);
            thread::sleep(Duration::from_millis(100));
            signaller.apply(Signal::Stopped);
        });
        let started = Instant::now();
        assert_eq!(state.wait_idle(Duration::from_secs(5)), IdleWait::Idle);
        assert!(started.elapsed() >= Duration::from_millis(100));
        t.join().unwrap();
    }

    #[test]
    fn force_idle_drops_pending_start() {
        let state = SharedState::new();
        state.begin_start();
        state.force_idle();
        assert!(!state.measuring());
    }

    #[test]
    fn stale_interrupt_ignored_when_idle() {
        let state = SharedState::new();
        state.interrupt();
        assert_eq!(state.wait_idle(Duration::from_secs(5)), IdleWait::Idle);

        // the stale interrupt was discarded, not carried to the next wait
        state.apply(Signal::Started);
        assert_eq!(state.wait_idle(Duration::from_millis(10)), IdleWait::TimedOut);
    }

    #[test]
    fn begin_command_blocks_ok_to_send() {
        let state = SharedState::new();
        state.set_handle(WindowHandle::from_raw(3));
        state.begin_command();
        assert!(!state.acknowledged());
        state.force_acknowledged();
        assert!(state.acknowledged());
    }

    #[test]
    fn reset_restores_defaults() {
        let state = SharedState::new();
        state.set_handle(WindowHandle::from_raw(42));
        state.apply(Signal::Started);
        state.begin_start();
        state.begin_command();
        state.reset();
        assert!(state.handle().is_null());
        assert!(state.acknowledged());
        assert!(!state.measuring());
    }

    #[test]
    fn status_handle_views() {
        let state = SharedState::new();
        let status = StatusHandle::new(Arc::clone(&state));
        assert!(!status.activated());
        assert!(!status.ok_to_send());

        state.set_handle(WindowHandle::from_raw(7));
        assert!(status.ok_to_send());
        state.begin_command();
        assert!(!status.ok_to_send());
        state.apply(Signal::Started);
        assert_eq!(status.phase(), MeasurementPhase::Measuring);
    }
}
