//! In-process stand-in for the correlator application.
//!
//! [`SimulatedCorrelator`] implements [`MessageChannel`] without any
//! native windowing. It answers commands the way the correlator does,
//! records everything it was sent, and lets callers open, close or
//! replace its "window", mute replies and inject signals. It backs the
//! test suite and the `--simulate` mode of `alv-ctl`.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::channel::{Mailbox, MessageChannel, WindowHandle};
use crate::config::DEFAULT_WINDOW_TITLE;
use crate::error::AlvError;
use crate::message::{Message, Payload, Signal};

const SIM_HANDLE: isize = 0x5A17;

#[derive(Debug)]
struct SimState {
    title: String,
    handle: WindowHandle,
    window_open: bool,
    replies_muted: bool,
    /// Real time per simulated measurement second, when auto-finishing.
    auto_finish: Option<Duration>,
    duration: u32,
    /// Bumped on every start/stop so stale auto-finish timers are ignored.
    epoch: u64,
    posted: Vec<(Message, Option<String>)>,
    mailbox: Option<Sender<Signal>>,
}

impl SimState {
    fn send(&self, signal: Signal) -> bool {
        match &self.mailbox {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }
}

/// A fake correlator window. Clones share the same simulated state.
#[derive(Debug, Clone)]
pub struct SimulatedCorrelator {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCorrelator {
    /// An open window titled like the real correlator. Measurements
    /// only finish when [`finish_measurement`](Self::finish_measurement)
    /// is called.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                title: DEFAULT_WINDOW_TITLE.into(),
                handle: WindowHandle::from_raw(SIM_HANDLE),
                window_open: true,
                replies_muted: false,
                auto_finish: None,
                duration: 300,
                epoch: 0,
                posted: Vec::new(),
                mailbox: None,
            })),
        }
    }

    /// Use a custom window title.
    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.lock().title = title.into();
        self
    }

    /// Finish each measurement on its own after `duration` simulated
    /// seconds, each lasting `second` of real time.
    pub fn with_auto_finish(self, second: Duration) -> Self {
        self.lock().auto_finish = Some(second);
        self
    }

    /// Start with no correlator window.
    pub fn with_window_closed(self) -> Self {
        self.lock().window_open = false;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Window control ───────────────────────────────────────────

    pub fn title(&self) -> String {
        self.lock().title.clone()
    }

    /// Handle of the simulated window, whether or not it is open.
    pub fn handle(&self) -> WindowHandle {
        self.lock().handle
    }

    pub fn open_window(&self) {
        self.lock().window_open = true;
    }

    pub fn close_window(&self) {
        self.lock().window_open = false;
    }

    /// Keep the handle but change the title, as if another window had
    /// taken over the handle value.
    pub fn replace_window(&self, title: impl Into<String>) {
        self.lock().title = title.into();
    }

    // ── Reply control ────────────────────────────────────────────

    /// Stop (or resume) answering commands.
    pub fn mute_replies(&self, muted: bool) {
        self.lock().replies_muted = muted;
    }

    /// Inject a signal. Returns `false` if no mailbox is open.
    pub fn emit(&self, signal: Signal) -> bool {
        self.lock().send(signal)
    }

    /// Report the running measurement as finished.
    pub fn finish_measurement(&self) -> bool {
        let mut state = self.lock();
        state.epoch += 1;
        state.send(Signal::Stopped)
    }

    // ── Inspection ───────────────────────────────────────────────

    /// Every command received so far, with its payload.
    pub fn posted(&self) -> Vec<(Message, Option<String>)> {
        self.lock().posted.clone()
    }

    pub fn clear_posted(&self) {
        self.lock().posted.clear();
    }

    /// Duration last set through `SET_DUR`.
    pub fn duration(&self) -> u32 {
        self.lock().duration
    }

    pub fn mailbox_open(&self) -> bool {
        self.lock().mailbox.is_some()
    }

    fn schedule_finish(&self, epoch: u64, after: Duration) {
        let sim = self.clone();
        thread::spawn(move || {
            thread::sleep(after);
            let state = sim.lock();
            if state.epoch == epoch {
                debug!("simulated measurement finished");
                state.send(Signal::Stopped);
            }
        });
    }
}

impl MessageChannel for SimulatedCorrelator {
    fn find_window(&self, title: &str) -> WindowHandle {
        let state = self.lock();
        if state.window_open && state.title == title {
            state.handle
        } else {
            WindowHandle::NULL
        }
    }

    fn window_title(&self, handle: WindowHandle) -> Option<String> {
        let state = self.lock();
        (state.window_open && state.handle == handle).then(|| state.title.clone())
    }

    fn post(
        &self,
        handle: WindowHandle,
        message: Message,
        payload: Option<&Payload>,
    ) -> Result<(), AlvError> {
        let mut state = self.lock();
        if !state.window_open || state.handle != handle {
            return Err(AlvError::Platform(format!("invalid window handle {handle}")));
        }
        state
            .posted
            .push((message, payload.map(|p| p.as_str().to_string())));
        if state.replies_muted {
            return Ok(());
        }

        // Every command is acknowledged first; start and stop are then
        // reported separately.
        state.send(Signal::Acknowledge);
        match message {
            Message::SetStart => {
                state.epoch += 1;
                if let Some(second) = state.auto_finish {
                    let after = second.saturating_mul(state.duration);
                    self.schedule_finish(state.epoch, after);
                }
                state.send(Signal::Started);
            }
            Message::SetStop => {
                state.epoch += 1;
                state.send(Signal::Stopped);
            }
            Message::SetDuration => {
                if let Some(seconds) = payload.and_then(|p| p.as_str().parse().ok()) {
                    state.duration = seconds;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn open_mailbox(&self, signals: Sender<Signal>) -> Result<Box<dyn Mailbox>, AlvError> {
        self.lock().mailbox = Some(signals);
        Ok(Box::new(SimMailbox { sim: self.clone() }))
    }
}

struct SimMailbox {
    sim: SimulatedCorrelator,
}

impl Mailbox for SimMailbox {
    fn close(self: Box<Self>) {
        self.sim.lock().mailbox = None;
    }
}
