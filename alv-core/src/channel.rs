//! The windowing capability the bridge is built on.
//!
//! The correlator exposes nothing but a top-level window. Everything
//! the controller needs from the host is captured by
//! [`MessageChannel`]: find the window, check its title, post a
//! message (with an optional clipboard payload) and receive replies.
//! The Win32 implementation lives in [`crate::win32`]; tests and the
//! `--simulate` mode use [`crate::sim::SimulatedCorrelator`].

use std::fmt;
use std::sync::mpsc::Sender;

use crate::error::AlvError;
use crate::message::{Message, Payload, Signal};

// ── WindowHandle ─────────────────────────────────────────────────

/// Opaque reference to a window owned by another process.
///
/// Zero means "no window". A non-zero handle may go stale at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(isize);

impl WindowHandle {
    pub const NULL: WindowHandle = WindowHandle(0);

    pub fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> isize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ── MessageChannel ───────────────────────────────────────────────

/// Host primitives for talking to the correlator window.
pub trait MessageChannel: Send + Sync + 'static {
    /// Look up a top-level window by its exact title.
    ///
    /// Returns [`WindowHandle::NULL`] when no such window exists or the
    /// lookup itself fails.
    fn find_window(&self, title: &str) -> WindowHandle;

    /// Current title of `handle`, or `None` if the handle is stale.
    fn window_title(&self, handle: WindowHandle) -> Option<String>;

    /// Post `message` to `handle` without waiting for it to be handled.
    ///
    /// A payload is placed on the clipboard before the message is
    /// posted.
    fn post(
        &self,
        handle: WindowHandle,
        message: Message,
        payload: Option<&Payload>,
    ) -> Result<(), AlvError>;

    /// Start receiving replies from the correlator.
    ///
    /// Every reply is translated into a [`Signal`] and sent on
    /// `signals` until the returned mailbox is closed.
    fn open_mailbox(&self, signals: Sender<Signal>) -> Result<Box<dyn Mailbox>, AlvError>;
}

/// Receiving end opened by [`MessageChannel::open_mailbox`].
pub trait Mailbox: Send {
    /// Stop delivering replies and release native resources.
    fn close(self: Box<Self>);
}
