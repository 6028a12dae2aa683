//! The bridge: sole owner of the native messaging resources.
//!
//! The bridge opens the reply mailbox (a hidden window on Windows) and
//! runs a relay thread that drains the outbound queue, one command at a
//! time, into [`MessageChannel::post`]. Replies from the correlator
//! reach the signal queue through the mailbox.
//!
//! Shutdown is a handshake: the controller enqueues
//! [`Outbound::Shutdown`], the relay closes the mailbox, emits
//! [`Signal::Shutdown`] as the last signal and exits.
//!
//! The relay runs on a dedicated OS thread rather than in a separate
//! process; the Win32 mailbox keeps its own message pump thread so it
//! never shares a run loop with the caller.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::channel::{Mailbox, MessageChannel};
use crate::error::AlvError;
use crate::message::{Outbound, Signal};

#[derive(Debug)]
pub(crate) struct Bridge {
    thread: JoinHandle<()>,
}

impl Bridge {
    pub(crate) fn spawn(
        channel: Arc<dyn MessageChannel>,
        outbound: Receiver<Outbound>,
        signals: Sender<Signal>,
    ) -> Result<Self, AlvError> {
        let mailbox = channel.open_mailbox(signals.clone())?;
        let thread = thread::Builder::new()
            .name("alv-bridge".into())
            .spawn(move || relay(channel.as_ref(), outbound, mailbox, signals))?;
        Ok(Self { thread })
    }

    /// Wait for the relay to finish its shutdown handshake.
    ///
    /// Returns `false` if the relay died without completing it.
    pub(crate) fn join(self) -> bool {
        let clean = self.thread.join().is_ok();
        if !clean {
            warn!("bridge thread panicked");
        }
        clean
    }
}

fn relay(
    channel: &dyn MessageChannel,
    outbound: Receiver<Outbound>,
    mailbox: Box<dyn Mailbox>,
    signals: Sender<Signal>,
) {
    info!("bridge started");
    loop {
        let command = match outbound.recv() {
            Ok(Outbound::Command(command)) if !command.handle.is_null() => command,
            // A null handle is treated like the sentinel.
            Ok(_) | Err(_) => break,
        };
        debug!(message = %command.message, handle = %command.handle, "posting message");
        if let Err(e) = channel.post(command.handle, command.message, command.payload.as_ref()) {
            // The controller's acknowledgment wait reports the failure.
            warn!(message = %command.message, "post failed: {e}");
        }
    }
    mailbox.close();
    let _ = signals.send(Signal::Shutdown);
    info!("bridge terminated");
}
