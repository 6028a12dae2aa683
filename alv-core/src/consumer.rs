//! Signal consumer: the single writer of the `acknowledged` and
//! `measuring` flags.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::AlvError;
use crate::message::Signal;
use crate::state::SharedState;

#[derive(Debug)]
pub(crate) struct SignalConsumer {
    thread: JoinHandle<()>,
}

impl SignalConsumer {
    pub(crate) fn spawn(
        signals: Receiver<Signal>,
        shared: Arc<SharedState>,
    ) -> Result<Self, AlvError> {
        let thread = thread::Builder::new()
            .name("alv-signals".into())
            .spawn(move || {
                debug!("signal consumer started");
                // Also ends when every sender is gone.
                while let Ok(signal) = signals.recv() {
                    debug!(?signal, "processing signal");
                    if !shared.apply(signal) {
                        break;
                    }
                }
                debug!("signal consumer terminated");
            })?;
        Ok(Self { thread })
    }

    /// Wait for the shutdown signal to be consumed.
    pub(crate) fn join(self) {
        if self.thread.join().is_err() {
            warn!("signal consumer panicked");
        }
    }
}
