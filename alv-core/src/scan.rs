//! Background discovery of the correlator window.
//!
//! The scan loop re-runs `find_window` at a fixed interval and
//! publishes the result so the controller never blocks on discovery.
//! A missing window is normal (the correlator may not be running yet)
//! and is simply published as a null handle.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::channel::MessageChannel;
use crate::error::AlvError;
use crate::state::SharedState;

/// Handle to the running scan thread.
#[derive(Debug)]
pub(crate) struct ScanLoop {
    cancel: Sender<()>,
    thread: JoinHandle<()>,
}

impl ScanLoop {
    pub(crate) fn spawn(
        channel: Arc<dyn MessageChannel>,
        shared: Arc<SharedState>,
        title: String,
        interval: Duration,
    ) -> Result<Self, AlvError> {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("alv-scan".into())
            .spawn(move || {
                debug!("scan loop started");
                loop {
                    let found = channel.find_window(&title);
                    let previous = shared.handle();
                    if found != previous {
                        info!(handle = %found, "correlator window handle changed");
                    }
                    shared.set_handle(found);

                    match cancelled.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        // explicit cancel or controller dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("scan loop terminated");
            })?;
        Ok(Self { cancel, thread })
    }

    /// Cancel the loop and wait for the thread to exit.
    pub(crate) fn stop(self) {
        let _ = self.cancel.send(());
        if self.thread.join().is_err() {
            warn!("scan thread panicked");
        }
    }
}
