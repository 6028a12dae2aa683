//! The public controller: a synchronous, timeout-bounded command API
//! over the asynchronous correlator channel.
//!
//! `init()` discovers the window and starts three workers: the scan
//! loop, the signal consumer and the bridge. Every command is checked
//! (initialized, window known, window title still matches, channel
//! idle), enqueued for the bridge, and then blocks until the correlator
//! acknowledges it or `communication_timeout` expires.
//!
//! Command methods take `&mut self`, so concurrent commands must be
//! serialized by the caller. Status can still be observed from other
//! threads through [`StatusHandle`] and a blocked [`Controller::wait`]
//! can be woken through [`InterruptHandle`].

use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::bridge::Bridge;
use crate::channel::{MessageChannel, WindowHandle};
use crate::config::ControllerConfig;
use crate::consumer::SignalConsumer;
use crate::error::AlvError;
use crate::message::{Message, Outbound, OutboundCommand, Payload, Signal};
use crate::scan::ScanLoop;
use crate::settings::{CorrelationMode, Scaling};
use crate::state::{IdleWait, InterruptHandle, MeasurementPhase, SharedState, StatusHandle};

/// Default file name used by [`Controller::save`] callers.
pub const DEFAULT_DATA_FILE: &str = "data.ASC";

// ── Session ──────────────────────────────────────────────────────

/// Workers and queues that exist between `init()` and `close()`.
struct Session {
    outbound: Sender<Outbound>,
    signals: Sender<Signal>,
    bridge: Bridge,
    scan: ScanLoop,
    consumer: SignalConsumer,
}

impl Session {
    fn shutdown(self) {
        if self.outbound.send(Outbound::Shutdown).is_err() {
            warn!("bridge already gone");
        }
        if !self.bridge.join() {
            // The bridge never emitted its shutdown signal; do it here
            // so the consumer can exit.
            let _ = self.signals.send(Signal::Shutdown);
        }
        drop(self.signals);
        self.consumer.join();
        self.scan.stop();
    }
}

// ── ControllerStatus ─────────────────────────────────────────────

/// Point-in-time snapshot of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub initialized: bool,
    pub activated: bool,
    pub ok_to_send: bool,
    pub phase: MeasurementPhase,
    pub duration: u32,
    pub scaling: Scaling,
    pub mode: Option<CorrelationMode>,
}

// ── Controller ───────────────────────────────────────────────────

/// Drives the correlator application through its window.
///
/// ```no_run
/// use alv_core::{Controller, ControllerConfig, Scaling};
///
/// # fn main() -> Result<(), alv_core::AlvError> {
/// let mut alv = Controller::native(ControllerConfig::default())?;
/// alv.init()?;
/// alv.set_scaling(Scaling::Normal)?;
/// alv.set_duration(2)?;
/// alv.start(true)?; // start and wait for completion
/// alv.save("data.ASC")?;
/// alv.close();
/// # Ok(())
/// # }
/// ```
pub struct Controller {
    config: ControllerConfig,
    channel: Arc<dyn MessageChannel>,
    shared: Arc<SharedState>,
    session: Option<Session>,
    duration: u32,
    scaling: Scaling,
    mode: Option<CorrelationMode>,
}

impl Controller {
    /// Create an uninitialized controller on top of `channel`.
    pub fn new(channel: impl MessageChannel, config: ControllerConfig) -> Self {
        Self::with_channel(Arc::new(channel), config)
    }

    /// Like [`new`](Self::new), for an already shared channel.
    pub fn with_channel(channel: Arc<dyn MessageChannel>, config: ControllerConfig) -> Self {
        Self {
            duration: config.default_duration,
            scaling: config.default_scaling,
            mode: None,
            config,
            channel,
            shared: SharedState::new(),
            session: None,
        }
    }

    /// Controller for the real correlator, using Win32 window messages.
    #[cfg(target_os = "windows")]
    pub fn native(config: ControllerConfig) -> Result<Self, AlvError> {
        Ok(Self::new(crate::win32::Win32Channel::new()?, config))
    }

    /// Controller for the real correlator, using Win32 window messages.
    #[cfg(not(target_os = "windows"))]
    pub fn native(_config: ControllerConfig) -> Result<Self, AlvError> {
        Err(AlvError::UnsupportedPlatform)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Locate the correlator window and start the background workers.
    ///
    /// Calling `init()` on an initialized controller closes it first.
    pub fn init(&mut self) -> Result<(), AlvError> {
        info!("initializing correlator link");
        if self.session.is_some() {
            self.close();
        }

        self.shared.reset();
        self.duration = self.config.default_duration;
        self.scaling = self.config.default_scaling;
        self.mode = None;

        let handle = self.channel.find_window(&self.config.window_title);
        if handle.is_null() {
            warn!(title = %self.config.window_title, "correlator window not found yet");
        }
        self.shared.set_handle(handle);

        let (outbound, outbound_rx) = mpsc::channel();
        let (signals, signals_rx) = mpsc::channel();

        let consumer = SignalConsumer::spawn(signals_rx, Arc::clone(&self.shared))?;

        let scan = match ScanLoop::spawn(
            Arc::clone(&self.channel),
            Arc::clone(&self.shared),
            self.config.window_title.clone(),
            self.config.scan_interval,
        ) {
            Ok(scan) => scan,
            Err(e) => {
                drop(signals);
                consumer.join();
                return Err(fail(e));
            }
        };

        let bridge = match Bridge::spawn(Arc::clone(&self.channel), outbound_rx, signals.clone()) {
            Ok(bridge) => bridge,
            Err(e) => {
                drop(signals);
                consumer.join();
                scan.stop();
                self.shared.reset();
                return Err(fail(e));
            }
        };

        self.session = Some(Session {
            outbound,
            signals,
            bridge,
            scan,
            consumer,
        });
        Ok(())
    }

    /// Stop any measurement, shut the bridge down and join all workers.
    ///
    /// Never fails; a second call is a no-op.
    pub fn close(&mut self) {
        if self.session.is_none() {
            return;
        }
        info!("closing correlator link");
        if let Err(e) = self.stop() {
            debug!("ignoring stop failure during close: {e}");
        }
        if let Some(session) = self.session.take() {
            session.shutdown();
        }
        self.shared.reset();
    }

    // ── Measurement ──────────────────────────────────────────────

    /// Start a measurement, optionally waiting for it to complete.
    ///
    /// Starting while a measurement is already running does nothing.
    pub fn start(&mut self, wait: bool) -> Result<(), AlvError> {
        let handle = self.ensure_ready()?;
        if self.shared.measuring() {
            warn!("measurement already started");
            return Ok(());
        }
        info!("starting measurement");
        self.shared.begin_start();
        let result = match self.send(handle, Message::SetStart, None) {
            Ok(()) if wait => self.wait(None),
            other => other,
        };
        if result.is_err() {
            self.shared.force_idle();
        }
        result
    }

    /// Stop the running measurement.
    ///
    /// The controller treats the measurement as stopped even if the
    /// correlator never acknowledges. Stopping while idle does nothing.
    pub fn stop(&mut self) -> Result<(), AlvError> {
        let handle = self.ensure_ready()?;
        if !self.shared.measuring() {
            warn!("measurement already stopped");
            return Ok(());
        }
        info!("stopping measurement");
        let result = self.send(handle, Message::SetStop, None);
        self.shared.force_idle();
        result
    }

    /// Block until the correlator reports the measurement stopped.
    ///
    /// Waits at most `communication_timeout` plus `duration` seconds
    /// (the last duration set when `None`). On timeout or interrupt the
    /// controller is left idle.
    pub fn wait(&mut self, duration: Option<u32>) -> Result<(), AlvError> {
        info!("waiting for measurement to stop");
        let seconds = duration.unwrap_or(self.duration);
        let budget = self.config.communication_timeout + Duration::from_secs(seconds.into());
        match self.shared.wait_idle(budget) {
            IdleWait::Idle => Ok(()),
            IdleWait::TimedOut => {
                self.shared.force_idle();
                Err(fail(AlvError::MeasurementTimeout(budget)))
            }
            IdleWait::Interrupted => {
                warn!("wait interrupted; stopping measurement");
                if let Err(e) = self.stop() {
                    warn!("stop after interrupt failed: {e}");
                }
                self.shared.force_idle();
                Err(AlvError::Interrupted)
            }
        }
    }

    // ── Settings ─────────────────────────────────────────────────

    /// Set the measurement duration in seconds.
    pub fn set_duration(&mut self, seconds: u32) -> Result<(), AlvError> {
        let handle = self.ensure_idle()?;
        info!(seconds, "setting duration");
        self.send(handle, Message::SetDuration, Some(Payload::ascii(seconds.to_string())?))?;
        self.duration = seconds;
        Ok(())
    }

    /// Set the scaling mode.
    pub fn set_scaling(&mut self, scaling: Scaling) -> Result<(), AlvError> {
        let handle = self.ensure_idle()?;
        info!(%scaling, value = scaling.value(), "setting scaling");
        let payload = Payload::ascii(scaling.value().to_string())?;
        self.send(handle, Message::SetScaling, Some(payload))?;
        self.scaling = scaling;
        Ok(())
    }

    /// Set the scaling mode by name (`"Off"`, `"Normal"`, ...).
    ///
    /// Unknown names are rejected before anything is sent.
    pub fn set_scaling_by_name(&mut self, name: &str) -> Result<(), AlvError> {
        let scaling = name.parse::<Scaling>().map_err(fail)?;
        self.set_scaling(scaling)
    }

    /// Select the correlation mode.
    pub fn set_mode(&mut self, mode: CorrelationMode) -> Result<(), AlvError> {
        let handle = self.ensure_idle()?;
        info!(%mode, "setting correlation mode");
        self.send(handle, mode.message(), None)?;
        self.mode = Some(mode);
        Ok(())
    }

    /// Ask the correlator to store its data to `path`.
    ///
    /// The path is made absolute and must be plain ASCII.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), AlvError> {
        let handle = self.ensure_idle()?;
        let path = std::path::absolute(path.as_ref())?;
        let text = path.to_str().ok_or_else(|| {
            fail(AlvError::InvalidPayload(format!(
                "{} is not valid text",
                path.display()
            )))
        })?;
        let payload = Payload::ascii(text).map_err(fail)?;
        info!(file = %payload, "storing data");
        self.send(handle, Message::StoreFile, Some(payload))
    }

    // ── Raw messaging ────────────────────────────────────────────

    /// Post any message with an optional payload and wait for its
    /// acknowledgment.
    ///
    /// On timeout the channel is released so the next command can be
    /// sent.
    pub fn post_message(&mut self, message: Message, data: Option<&str>) -> Result<(), AlvError> {
        let handle = self.ensure_ready()?;
        let payload = data.map(Payload::ascii).transpose()?;
        self.send(handle, message, payload)
    }

    fn send(
        &mut self,
        handle: WindowHandle,
        message: Message,
        payload: Option<Payload>,
    ) -> Result<(), AlvError> {
        let session = self.session.as_ref().ok_or(AlvError::NotInitialized)?;
        debug!(%message, "posting message to correlator");
        self.shared.begin_command();
        let command = OutboundCommand {
            handle,
            message,
            payload,
        };
        if let Err(e) = session.outbound.send(Outbound::Command(command)) {
            self.shared.force_acknowledged();
            return Err(fail(e.into()));
        }
        debug!("waiting for acknowledgment");
        let timeout = self.config.communication_timeout;
        if !self.shared.wait_acknowledged(timeout) {
            return Err(fail(AlvError::AcknowledgeTimeout(timeout)));
        }
        Ok(())
    }

    // ── Guards ───────────────────────────────────────────────────

    /// Checks run before every command. Returns the validated handle.
    ///
    /// Commands serialize through `&mut self` and clear the outstanding
    /// flag on timeout, so `NotReady` is a guard that only trips if the
    /// flag is left set outside [`send`](Self::send).
    fn ensure_ready(&self) -> Result<WindowHandle, AlvError> {
        if self.session.is_none() {
            return Err(fail(AlvError::NotInitialized));
        }
        let handle = self.shared.handle();
        if handle.is_null() {
            return Err(fail(AlvError::WindowNotFound));
        }
        match self.channel.window_title(handle) {
            Some(title) if title == self.config.window_title => {}
            _ => {
                warn!(%handle, "correlator window does not exist any more");
                self.shared.set_handle(WindowHandle::NULL);
                return Err(fail(AlvError::WindowNotFound));
            }
        }
        if !self.shared.acknowledged() {
            return Err(fail(AlvError::NotReady));
        }
        Ok(handle)
    }

    fn ensure_idle(&self) -> Result<WindowHandle, AlvError> {
        let handle = self.ensure_ready()?;
        if self.shared.measuring() {
            return Err(fail(AlvError::MeasurementInProgress));
        }
        Ok(handle)
    }

    // ── Status ───────────────────────────────────────────────────

    pub fn initialized(&self) -> bool {
        self.session.is_some()
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
        self.status_handle().phase()
    }

    /// Last duration set, in seconds.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Last scaling set.
    pub fn scaling(&self) -> Scaling {
        self.scaling
    }

    /// Last correlation mode set, if any.
    pub fn mode(&self) -> Option<CorrelationMode> {
        self.mode
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            initialized: self.initialized(),
            activated: self.activated(),
            ok_to_send: self.ok_to_send(),
            phase: self.phase(),
            duration: self.duration,
            scaling: self.scaling,
            mode: self.mode,
        }
    }

    /// A read-only view of the live flags for other threads.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle::new(Arc::clone(&self.shared))
    }

    /// A handle that interrupts a blocked [`wait`](Self::wait).
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle::new(Arc::clone(&self.shared))
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.close();
    }
}

/// Log an error on its way to the caller.
fn fail(err: AlvError) -> AlvError {
    error!("{err}");
    err
}
