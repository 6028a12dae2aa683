//! # alv-core
//!
//! Control bridge for the ALV-5000/E correlator application.
//!
//! The correlator is driven entirely through its top-level window:
//! registered window messages carry commands, the clipboard carries
//! string arguments, and the correlator answers with broadcast
//! messages. This crate wraps that in a synchronous API.
//!
//! This crate contains:
//! - **Controller**: `Controller`, the timeout-bounded command API
//! - **Messages**: `Message`, `MessageTable`, `Signal`, `Payload`
//! - **Channel**: `MessageChannel`, the windowing seam, with a Win32
//!   implementation and `SimulatedCorrelator`
//! - **Settings**: `Scaling` and `CorrelationMode` vocabularies
//! - **Series**: `MeasurementSeries` for repeated numbered runs
//! - **Error**: `AlvError`, a `thiserror`-based error enum

mod bridge;
pub mod channel;
pub mod config;
mod consumer;
pub mod controller;
pub mod error;
pub mod message;
mod scan;
pub mod series;
pub mod settings;
pub mod sim;
pub mod state;

#[cfg(target_os = "windows")]
pub mod win32;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use channel::{Mailbox, MessageChannel, WindowHandle};
pub use config::{ControllerConfig, DEFAULT_WINDOW_TITLE};
pub use controller::{Controller, ControllerStatus, DEFAULT_DATA_FILE};
pub use error::AlvError;
pub use message::{Message, MessageTable, Outbound, OutboundCommand, Payload, Signal};
pub use series::{MeasurementSeries, RunParameters};
pub use settings::{CorrelationMode, Scaling};
pub use sim::SimulatedCorrelator;
pub use state::{InterruptHandle, MeasurementPhase, StatusHandle};
