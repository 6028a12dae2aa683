//! Error type for the correlator control bridge.
//!
//! Every fallible operation returns `Result<T, AlvError>`. Each public
//! controller command either succeeds or fails with exactly one of
//! these variants; there are no partial results.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for correlator control.
#[derive(Debug, Error)]
pub enum AlvError {
    // ── Lifecycle ────────────────────────────────────────────────
    /// A command was issued before `init()` (or after `close()`).
    #[error("controller not yet initialized")]
    NotInitialized,

    /// The correlator window is missing, or the cached handle no longer
    /// refers to it.
    #[error("correlator window not found")]
    WindowNotFound,

    /// A previous command is still waiting for its acknowledgment.
    #[error("correlator window not yet ready")]
    NotReady,

    // ── Timeouts ─────────────────────────────────────────────────
    /// The correlator did not acknowledge a command in time.
    #[error("no acknowledgment from correlator after {0:?}")]
    AcknowledgeTimeout(Duration),

    /// A measurement did not report completion within its budget.
    #[error("measurement did not finish within {0:?}")]
    MeasurementTimeout(Duration),

    /// A blocking wait was interrupted by the host.
    #[error("interrupted while waiting for measurement")]
    Interrupted,

    // ── Command validation ───────────────────────────────────────
    /// The command is not allowed while a measurement is running.
    #[error("measurement in progress")]
    MeasurementInProgress,

    /// A scaling name outside the fixed five-valued table.
    #[error("unknown scaling: {0:?}")]
    UnknownScaling(String),

    /// A correlation mode name that is not recognised.
    #[error("unknown correlation mode: {0:?}")]
    UnknownMode(String),

    /// A clipboard payload the correlator cannot accept.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    // ── Plumbing ─────────────────────────────────────────────────
    /// The bridge queue was closed unexpectedly.
    #[error("bridge channel closed")]
    ChannelClosed,

    /// A native windowing call failed.
    #[error("platform error: {0}")]
    Platform(String),

    /// The native message channel is not available on this platform.
    #[error("native correlator control is only supported on Windows")]
    UnsupportedPlatform,

    /// Filesystem error while resolving a path.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AlvError {
    /// Returns `true` for the two timeout kinds.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AlvError::AcknowledgeTimeout(_) | AlvError::MeasurementTimeout(_)
        )
    }
}

impl<T> From<std::sync::mpsc::SendError<T>> for AlvError {
    fn from(_: std::sync::mpsc::SendError<T>) -> Self {
        AlvError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = AlvError::AcknowledgeTimeout(Duration::from_secs(6));
        assert!(e.to_string().contains("6s"));

        let e = AlvError::UnknownScaling("Bogus".into());
        assert!(e.to_string().contains("Bogus"));
    }

    #[test]
    fn timeouts_are_classified() {
        assert!(AlvError::MeasurementTimeout(Duration::ZERO).is_timeout());
        assert!(!AlvError::NotReady.is_timeout());
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: AlvError = io_err.into();
        assert!(matches!(e, AlvError::Io(_)));
    }

    #[test]
    fn from_send_error() {
        let (tx, rx) = std::sync::mpsc::channel::<u8>();
        drop(rx);
        let e: AlvError = tx.send(1).unwrap_err().into();
        assert!(matches!(e, AlvError::ChannelClosed));
    }
}
