//! Correlator message vocabulary.
//!
//! The correlator understands a fixed set of registered window
//! messages. Commands travel from the controller to the correlator
//! window; [`Signal`]s travel back.

use std::fmt;

use crate::channel::WindowHandle;
use crate::error::AlvError;

// ── Message ──────────────────────────────────────────────────────

/// All registered messages exchanged with the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    // ── Commands (controller → correlator) ───────────────────────
    /// Start a measurement.
    SetStart,
    /// Stop the running measurement.
    SetStop,
    /// Store the current data to the file named in the payload.
    StoreFile,
    /// Set measurement duration (seconds, payload).
    SetDuration,
    /// Set scaling mode (numeric value, payload).
    SetScaling,
    /// Single-channel correlation.
    SetSingle,
    /// Dual-channel correlation.
    SetDual,
    /// Cross correlation.
    SetCross,
    /// Auto correlation.
    SetAuto,

    // ── Replies (correlator → controller) ────────────────────────
    /// A measurement has started.
    Start,
    /// A measurement has stopped.
    Stop,
    /// The last command was received.
    Acknowledge,
}

impl Message {
    /// Every message, in registration order.
    pub const ALL: [Message; 12] = [
        Message::SetStart,
        Message::SetStop,
        Message::Start,
        Message::Stop,
        Message::Acknowledge,
        Message::StoreFile,
        Message::SetDuration,
        Message::SetSingle,
        Message::SetDual,
        Message::SetCross,
        Message::SetAuto,
        Message::SetScaling,
    ];

    /// The system-wide name the message is registered under.
    pub fn registered_name(self) -> &'static str {
        match self {
            Message::SetStart => "ALV5000_SET_START",
            Message::SetStop => "ALV5000_SET_STOP",
            Message::Start => "ALV5000_START",
            Message::Stop => "ALV5000_STOP",
            Message::Acknowledge => "ALV5000_ACKNOWLEDGE",
            Message::StoreFile => "ALV5000_STORE_FILE",
            Message::SetDuration => "ALV5000_SET_DUR",
            Message::SetSingle => "ALV5000_SET_SINGLE",
            Message::SetDual => "ALV5000_SET_DUAL",
            Message::SetCross => "ALV5000_SET_CROSS",
            Message::SetAuto => "ALV5000_SET_AUTO",
            Message::SetScaling => "ALV5000_SET_SCALING",
        }
    }

    /// The reply signal this message maps to, if it is a reply.
    pub fn as_signal(self) -> Option<Signal> {
        match self {
            Message::Acknowledge => Some(Signal::Acknowledge),
            Message::Start => Some(Signal::Started),
            Message::Stop => Some(Signal::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.registered_name())
    }
}

// ── MessageTable ─────────────────────────────────────────────────

/// Two-way mapping between [`Message`]s and their numeric ids.
///
/// On Windows the ids come from `RegisterWindowMessageW`; any other
/// id source can build a table through [`MessageTable::from_fn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTable {
    ids: [u32; Message::ALL.len()],
}

impl MessageTable {
    /// Build a table by asking `register` for the id of each message.
    pub fn from_fn<F>(mut register: F) -> Result<Self, AlvError>
    where
        F: FnMut(Message) -> Result<u32, AlvError>,
    {
        let mut ids = [0u32; Message::ALL.len()];
        for (slot, msg) in ids.iter_mut().zip(Message::ALL) {
            let id = register(msg)?;
            if id == 0 {
                return Err(AlvError::Platform(format!("failed to register {msg}")));
            }
            *slot = id;
        }
        Ok(Self { ids })
    }

    /// Numeric id of `msg`.
    pub fn id(&self, msg: Message) -> u32 {
        let index = Message::ALL
            .iter()
            .position(|m| *m == msg)
            .unwrap_or_default();
        self.ids[index]
    }

    /// Reverse lookup; `None` for ids outside the vocabulary.
    pub fn lookup(&self, id: u32) -> Option<Message> {
        self.ids
            .iter()
            .position(|known| *known == id)
            .map(|index| Message::ALL[index])
    }
}

// ── Signal ───────────────────────────────────────────────────────

/// Asynchronous notifications relayed back to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The last command was received.
    Acknowledge,
    /// A measurement started. Also counts as an acknowledgment.
    Started,
    /// A measurement stopped. Also counts as an acknowledgment.
    Stopped,
    /// The bridge has shut down; no further signals follow.
    Shutdown,
}

// ── Payload ──────────────────────────────────────────────────────

/// Out-of-band string data for a command.
///
/// The correlator reads payloads from the clipboard as plain 8-bit
/// text, so only ASCII is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(String);

impl Payload {
    /// Validate `text` as a payload.
    pub fn ascii(text: impl Into<String>) -> Result<Self, AlvError> {
        let text = text.into();
        if !text.is_ascii() {
            return Err(AlvError::InvalidPayload(format!(
                "{text:?} contains non-ASCII characters"
            )));
        }
        if text.contains('\0') {
            return Err(AlvError::InvalidPayload(format!(
                "{text:?} contains a NUL byte"
            )));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// NUL-terminated bytes, as stored on the clipboard.
    pub fn to_c_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(self.0.as_bytes());
        bytes.push(0);
        bytes
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Outbound ─────────────────────────────────────────────────────

/// One command addressed to a specific correlator window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    pub handle: WindowHandle,
    pub message: Message,
    pub payload: Option<Payload>,
}

/// Items on the bridge's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Deliver a command to the correlator window.
    Command(OutboundCommand),
    /// Sentinel: emit [`Signal::Shutdown`] and stop the bridge.
    Shutdown,
}
