//! Correlator settings that can be changed over the message channel.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AlvError;
use crate::message::Message;

// ── Scaling ──────────────────────────────────────────────────────

/// Measurement scaling mode.
///
/// The numeric values are what the correlator expects in the
/// `SET_SCALING` payload. [`Scaling::ALL`] is ordered as the correlator
/// presents them, with the default first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scaling {
    Off = 0,
    #[default]
    Normal = 1,
    Conservative = 2,
    Secure = 3,
    Fixed = 4,
}

impl Scaling {
    pub const ALL: [Scaling; 5] = [
        Scaling::Normal,
        Scaling::Off,
        Scaling::Conservative,
        Scaling::Secure,
        Scaling::Fixed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scaling::Off => "Off",
            Scaling::Normal => "Normal",
            Scaling::Conservative => "Conservative",
            Scaling::Secure => "Secure",
            Scaling::Fixed => "Fixed",
        }
    }

    /// Value sent to the correlator.
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Scaling {
    type Error = AlvError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Scaling::ALL
            .into_iter()
            .find(|s| s.value() == value)
            .ok_or_else(|| AlvError::UnknownScaling(value.to_string()))
    }
}

impl FromStr for Scaling {
    type Err = AlvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scaling::ALL
            .into_iter()
            .find(|scaling| scaling.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AlvError::UnknownScaling(s.to_string()))
    }
}

impl fmt::Display for Scaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── CorrelationMode ──────────────────────────────────────────────

/// Channel configuration of the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrelationMode {
    Single,
    Dual,
    Cross,
    Auto,
}

impl CorrelationMode {
    pub const ALL: [CorrelationMode; 4] = [
        CorrelationMode::Single,
        CorrelationMode::Dual,
        CorrelationMode::Cross,
        CorrelationMode::Auto,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CorrelationMode::Single => "Single",
            CorrelationMode::Dual => "Dual",
            CorrelationMode::Cross => "Cross",
            CorrelationMode::Auto => "Auto",
        }
    }

    /// The command that selects this mode.
    pub fn message(self) -> Message {
        match self {
            CorrelationMode::Single => Message::SetSingle,
            CorrelationMode::Dual => Message::SetDual,
            CorrelationMode::Cross => Message::SetCross,
            CorrelationMode::Auto => Message::SetAuto,
        }
    }
}

impl FromStr for CorrelationMode {
    type Err = AlvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CorrelationMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AlvError::UnknownMode(s.to_string()))
    }
}

impl fmt::Display for CorrelationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
