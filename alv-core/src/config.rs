//! Controller configuration.

use std::time::Duration;

use crate::settings::Scaling;

/// Title of the correlator's main window.
pub const DEFAULT_WINDOW_TITLE: &str = "ALV-5000/E Correlator for WINDOWS-NT 4.0";

/// Settings for a [`Controller`](crate::Controller).
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Exact title used to find and revalidate the correlator window.
    pub window_title: String,
    /// How long to wait for each command to be acknowledged.
    pub communication_timeout: Duration,
    /// How often the scan loop looks the window up again.
    pub scan_interval: Duration,
    /// Measurement duration in seconds assumed until `set_duration`.
    pub default_duration: u32,
    /// Scaling assumed until `set_scaling`.
    pub default_scaling: Scaling,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            window_title: DEFAULT_WINDOW_TITLE.into(),
            communication_timeout: Duration::from_secs(6),
            scan_interval: Duration::from_secs(1),
            default_duration: 300,
            default_scaling: Scaling::default(),
        }
    }
}
