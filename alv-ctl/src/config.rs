//! Configuration for the correlator command-line driver.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alv_core::{ControllerConfig, DEFAULT_WINDOW_TITLE, MeasurementSeries, Scaling};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CtlConfig {
    /// How to reach the correlator window.
    pub correlator: CorrelatorConfig,
    /// Measurement defaults.
    pub measurement: MeasurementConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Correlator link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Exact title of the correlator's main window.
    pub window_title: String,
    /// Acknowledgment timeout in milliseconds.
    pub timeout_ms: u64,
    /// Window re-discovery interval in milliseconds.
    pub scan_interval_ms: u64,
}

/// Measurement defaults, also used as the `measure` template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Duration of a run in seconds.
    pub duration: u32,
    /// Scaling name: "Normal", "Off", "Conservative", "Secure", "Fixed".
    pub scaling: Scaling,
    /// Data file name stem.
    pub filename: String,
    /// Data file extension, including the dot.
    pub extension: String,
    /// Number the file of each run.
    pub increment_filename: bool,
    /// Apply the scaling to the first run only.
    pub scale_first_only: bool,
    /// Folder the correlator stores data files in.
    pub data_folder: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            window_title: DEFAULT_WINDOW_TITLE.into(),
            timeout_ms: 6_000,
            scan_interval_ms: 1_000,
        }
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        let series = MeasurementSeries::default();
        Self {
            duration: series.duration,
            scaling: series.scaling,
            filename: series.filename,
            extension: series.extension,
            increment_filename: series.increment_filename,
            scale_first_only: series.scale_first_only,
            data_folder: PathBuf::from("."),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CtlConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert the link settings into a [`ControllerConfig`].
    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            window_title: self.correlator.window_title.clone(),
            communication_timeout: Duration::from_millis(self.correlator.timeout_ms.max(1)),
            scan_interval: Duration::from_millis(self.correlator.scan_interval_ms.max(1)),
            default_duration: self.measurement.duration,
            default_scaling: self.measurement.scaling,
        }
    }

    /// The measurement defaults as a series template.
    pub fn to_series(&self) -> MeasurementSeries {
        let m = &self.measurement;
        MeasurementSeries {
            duration: m.duration,
            scaling: m.scaling,
            filename: m.filename.clone(),
            extension: m.extension.clone(),
            increment_filename: m.increment_filename,
            scale_first_only: m.scale_first_only,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
