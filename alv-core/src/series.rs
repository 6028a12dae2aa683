//! Measurement series: repeated runs with numbered output files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::Controller;
use crate::error::AlvError;
use crate::settings::Scaling;

/// Parameters of a single measurement run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParameters {
    /// Duration in seconds.
    pub duration: u32,
    pub scaling: Scaling,
    /// File name, relative to the data folder.
    pub filename: String,
}

/// Template for a series of runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSeries {
    /// Duration of each run in seconds.
    pub duration: u32,
    /// Scaling of the first run (and of all runs unless `scale_first_only`).
    pub scaling: Scaling,
    /// File name stem.
    pub filename: String,
    /// File extension, including the dot.
    pub extension: String,
    /// Number each run's file instead of overwriting a single file.
    pub increment_filename: bool,
    /// Scale the first run only; later runs use [`Scaling::Off`].
    pub scale_first_only: bool,
}

impl Default for MeasurementSeries {
    fn default() -> Self {
        Self {
            duration: 300,
            scaling: Scaling::Normal,
            filename: "data".into(),
            extension: ".ASC".into(),
            increment_filename: true,
            scale_first_only: true,
        }
    }
}

impl MeasurementSeries {
    /// Expand the template into `runs` run descriptions.
    pub fn plan(&self, runs: usize) -> Vec<RunParameters> {
        let width = index_width(runs);
        (0..runs)
            .map(|index| {
                let filename = if self.increment_filename {
                    match width {
                        Some(width) => format!(
                            "{}_{index:0width$}{}",
                            self.filename, self.extension
                        ),
                        None => format!("{}_{index}{}", self.filename, self.extension),
                    }
                } else {
                    format!("{}{}", self.filename, self.extension)
                };
                let scaling = if self.scale_first_only && index > 0 {
                    Scaling::Off
                } else {
                    self.scaling
                };
                RunParameters {
                    duration: self.duration,
                    scaling,
                    filename,
                }
            })
            .collect()
    }
}

/// Digits needed for the largest run index; `None` when there is at
/// most one run and no padding applies.
fn index_width(runs: usize) -> Option<usize> {
    let last = runs.checked_sub(1).filter(|last| *last > 0)?;
    Some(last.ilog10() as usize + 1)
}

/// Execute one run: configure, measure to completion, store the data.
pub fn execute(
    controller: &mut Controller,
    run: &RunParameters,
    data_folder: &Path,
) -> Result<PathBuf, AlvError> {
    let path = data_folder.join(&run.filename);
    info!(file = %path.display(), duration = run.duration, scaling = %run.scaling, "running measurement");
    controller.set_duration(run.duration)?;
    controller.set_scaling(run.scaling)?;
    controller.start(true)?;
    controller.save(&path)?;
    Ok(path)
}
