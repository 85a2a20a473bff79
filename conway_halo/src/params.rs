// params.rs - Run parameters, validated once before anything starts

use crate::error::ConfigError;
use std::time::Duration;

pub const DEFAULT_THREADS: usize = 8;
pub const DEFAULT_SIZE: usize = 512;
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// Generation budget. `None` runs until the operator quits.
    pub turns: Option<u64>,
    pub threads: usize,
    pub image_width: usize,
    pub image_height: usize,
    /// How often the alive-cell count is reported.
    pub metrics_interval: Duration,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            turns: None,
            threads: DEFAULT_THREADS,
            image_width: DEFAULT_SIZE,
            image_height: DEFAULT_SIZE,
            metrics_interval: DEFAULT_METRICS_INTERVAL,
        }
    }
}

impl Params {
    pub fn new(image_width: usize, image_height: usize, threads: usize) -> Self {
        Self {
            image_width,
            image_height,
            threads,
            ..Self::default()
        }
    }

    pub fn with_turns(mut self, turns: u64) -> Self {
        self.turns = Some(turns);
        self
    }

    pub fn with_metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = interval;
        self
    }

    /// Each worker needs at least one row of its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.image_width == 0 || self.image_height == 0 {
            return Err(ConfigError::EmptyGrid {
                width: self.image_width,
                height: self.image_height,
            });
        }
        if self.threads > self.image_height {
            return Err(ConfigError::TooManyWorkers {
                threads: self.threads,
                height: self.image_height,
            });
        }
        if self.metrics_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    /// Name of the input image, e.g. `512x512`.
    pub fn input_name(&self) -> String {
        format!("{}x{}", self.image_width, self.image_height)
    }

    /// Name of an output image after `completed_turns`, e.g. `512x512x100`.
    pub fn output_name(&self, completed_turns: u64) -> String {
        format!("{}x{}x{}", self.image_width, self.image_height, completed_turns)
    }

    pub(crate) fn budget_reached(&self, completed_turns: u64) -> bool {
        self.turns.is_some_and(|turns| completed_turns >= turns)
    }
}
