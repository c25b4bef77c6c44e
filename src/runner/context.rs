use crate::utils::config::Config;
use std::path::PathBuf;
use std::time::Duration;

/// Timing and output locations shared by everything in one run
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Length of one time unit
    pub time_unit: Duration,

    /// Failure screenshots land here
    pub screenshots_dir: PathBuf,
}

impl RunContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            time_unit: config.time_unit(),
            screenshots_dir: config.screenshots_dir(),
        }
    }

    /// `n` time units; negative or NaN values count as zero, values too large
    /// for a `Duration` saturate to `Duration::MAX`
    pub fn units(&self, n: f64) -> Duration {
        if n.is_nan() || n <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.time_unit.as_secs_f64() * n).unwrap_or(Duration::MAX)
    }
}
