use super::{remove_if_exists, write_json};
use crate::runner::state::PerformanceReport;
use crate::utils::{file_timestamp, safe_file_name};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// A performance baseline is the report of the run that established it
pub type PerformanceBaseline = PerformanceReport;

/// `performance_baselines/<scenario>.json`
#[derive(Debug, Clone)]
pub struct PerformanceBaselines {
    dir: PathBuf,
}

impl PerformanceBaselines {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, scenario: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_file_name(scenario)))
    }

    /// Stored baseline, or `None` when absent or unreadable
    pub fn load(&self, scenario: &str) -> Option<PerformanceBaseline> {
        let path = self.path_for(scenario);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::error!("Error loading baseline file {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(baseline) => Some(baseline),
            Err(e) => {
                log::error!("Error loading baseline file {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, scenario: &str, baseline: &PerformanceBaseline) -> Result<()> {
        let path = self.path_for(scenario);
        write_json(&path, baseline)?;
        log::info!(
            "Performance baseline saved for '{}' at {}",
            scenario,
            path.display()
        );
        Ok(())
    }

    /// Delete a baseline so the next run recreates it; absent is not an error
    pub fn delete(&self, scenario: &str) -> Result<()> {
        if remove_if_exists(&self.path_for(scenario))? {
            log::info!("Deleted performance baseline for '{}'", scenario);
        } else {
            log::info!("Baseline for '{}' not found. Nothing to delete.", scenario);
        }
        Ok(())
    }
}

/// `visual_baselines/<page>.png` plus `visual_fail_*` review captures
#[derive(Debug, Clone)]
pub struct VisualBaselines {
    dir: PathBuf,
}

impl VisualBaselines {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, page: &str) -> PathBuf {
        self.dir.join(format!("{}.png", safe_file_name(page)))
    }

    /// Review files for one failed check:
    /// `visual_fail_{page}_{current|diff}_{timestamp}[_n].png`.
    ///
    /// Both paths share one suffix, chosen so that neither file exists yet.
    pub fn failure_paths(&self, page: &str) -> (PathBuf, PathBuf) {
        let page = safe_file_name(page);
        let stamp = file_timestamp();
        let pair = |suffix: &str| {
            let path = |kind: &str| {
                self.dir
                    .join(format!("visual_fail_{}_{}_{}{}.png", page, kind, stamp, suffix))
            };
            (path("current"), path("diff"))
        };

        let mut paths = pair("");
        let mut n = 1;
        while paths.0.exists() || paths.1.exists() {
            paths = pair(&format!("_{}", n));
            n += 1;
        }
        paths
    }

    /// Reset a page to the no-baseline state; absent is not an error
    pub fn delete(&self, page: &str) -> Result<()> {
        if remove_if_exists(&self.path_for(page))? {
            log::info!("Deleted visual baseline for '{}'", page);
        } else {
            log::info!("Visual baseline for '{}' not found. Nothing to delete.", page);
        }
        Ok(())
    }
}
