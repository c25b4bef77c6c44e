use super::write_json;
use crate::error::HarnessError;
use crate::report::types::ExecutionReport;
use crate::utils::file_timestamp;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Current execution report plus its archive
#[derive(Debug, Clone)]
pub struct ReportStore {
    report_file: PathBuf,
    history_dir: PathBuf,
}

impl ReportStore {
    pub fn new(report_file: impl Into<PathBuf>, history_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_file: report_file.into(),
            history_dir: history_dir.into(),
        }
    }

    pub fn report_file(&self) -> &Path {
        &self.report_file
    }

    /// Archive the current report, then write `report` in its place
    pub fn write(&self, report: &ExecutionReport) -> Result<()> {
        if let Err(e) = self.archive() {
            log::error!("Could not archive previous report: {:#}", e);
        }
        write_json(&self.report_file, report)?;
        log::info!("Execution report written to {}", self.report_file.display());
        Ok(())
    }

    /// Move the current report to `history/report_<ts>.json`
    pub fn archive(&self) -> Result<Option<PathBuf>> {
        if !self.report_file.is_file() {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.history_dir)
            .map_err(|e| HarnessError::persistence(&self.history_dir, e))?;

        let stamp = file_timestamp();
        let mut target = self.history_dir.join(format!("report_{}.json", stamp));
        let mut n = 1;
        while target.exists() {
            target = self.history_dir.join(format!("report_{}_{}.json", stamp, n));
            n += 1;
        }

        std::fs::rename(&self.report_file, &target)
            .map_err(|e| HarnessError::persistence(&self.report_file, e))?;
        log::info!("Archived previous report to {}", target.display());
        Ok(Some(target))
    }

    pub fn load_current(&self) -> Result<Option<ExecutionReport>> {
        if !self.report_file.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.report_file)
            .map_err(|e| HarnessError::persistence(&self.report_file, e))?;
        let report = serde_json::from_str(&content)
            .with_context(|| format!("Invalid report {}", self.report_file.display()))?;
        Ok(Some(report))
    }

    /// Up to `limit` archived reports, most recently modified first.
    /// Unreadable archives are skipped.
    pub fn history(&self, limit: usize) -> Vec<ExecutionReport> {
        let mut files: Vec<(SystemTime, PathBuf)> = WalkDir::new(&self.history_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry.path().extension().map_or(false, |ext| ext == "json")
            })
            .filter_map(|entry| {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((modified, entry.into_path()))
            })
            .collect();

        files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        files
            .into_iter()
            .take(limit)
            .filter_map(|(_, path)| {
                match read_report(&path) {
                    Ok(report) => Some(report),
                    Err(e) => {
                        log::warn!("Skipping unreadable report {}: {:#}", path.display(), e);
                        None
                    }
                }
            })
            .collect()
    }
}

fn read_report(path: &Path) -> Result<ExecutionReport> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
