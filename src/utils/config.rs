use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "harness.yaml";

/// Application configuration
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the scenario store, knowledge base and baselines
    pub knowledge_base_dir: PathBuf,

    /// Failure screenshots, report history and run lock live here
    pub reports_dir: PathBuf,

    /// Current execution report
    pub report_file: PathBuf,

    /// Instruction payload polled by `watch`
    pub instructions_file: PathBuf,

    /// Append-only history log
    pub log_file: PathBuf,

    /// Length of one "time unit" in milliseconds (fixed delays, waits, polling)
    pub time_unit_ms: u64,

    /// Reachability probe used by failure diagnostics
    pub network_probe: NetworkProbeConfig,

    /// Tesseract language(s)
    pub ocr_language: String,

    /// Interval between instruction file polls (seconds)
    pub watch_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkProbeConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: f64,
}

impl Default for NetworkProbeConfig {
    fn default() -> Self {
        Self {
            host: "8.8.8.8".to_string(),
            port: 53,
            timeout_secs: 3.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            knowledge_base_dir: PathBuf::from("knowledge_base"),
            reports_dir: PathBuf::from("reports"),
            report_file: PathBuf::from("execution_report.json"),
            instructions_file: PathBuf::from("instructions.json"),
            log_file: PathBuf::from("history.log"),
            time_unit_ms: 1000,
            network_probe: NetworkProbeConfig::default(),
            ocr_language: "eng".to_string(),
            watch_interval_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, `./harness.yaml`, or the user
    /// config directory, falling back to defaults when none exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let candidates = [
            Some(PathBuf::from(CONFIG_FILE_NAME)),
            dirs::config_dir().map(|d| d.join("desktop-harness").join("config.yaml")),
        ];

        for candidate in candidates.iter().flatten() {
            if candidate.is_file() {
                return Self::from_file(candidate);
            }
        }

        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Configuration with every store rooted under `root`
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            knowledge_base_dir: root.join("knowledge_base"),
            reports_dir: root.join("reports"),
            report_file: root.join("execution_report.json"),
            instructions_file: root.join("instructions.json"),
            log_file: root.join("history.log"),
            ..Self::default()
        }
    }

    pub fn time_unit(&self) -> Duration {
        Duration::from_millis(self.time_unit_ms)
    }

    pub fn scenarios_file(&self) -> PathBuf {
        self.knowledge_base_dir.join("scenarios.json")
    }

    pub fn knowledge_base_file(&self) -> PathBuf {
        self.knowledge_base_dir.join("kb.json")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.knowledge_base_dir.join("images")
    }

    pub fn performance_baselines_dir(&self) -> PathBuf {
        self.knowledge_base_dir.join("performance_baselines")
    }

    pub fn visual_baselines_dir(&self) -> PathBuf {
        self.knowledge_base_dir.join("visual_baselines")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.reports_dir.join("screenshots")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.reports_dir.join("history")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.reports_dir.join(".run.lock")
    }

    pub fn last_response_file(&self) -> PathBuf {
        self.reports_dir.join("last_response.json")
    }
}
