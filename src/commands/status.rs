use crate::store::{KnowledgeBase, ScenarioStore};
use crate::utils::config::Config;
use crate::utils::logger;
use colored::Colorize;
use serde::Serialize;
use std::fmt;

pub const LOG_TAIL_LINES: usize = 20;

/// Known images, known scenarios and the recent log
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatusReport {
    pub images: Vec<String>,
    pub scenarios: Vec<String>,
    pub log_tail: Vec<String>,
}

impl StatusReport {
    /// Unreadable stores are logged and reported as empty
    pub fn gather(config: &Config) -> Self {
        let images = KnowledgeBase::new(config.knowledge_base_file(), config.images_dir())
            .load()
            .map(|kb| kb.into_keys().collect())
            .unwrap_or_else(|e| {
                log::error!("Could not read knowledge base: {:#}", e);
                Vec::new()
            });
        let scenarios = ScenarioStore::new(config.scenarios_file())
            .load()
            .map(|s| s.into_keys().collect())
            .unwrap_or_else(|e| {
                log::error!("Could not read scenarios: {:#}", e);
                Vec::new()
            });
        let log_tail = logger::tail(&config.log_file, LOG_TAIL_LINES).unwrap_or_else(|e| {
            log::error!("Could not read {}: {:#}", config.log_file.display(), e);
            Vec::new()
        });

        Self {
            images,
            scenarios,
            log_tail,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, title: &str, items: &[String]) -> fmt::Result {
    writeln!(f, "{} ({})", title.bold(), items.len())?;
    if items.is_empty() {
        writeln!(f, "  {}", "(none)".dimmed())?;
    }
    for item in items {
        writeln!(f, "  - {}", item)?;
    }
    Ok(())
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_list(f, "Known images", &self.images)?;
        write_list(f, "Scenarios", &self.scenarios)?;
        writeln!(f, "{}", "Recent log".bold())?;
        for line in &self.log_tail {
            writeln!(f, "  {}", line.dimmed())?;
        }
        Ok(())
    }
}
