use super::{read_json_or_default, write_json};
use crate::error::HarnessError;
use crate::parser::{ScenarioMap, Step};
use anyhow::Result;
use std::path::PathBuf;

/// `scenarios.json`: scenario name → steps
#[derive(Debug, Clone)]
pub struct ScenarioStore {
    path: PathBuf,
}

impl ScenarioStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<ScenarioMap> {
        read_json_or_default(&self.path)
    }

    pub fn get(&self, name: &str) -> Result<Vec<Step>> {
        self.load()?
            .remove(name)
            .ok_or_else(|| HarnessError::ScenarioNotFound(name.to_string()).into())
    }

    /// Create or fully replace a scenario's steps
    pub fn upsert(&self, name: &str, steps: Vec<Step>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(HarnessError::InvalidInput("scenario name is empty".into()).into());
        }
        if steps.is_empty() {
            return Err(
                HarnessError::InvalidInput(format!("scenario '{}' has no steps", name)).into(),
            );
        }

        let mut scenarios = self.load()?;
        let replaced = scenarios.insert(name.to_string(), steps).is_some();
        write_json(&self.path, &scenarios)?;
        log::info!(
            "Scenario '{}' {}",
            name,
            if replaced { "updated" } else { "created" }
        );
        Ok(())
    }

    /// Remove a scenario; false when it did not exist
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut scenarios = self.load()?;
        if scenarios.remove(name).is_none() {
            return Ok(false);
        }
        write_json(&self.path, &scenarios)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_replaces_full_step_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScenarioStore::new(dir.path().join("scenarios.json"));

        store
            .upsert("login", vec![Step::new("type", "a"), Step::new("wait", "1")])
            .unwrap();
        store.upsert("login", vec![Step::new("type", "b")]).unwrap();

        let steps = store.get("login").unwrap();
        assert_eq!(steps, vec![Step::new("type", "b")]);
    }

    #[test]
    fn test_invalid_upserts_and_missing_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScenarioStore::new(dir.path().join("scenarios.json"));

        assert!(store.upsert("", vec![Step::new("wait", "1")]).is_err());
        assert!(store.upsert("empty", vec![]).is_err());

        let err = store.get("missing").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::ScenarioNotFound(_))
        ));
        assert!(!store.remove("missing").unwrap());
    }
}
