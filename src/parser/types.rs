use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scenario name → ordered steps, as persisted in the scenario store
pub type ScenarioMap = BTreeMap<String, Vec<Step>>;

/// Step actions understood by the action dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    FindImage,
    FindText,
    Type,
    Wait,
    AssertImage,
    AssertText,
    WaitForImage,
    WaitForText,
    AssertVisuals,
    StartApp,
    ConnectApp,
    FindUiaName,
    FindUiaId,
    ClickUia,
    TypeUia,
    AssertUiaText,
    /// Kept verbatim so the step fails at run time instead of at load time
    Unknown(String),
}

impl Action {
    pub const ALL: [Action; 16] = [
        Action::FindImage,
        Action::FindText,
        Action::Type,
        Action::Wait,
        Action::AssertImage,
        Action::AssertText,
        Action::WaitForImage,
        Action::WaitForText,
        Action::AssertVisuals,
        Action::StartApp,
        Action::ConnectApp,
        Action::FindUiaName,
        Action::FindUiaId,
        Action::ClickUia,
        Action::TypeUia,
        Action::AssertUiaText,
    ];

    pub fn name(&self) -> &str {
        match self {
            Action::FindImage => "find-image",
            Action::FindText => "find-text",
            Action::Type => "type",
            Action::Wait => "wait",
            Action::AssertImage => "assert-image",
            Action::AssertText => "assert-text",
            Action::WaitForImage => "wait-for-image",
            Action::WaitForText => "wait-for-text",
            Action::AssertVisuals => "assert-visuals",
            Action::StartApp => "start-app",
            Action::ConnectApp => "connect-app",
            Action::FindUiaName => "find-uia-name",
            Action::FindUiaId => "find-uia-id",
            Action::ClickUia => "click-uia",
            Action::TypeUia => "type-uia",
            Action::AssertUiaText => "assert-uia-text",
            Action::Unknown(name) => name,
        }
    }

    /// Whether the step's `timeout` is meaningful
    pub fn uses_timeout(&self) -> bool {
        matches!(self, Action::WaitForImage | Action::WaitForText)
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        let name = value.trim().trim_start_matches("--");
        Action::ALL
            .iter()
            .find(|action| action.name() == name)
            .cloned()
            .unwrap_or_else(|| Action::Unknown(name.to_string()))
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        Action::from(value.as_str())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.name().to_string()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Step timeout in time units. Stored as a number, but scenario files
/// written by hand (or by data substitution) may carry a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timeout {
    Seconds(f64),
    Text(String),
}

impl Timeout {
    pub fn as_secs(&self) -> anyhow::Result<f64> {
        let secs = match self {
            Timeout::Seconds(secs) => *secs,
            Timeout::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| anyhow::anyhow!("Invalid timeout '{}'", text))?,
        };
        if !secs.is_finite() || secs < 0.0 {
            anyhow::bail!("Invalid timeout '{}'", self);
        }
        Ok(secs)
    }
}

impl std::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeout::Seconds(secs) if secs.fract() == 0.0 => write!(f, "{}", *secs as i64),
            Timeout::Seconds(secs) => write!(f, "{}", secs),
            Timeout::Text(text) => f.write_str(text),
        }
    }
}

/// One automation step of a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: Action,

    #[serde(default)]
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,
}

impl Step {
    pub fn new(action: impl Into<Action>, target: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: target.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout = Some(Timeout::Seconds(secs));
        self
    }

    /// `action 'target'`, plus ` (timeout: Ns)` when a timeout is set
    pub fn describe(&self) -> String {
        match &self.timeout {
            Some(timeout) => format!("{} '{}' (timeout: {}s)", self.action, self.target, timeout),
            None => format!("{} '{}'", self.action, self.target),
        }
    }
}
