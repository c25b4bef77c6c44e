pub mod data;
pub mod types;

pub use types::{Action, ScenarioMap, Step, Timeout};
