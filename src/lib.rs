pub mod commands;
pub mod driver;
pub mod error;
pub mod parser;
pub mod report;
pub mod runner;
pub mod store;
pub mod utils;

// Re-export common items
pub use commands::{CommandDispatcher, CommandResponse, Instruction};
pub use error::HarnessError;
pub use runner::{Collaborators, SuiteRunner};
pub use utils::config::Config;
