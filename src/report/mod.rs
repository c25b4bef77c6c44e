pub mod junit;
pub mod trends;
pub mod types;

pub use trends::{analyze, TrendReport, TREND_WINDOW};
pub use types::{ExecutionReport, ReportSummary};
