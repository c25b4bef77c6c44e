pub mod config;
pub mod logger;

use anyhow::Result;
use std::future::Future;

/// Timestamp used in archived report and failure-capture file names
pub fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Replace characters that are not safe in file names
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// Run an operation whose failure must never propagate.
///
/// The failure is logged at warn level and swallowed.
pub async fn best_effort<T, F>(label: &str, operation: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match operation.await {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("{} failed (ignored): {:#}", label, e);
            None
        }
    }
}
