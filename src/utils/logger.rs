//! History logging
//!
//! Every record goes to stderr and is appended to the history log, which the
//! `status` command tails.

use anyhow::Result;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Writes each buffer to stderr and, when available, the history file
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            // A broken history file must not take console logging down with it
            if file.write_all(buf).is_err() {
                self.file = None;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Initialize the global logger. `RUST_LOG` overrides the default `info` level.
pub fn init(log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!(
                "Failed to open history log {}: {} (logging to stderr only)",
                log_file.display(),
                e
            );
            None
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}]: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
        .try_init()?;

    Ok(())
}

/// Last `limit` lines of the history log; a missing log yields no lines.
pub fn tail(log_file: &Path, limit: usize) -> Result<Vec<String>> {
    let content = match std::fs::read_to_string(log_file) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(limit);
    Ok(lines[start..].iter().map(|l| l.to_string()).collect())
}
