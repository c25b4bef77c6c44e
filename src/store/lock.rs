use crate::error::HarnessError;
use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use sysinfo::{Pid, System};

/// Exclusive claim on the report and baseline files for one suite run.
///
/// The lock file holds the owner's pid. A lock left behind by a process that
/// no longer exists is reclaimed. Dropping the guard releases the lock.
#[derive(Debug)]
pub struct RunGuard {
    path: PathBuf,
}

impl RunGuard {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| HarnessError::persistence(parent, e))?;
        }

        for _ in 0..2 {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id())
                        .map_err(|e| HarnessError::persistence(path, e))?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    match owner_pid(path) {
                        Some(pid) if is_alive(pid) => {
                            return Err(HarnessError::RunInProgress(pid).into());
                        }
                        stale => {
                            log::warn!(
                                "Reclaiming stale run lock {} (pid {:?})",
                                path.display(),
                                stale
                            );
                            super::remove_if_exists(path)?;
                        }
                    }
                }
                Err(e) => return Err(HarnessError::persistence(path, e).into()),
            }
        }

        Err(HarnessError::persistence(
            path,
            std::io::Error::new(std::io::ErrorKind::Other, "lock file keeps reappearing"),
        )
        .into())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}

fn owner_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn is_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let mut system = System::new();
    system.refresh_process(Pid::from_u32(pid))
}
