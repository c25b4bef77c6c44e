//! Failure diagnostics: system load, network reachability and a short burst
//! of screenshots around the failing step

use super::context::RunContext;
use super::state::Diagnostics;
use crate::driver::DesktopDriver;
use crate::utils::config::NetworkProbeConfig;
use crate::utils::{file_timestamp, safe_file_name};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use sysinfo::System;
use tokio::net::TcpStream;
use tokio::process::Command;

const SCREENSHOT_COUNT: usize = 3;

pub struct DiagnosticsCollector {
    ctx: RunContext,
    probe: NetworkProbeConfig,
}

impl DiagnosticsCollector {
    pub fn new(ctx: RunContext, probe: NetworkProbeConfig) -> Self {
        Self { ctx, probe }
    }

    /// Gather diagnostics for a failed step (`step_index` is 0-based).
    /// Never fails; missing pieces are reported as such.
    pub async fn collect(
        &self,
        driver: &dyn DesktopDriver,
        scenario: &str,
        step_index: usize,
    ) -> Diagnostics {
        log::info!("--- Running Failure Diagnostics ---");

        let (cpu_usage, ram_usage) = system_stats().await;
        let network_available = self.check_network().await;
        let screenshots = self.take_screenshots(driver, scenario, step_index).await;

        log::info!("--- Diagnostics Finished ---");
        Diagnostics {
            screenshots,
            network_available,
            cpu_usage,
            ram_usage,
        }
    }

    /// Ping the probe host, falling back to a TCP connect
    pub async fn check_network(&self) -> bool {
        let timeout = match Duration::try_from_secs_f64(self.probe.timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            _ => {
                log::error!(
                    "Invalid network probe timeout '{}'; using 3 seconds",
                    self.probe.timeout_secs
                );
                Duration::from_secs(3)
            }
        };

        if ping(&self.probe.host, timeout).await {
            return true;
        }
        tcp_probe(&self.probe.host, self.probe.port, timeout).await
    }

    async fn take_screenshots(
        &self,
        driver: &dyn DesktopDriver,
        scenario: &str,
        step_index: usize,
    ) -> Vec<PathBuf> {
        log::info!("Taking diagnostic screenshots...");
        let dir = &self.ctx.screenshots_dir;
        if let Err(e) = std::fs::create_dir_all(dir) {
            log::error!("Unable to create screenshots directory {}: {}", dir.display(), e);
            return Vec::new();
        }

        let base = format!("{}_step_{}_failure", safe_file_name(scenario), step_index + 1);
        let mut paths = Vec::with_capacity(SCREENSHOT_COUNT);

        for shot in 1..=SCREENSHOT_COUNT {
            let path = dir.join(format!("{}_{}_shot_{}.png", base, file_timestamp(), shot));
            match driver.take_screenshot(&path).await {
                Ok(()) => {
                    log::info!("  -> Screenshot {} saved to: {}", shot, path.display());
                    paths.push(path);
                }
                Err(e) => log::error!("Failed to take screenshot {}: {:#}", shot, e),
            }
            if shot < SCREENSHOT_COUNT {
                tokio::time::sleep(self.ctx.time_unit).await;
            }
        }

        paths
    }
}

/// CPU and RAM usage as `"12.5%"`, or `"N/A"` when unknown
pub async fn system_stats() -> (String, String) {
    let mut system = System::new();

    system.refresh_cpu();
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    system.refresh_cpu();
    let cpu = system.global_cpu_info().cpu_usage();
    let cpu_usage = if cpu.is_finite() && !system.cpus().is_empty() {
        format!("{:.1}%", cpu)
    } else {
        "N/A".to_string()
    };

    system.refresh_memory();
    let ram_usage = match system.total_memory() {
        0 => "N/A".to_string(),
        total => format!("{:.1}%", system.used_memory() as f64 / total as f64 * 100.0),
    };

    (cpu_usage, ram_usage)
}

async fn ping(host: &str, timeout: Duration) -> bool {
    let mut command = Command::new("ping");
    if cfg!(target_os = "windows") {
        command.args(["-n", "1", "-w", &timeout.as_millis().to_string(), host]);
    } else {
        let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        command.args(["-c", "1", "-W", &secs.to_string(), host]);
    }
    command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout.saturating_add(Duration::from_secs(1)), command.status()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            log::warn!("Network check via ping failed: {}", e);
            false
        }
        Err(_) => {
            log::warn!("Network check timed out after {:?} (ping)", timeout);
            false
        }
    }
}

async fn tcp_probe(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            log::error!("Network check failed via socket: {}", e);
            false
        }
        Err(_) => {
            log::error!("Network check via socket timed out after {:?}", timeout);
            false
        }
    }
}
