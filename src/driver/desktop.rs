//! Desktop driver backed by platform command-line tools
//!
//! - Linux (X11): `xdotool` for input, ImageMagick `import`, `scrot` or
//!   `gnome-screenshot` for capture
//! - macOS: `screencapture`, `cliclick` for input
//! - Windows: PowerShell with System.Drawing / user32 / SendKeys
//!
//! Missing tools do not fail construction. The affected operation returns an
//! `Unavailable` error instead, which surfaces as a step failure.

use super::traits::{DesktopDriver, Position};
use crate::error::HarnessError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone)]
enum CaptureTool {
    Import(PathBuf),
    Scrot(PathBuf),
    GnomeScreenshot(PathBuf),
    ScreenCapture(PathBuf),
    PowerShell,
}

#[derive(Debug, Clone)]
enum InputTool {
    Xdotool(PathBuf),
    Cliclick(PathBuf),
    PowerShell,
}

/// Driver for the local desktop session
#[derive(Debug, Clone)]
pub struct SystemDesktop {
    capture: Option<CaptureTool>,
    input: Option<InputTool>,
}

impl SystemDesktop {
    /// Probe the host for capture and input tools
    pub fn detect() -> Self {
        let (capture, input) = if cfg!(target_os = "windows") {
            (Some(CaptureTool::PowerShell), Some(InputTool::PowerShell))
        } else if cfg!(target_os = "macos") {
            (
                which::which("screencapture").ok().map(CaptureTool::ScreenCapture),
                which::which("cliclick").ok().map(InputTool::Cliclick),
            )
        } else {
            let capture = which::which("import")
                .ok()
                .map(CaptureTool::Import)
                .or_else(|| which::which("scrot").ok().map(CaptureTool::Scrot))
                .or_else(|| {
                    which::which("gnome-screenshot")
                        .ok()
                        .map(CaptureTool::GnomeScreenshot)
                });
            (capture, which::which("xdotool").ok().map(InputTool::Xdotool))
        };

        if capture.is_none() {
            log::warn!("No screen capture tool found. Screen-based actions are disabled.");
        }
        if input.is_none() {
            log::warn!("No input injection tool found. Click and type actions are disabled.");
        }

        Self { capture, input }
    }

    fn input_tool(&self) -> Result<&InputTool> {
        self.input.as_ref().ok_or_else(|| {
            HarnessError::unavailable(
                "input injection",
                "install xdotool (Linux) or cliclick (macOS)",
            )
            .into()
        })
    }

    async fn capture_to(&self, path: &Path) -> Result<()> {
        let tool = self.capture.as_ref().ok_or_else(|| {
            HarnessError::unavailable(
                "screen capture",
                "install ImageMagick, scrot or gnome-screenshot",
            )
        })?;
        let path_str = path.to_string_lossy().to_string();

        match tool {
            CaptureTool::Import(bin) => run_tool(bin, &["-window", "root", &path_str]).await,
            CaptureTool::Scrot(bin) => run_tool(bin, &["-o", &path_str]).await,
            CaptureTool::GnomeScreenshot(bin) => run_tool(bin, &["-f", &path_str]).await,
            CaptureTool::ScreenCapture(bin) => run_tool(bin, &["-x", &path_str]).await,
            CaptureTool::PowerShell => run_powershell(&capture_script(&path_str)).await,
        }
    }
}

#[async_trait]
impl DesktopDriver for SystemDesktop {
    fn platform_name(&self) -> &str {
        std::env::consts::OS
    }

    async fn capture_screen(&self) -> Result<DynamicImage> {
        let temp_path =
            std::env::temp_dir().join(format!("harness_capture_{}.png", uuid::Uuid::new_v4()));
        self.capture_to(&temp_path).await?;

        let image = image::open(&temp_path)
            .with_context(|| format!("Failed to decode capture {}", temp_path.display()));
        if let Err(e) = std::fs::remove_file(&temp_path) {
            log::warn!("Failed to remove {} (ignored): {}", temp_path.display(), e);
        }
        image
    }

    async fn take_screenshot(&self, path: &Path) -> Result<()> {
        self.capture_to(path).await
    }

    async fn click(&self, position: Position) -> Result<()> {
        let (x, y) = (position.x.to_string(), position.y.to_string());
        match self.input_tool()? {
            InputTool::Xdotool(bin) => {
                run_tool(bin, &["mousemove", &x, &y, "click", "1"]).await
            }
            InputTool::Cliclick(bin) => run_tool(bin, &[&format!("c:{},{}", x, y)]).await,
            InputTool::PowerShell => run_powershell(&click_script(position)).await,
        }
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        match self.input_tool()? {
            InputTool::Xdotool(bin) => run_tool(bin, &["type", "--delay", "20", "--", text]).await,
            InputTool::Cliclick(bin) => run_tool(bin, &[&format!("t:{}", text)]).await,
            InputTool::PowerShell => run_powershell(&type_script(text)).await,
        }
    }
}

async fn run_tool(program: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("Failed to execute {}", program.display()))?;

    if !output.status.success() {
        anyhow::bail!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

async fn run_powershell(script: &str) -> Result<()> {
    let output = Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", script])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("Failed to execute powershell")?;

    if !output.status.success() {
        anyhow::bail!(
            "PowerShell failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

fn ps_quote(value: &str) -> String {
    value.replace('\'', "''")
}

fn capture_script(path: &str) -> String {
    format!(
        r#"
Add-Type -AssemblyName System.Windows.Forms,System.Drawing
$bounds = [System.Windows.Forms.SystemInformation]::VirtualScreen
$bitmap = New-Object System.Drawing.Bitmap $bounds.Width, $bounds.Height
$graphics = [System.Drawing.Graphics]::FromImage($bitmap)
$graphics.CopyFromScreen($bounds.Left, $bounds.Top, 0, 0, $bitmap.Size)
$bitmap.Save('{}', [System.Drawing.Imaging.ImageFormat]::Png)
$graphics.Dispose()
$bitmap.Dispose()
"#,
        ps_quote(path)
    )
}

fn click_script(position: Position) -> String {
    format!(
        r#"
Add-Type @"
using System;
using System.Runtime.InteropServices;
public static class HarnessMouse {{
    [DllImport("user32.dll")] public static extern bool SetCursorPos(int x, int y);
    [DllImport("user32.dll")] public static extern void mouse_event(uint flags, uint dx, uint dy, uint data, UIntPtr extra);
}}
"@
[HarnessMouse]::SetCursorPos({}, {}) | Out-Null
[HarnessMouse]::mouse_event(0x0002, 0, 0, 0, [UIntPtr]::Zero)
[HarnessMouse]::mouse_event(0x0004, 0, 0, 0, [UIntPtr]::Zero)
"#,
        position.x, position.y
    )
}

fn type_script(text: &str) -> String {
    format!(
        "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.SendKeys]::SendWait('{}')",
        ps_quote(&escape_send_keys(text))
    )
}

/// SendKeys treats `+^%~(){}[]` as modifiers or grouping; brace them to type literally
fn escape_send_keys(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '[' | ']' | '{' | '}' => {
                escaped.push('{');
                escaped.push(c);
                escaped.push('}');
            }
            c => escaped.push(c),
        }
    }
    escaped
}
