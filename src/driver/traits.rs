use super::uia::UiSelector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Screen coordinate in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// What a locator searches for
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Template image file
    Image(std::path::PathBuf),
    /// Text recognized on screen (case-insensitive substring)
    Text(String),
    /// Element in the platform UI-automation tree
    UiElement(UiSelector),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Image(path) => write!(f, "image '{}'", path.display()),
            Target::Text(text) => write!(f, "text '{}'", text),
            Target::UiElement(selector) => write!(f, "element {}", selector),
        }
    }
}

/// Raw desktop input and capture
///
/// Implementations inject mouse and keyboard input and grab the screen. They
/// hold no scenario state; locating things on screen is the locator's job.
#[async_trait]
pub trait DesktopDriver: Send + Sync {
    /// Short backend name used in logs
    fn platform_name(&self) -> &str;

    /// Capture the full screen
    async fn capture_screen(&self) -> Result<DynamicImage>;

    /// Left-click at a screen position
    async fn click(&self, position: Position) -> Result<()>;

    /// Inject a string as keystrokes into the focused window
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Save a full-screen capture as PNG
    async fn take_screenshot(&self, path: &Path) -> Result<()> {
        let image = self.capture_screen().await?;
        image
            .save(path)
            .with_context(|| format!("Failed to save screenshot to {}", path.display()))
    }

    /// Capture a rectangular region of the screen
    async fn capture_region(&self, x: u32, y: u32, width: u32, height: u32) -> Result<DynamicImage> {
        let screen = self.capture_screen().await?;
        if x + width > screen.width() || y + height > screen.height() {
            anyhow::bail!(
                "Region {}x{} at ({}, {}) exceeds screen size {}x{}",
                width,
                height,
                x,
                y,
                screen.width(),
                screen.height()
            );
        }
        Ok(screen.crop_imm(x, y, width, height))
    }
}
