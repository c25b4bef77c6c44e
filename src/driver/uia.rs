//! Platform UI-automation tree collaborator
//!
//! The tree backend is stateless: the window and element a scenario is
//! working with live in a [`UiSession`] owned by the caller and passed to
//! every operation.

use crate::error::HarnessError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// How to find an element inside the connected window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSelector {
    Name(String),
    AutomationId(String),
}

impl std::fmt::Display for UiSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiSelector::Name(name) => write!(f, "name='{}'", name),
            UiSelector::AutomationId(id) => write!(f, "auto_id='{}'", id),
        }
    }
}

/// Opaque backend reference to a top-level window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle(pub String);

/// Opaque backend reference to an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// Window and element the current scenario is attached to
#[derive(Debug, Clone, Default)]
pub struct UiSession {
    pub window: Option<WindowHandle>,
    pub element: Option<ElementHandle>,
}

impl UiSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, window: WindowHandle) {
        self.window = Some(window);
        self.element = None;
    }

    pub fn window(&self) -> Result<&WindowHandle> {
        self.window.as_ref().ok_or_else(|| {
            anyhow::anyhow!("Not connected to any window. Use start-app or connect-app first.")
        })
    }

    pub fn element(&self) -> Result<&ElementHandle> {
        self.element
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No element selected. Find an element first."))
    }
}

#[async_trait]
pub trait UiTree: Send + Sync {
    /// Launch an application and return its main window
    async fn start_app(&self, path: &Path) -> Result<WindowHandle>;

    /// Attach to a running application whose window title contains `title`
    async fn connect_app(&self, title: &str) -> Result<WindowHandle>;

    async fn find_element(
        &self,
        window: &WindowHandle,
        selector: &UiSelector,
    ) -> Result<Option<ElementHandle>>;

    async fn click_element(&self, element: &ElementHandle) -> Result<()>;

    async fn type_into_element(&self, element: &ElementHandle, text: &str) -> Result<()>;

    async fn element_text(&self, element: &ElementHandle) -> Result<String>;

    /// Bring a minimized window back to the foreground
    async fn restore_window(&self, window: &WindowHandle) -> Result<()>;
}

/// Backend used when the host has no UI-automation support.
///
/// Every operation fails with [`HarnessError::Unavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableUiTree {
    reason: String,
}

impl UnavailableUiTree {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(HarnessError::unavailable("UI automation", self.reason.clone()).into())
    }
}

impl Default for UnavailableUiTree {
    fn default() -> Self {
        Self::new(format!("no UI-automation backend on {}", std::env::consts::OS))
    }
}

#[async_trait]
impl UiTree for UnavailableUiTree {
    async fn start_app(&self, _path: &Path) -> Result<WindowHandle> {
        self.fail()
    }

    async fn connect_app(&self, _title: &str) -> Result<WindowHandle> {
        self.fail()
    }

    async fn find_element(
        &self,
        _window: &WindowHandle,
        _selector: &UiSelector,
    ) -> Result<Option<ElementHandle>> {
        self.fail()
    }

    async fn click_element(&self, _element: &ElementHandle) -> Result<()> {
        self.fail()
    }

    async fn type_into_element(&self, _element: &ElementHandle, _text: &str) -> Result<()> {
        self.fail()
    }

    async fn element_text(&self, _element: &ElementHandle) -> Result<String> {
        self.fail()
    }

    async fn restore_window(&self, _window: &WindowHandle) -> Result<()> {
        self.fail()
    }
}
