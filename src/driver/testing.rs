//! In-memory collaborators for tests

use super::image_matcher::{MatchResult, TemplateMatcher};
use super::ocr::{OcrMatch, TextRecognizer};
use super::traits::{DesktopDriver, Position};
use super::uia::{ElementHandle, UiSelector, UiTree, WindowHandle};
use anyhow::Result;
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Rgba, RgbaImage};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Driver with a settable screen that records input
#[derive(Default)]
pub struct MockDriver {
    screen: Mutex<Option<DynamicImage>>,
    clicks: Mutex<Vec<Position>>,
    typed: Mutex<Vec<String>>,
    captures: AtomicUsize,
    fail_typing: AtomicBool,
}

impl MockDriver {
    pub fn new(width: u32, height: u32) -> Self {
        let driver = Self::default();
        driver.set_screen(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([30, 30, 30, 255]),
        )));
        driver
    }

    pub fn set_screen(&self, screen: DynamicImage) {
        *self.screen.lock().unwrap() = Some(screen);
    }

    pub fn set_fail_typing(&self, fail: bool) {
        self.fail_typing.store(fail, Ordering::SeqCst);
    }

    pub fn clicks(&self) -> Vec<Position> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn typed(&self) -> Vec<String> {
        self.typed.lock().unwrap().clone()
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DesktopDriver for MockDriver {
    fn platform_name(&self) -> &str {
        "mock"
    }

    async fn capture_screen(&self) -> Result<DynamicImage> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.screen
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no screen"))
    }

    async fn click(&self, position: Position) -> Result<()> {
        self.clicks.lock().unwrap().push(position);
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        if self.fail_typing.load(Ordering::SeqCst) {
            anyhow::bail!("keyboard unavailable");
        }
        self.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Matcher answering from a queue; `None` once the queue is drained
#[derive(Clone, Default)]
pub struct MockMatcher {
    answers: Arc<Mutex<VecDeque<Option<MatchResult>>>>,
    thresholds: Arc<Mutex<Vec<f32>>>,
}

impl MockMatcher {
    pub fn new(answers: Vec<Option<MatchResult>>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into())),
            thresholds: Arc::default(),
        }
    }

    pub fn thresholds(&self) -> Vec<f32> {
        self.thresholds.lock().unwrap().clone()
    }
}

impl TemplateMatcher for MockMatcher {
    fn find(
        &self,
        _screen: &GrayImage,
        _template: &GrayImage,
        threshold: f32,
    ) -> Result<Option<MatchResult>> {
        self.thresholds.lock().unwrap().push(threshold);
        Ok(self.answers.lock().unwrap().pop_front().flatten())
    }
}

/// OCR answering one queued pass per call, then `fallback` forever
#[derive(Clone, Default)]
pub struct MockOcr {
    passes: Arc<Mutex<VecDeque<Vec<OcrMatch>>>>,
    fallback: Vec<OcrMatch>,
    calls: Arc<AtomicUsize>,
}

impl MockOcr {
    pub fn new(passes: Vec<Vec<OcrMatch>>) -> Self {
        Self {
            passes: Arc::new(Mutex::new(passes.into())),
            ..Self::default()
        }
    }

    pub fn always(fragments: Vec<OcrMatch>) -> Self {
        Self {
            fallback: fragments,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for MockOcr {
    fn recognize(&self, _png: &[u8]) -> Result<Vec<OcrMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .passes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

pub fn text_fragment(text: &str, x: i32, y: i32) -> OcrMatch {
    OcrMatch {
        text: text.to_string(),
        x,
        y,
        width: 50,
        height: 12,
        confidence: 0.95,
    }
}

/// UI tree with a fixed set of elements keyed by name or automation id
#[derive(Clone, Default)]
pub struct MockUiTree {
    elements: HashMap<String, ElementHandle>,
    texts: HashMap<String, String>,
    fail_restore: bool,
    clicked: Arc<Mutex<Vec<ElementHandle>>>,
    typed: Arc<Mutex<Vec<(ElementHandle, String)>>>,
    restored: Arc<AtomicUsize>,
}

impl MockUiTree {
    pub fn with_element(mut self, key: &str, handle: &str) -> Self {
        self.elements
            .insert(key.to_string(), ElementHandle(handle.to_string()));
        self
    }

    pub fn with_text(mut self, handle: &str, text: &str) -> Self {
        self.texts.insert(handle.to_string(), text.to_string());
        self
    }

    pub fn failing_restore(mut self) -> Self {
        self.fail_restore = true;
        self
    }

    pub fn clicked(&self) -> Vec<ElementHandle> {
        self.clicked.lock().unwrap().clone()
    }

    pub fn typed(&self) -> Vec<(ElementHandle, String)> {
        self.typed.lock().unwrap().clone()
    }

    pub fn restored(&self) -> usize {
        self.restored.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UiTree for MockUiTree {
    async fn start_app(&self, path: &Path) -> Result<WindowHandle> {
        Ok(WindowHandle(path.display().to_string()))
    }

    async fn connect_app(&self, title: &str) -> Result<WindowHandle> {
        Ok(WindowHandle(title.to_string()))
    }

    async fn find_element(
        &self,
        _window: &WindowHandle,
        selector: &UiSelector,
    ) -> Result<Option<ElementHandle>> {
        let key = match selector {
            UiSelector::Name(name) => name,
            UiSelector::AutomationId(id) => id,
        };
        Ok(self.elements.get(key).cloned())
    }

    async fn click_element(&self, element: &ElementHandle) -> Result<()> {
        self.clicked.lock().unwrap().push(element.clone());
        Ok(())
    }

    async fn type_into_element(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.typed
            .lock()
            .unwrap()
            .push((element.clone(), text.to_string()));
        Ok(())
    }

    async fn element_text(&self, element: &ElementHandle) -> Result<String> {
        self.texts
            .get(&element.0)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("element {} has no text", element.0))
    }

    async fn restore_window(&self, _window: &WindowHandle) -> Result<()> {
        self.restored.fetch_add(1, Ordering::SeqCst);
        if self.fail_restore {
            anyhow::bail!("window is gone");
        }
        Ok(())
    }
}
