//! Self-healing element location
//!
//! Image targets are searched at [`PRIMARY_CONFIDENCE`] and, after one time
//! unit, once more at [`HEALED_CONFIDENCE`]. Text targets get two full OCR
//! passes one time unit apart. A miss after the retry is
//! [`LocateOutcome::NotFound`], never an error; `Err` is reserved for
//! collaborator faults such as a failed capture or an absent OCR backend.

use super::image_matcher::TemplateMatcher;
use super::ocr::{OcrMatch, TextRecognizer};
use super::traits::{DesktopDriver, Position, Target};
use super::uia::{ElementHandle, UiSelector, UiSession, UiTree};
use crate::error::HarnessError;
use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Confidence required on the first image search
pub const PRIMARY_CONFIDENCE: f32 = 0.9;

/// Relaxed confidence for the single self-healing retry
pub const HEALED_CONFIDENCE: f32 = 0.8;

/// OCR fragments must score strictly above this to count
pub const OCR_MIN_CONFIDENCE: f32 = 0.60;

/// Where a located target is
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Point(Position),
    Element(ElementHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocateOutcome {
    Found {
        location: Location,
        /// True when only the relaxed retry succeeded
        healed: bool,
    },
    NotFound,
}

impl LocateOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, LocateOutcome::Found { .. })
    }
}

pub struct Locator {
    driver: Arc<dyn DesktopDriver>,
    matcher: Arc<dyn TemplateMatcher>,
    ocr: Option<Arc<dyn TextRecognizer>>,
    ui: Arc<dyn UiTree>,
    retry_delay: Duration,
}

impl Locator {
    pub fn new(
        driver: Arc<dyn DesktopDriver>,
        matcher: Arc<dyn TemplateMatcher>,
        ocr: Option<Arc<dyn TextRecognizer>>,
        ui: Arc<dyn UiTree>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            driver,
            matcher,
            ocr,
            ui,
            retry_delay,
        }
    }

    pub fn driver(&self) -> &Arc<dyn DesktopDriver> {
        &self.driver
    }

    /// Locate a target, applying the self-healing retry.
    ///
    /// With `should_log` false the outcome is left for the caller to report.
    pub async fn locate(
        &self,
        target: &Target,
        session: &mut UiSession,
        should_log: bool,
    ) -> Result<LocateOutcome> {
        let outcome = match target {
            Target::Image(path) => self.locate_image(path).await?,
            Target::Text(query) => self.locate_text(query).await?,
            Target::UiElement(selector) => self.locate_element(selector, session).await?,
        };

        if should_log {
            match &outcome {
                LocateOutcome::Found {
                    location,
                    healed: false,
                } => log::info!("SUCCESS: found {} at {}", target, describe(location)),
                LocateOutcome::Found {
                    location,
                    healed: true,
                } => log::info!(
                    "SELF-HEALED: found {} at {} with relaxed confidence {}",
                    target,
                    describe(location),
                    HEALED_CONFIDENCE
                ),
                LocateOutcome::NotFound => log::error!("FAILURE: {} not found", target),
            }
        }

        Ok(outcome)
    }

    /// Locate only; true when the target is on screen
    pub async fn assert_visible(&self, target: &Target, session: &mut UiSession) -> Result<bool> {
        Ok(self.locate(target, session, true).await?.is_found())
    }

    /// Locate then click; false when the target was not found
    pub async fn click(&self, target: &Target, session: &mut UiSession) -> Result<bool> {
        match self.locate(target, session, false).await? {
            LocateOutcome::Found { location, healed } => {
                match &location {
                    Location::Point(position) => self.driver.click(*position).await?,
                    Location::Element(element) => self.ui.click_element(element).await?,
                }
                let band = if healed { "SELF-HEALED" } else { "SUCCESS" };
                log::info!("{}: clicked {} at {}", band, target, describe(&location));
                Ok(true)
            }
            LocateOutcome::NotFound => {
                log::error!("FAILURE: cannot click {}, not found", target);
                Ok(false)
            }
        }
    }

    async fn locate_image(&self, path: &Path) -> Result<LocateOutcome> {
        let template = image::open(path)
            .with_context(|| format!("Failed to load template image {}", path.display()))?
            .to_luma8();

        let screen = self.driver.capture_screen().await?.to_luma8();
        if let Some(found) = self.matcher.find(&screen, &template, PRIMARY_CONFIDENCE)? {
            return Ok(found_point(found.x, found.y, false));
        }

        log::debug!(
            "{} not found at confidence {}, retrying at {}",
            path.display(),
            PRIMARY_CONFIDENCE,
            HEALED_CONFIDENCE
        );
        tokio::time::sleep(self.retry_delay).await;

        let screen = self.driver.capture_screen().await?.to_luma8();
        Ok(match self.matcher.find(&screen, &template, HEALED_CONFIDENCE)? {
            Some(found) => found_point(found.x, found.y, true),
            None => LocateOutcome::NotFound,
        })
    }

    async fn locate_text(&self, query: &str) -> Result<LocateOutcome> {
        let ocr = self
            .ocr
            .as_ref()
            .ok_or_else(|| HarnessError::unavailable("OCR", "no OCR backend installed"))?;

        if let Some(hit) = self.ocr_pass(ocr.as_ref(), query).await? {
            return Ok(found_point(hit.x, hit.y, false));
        }

        log::debug!("'{}' not recognized, running a second OCR pass", query);
        tokio::time::sleep(self.retry_delay).await;

        Ok(match self.ocr_pass(ocr.as_ref(), query).await? {
            Some(hit) => found_point(hit.x, hit.y, true),
            None => LocateOutcome::NotFound,
        })
    }

    async fn ocr_pass(&self, ocr: &dyn TextRecognizer, query: &str) -> Result<Option<OcrMatch>> {
        let screen = self.driver.capture_screen().await?;
        let fragments = ocr.recognize(&encode_png(&screen)?)?;
        Ok(first_text_match(fragments, query))
    }

    async fn locate_element(
        &self,
        selector: &UiSelector,
        session: &mut UiSession,
    ) -> Result<LocateOutcome> {
        let window = session.window()?.clone();
        match self.ui.find_element(&window, selector).await? {
            Some(element) => {
                session.element = Some(element.clone());
                Ok(LocateOutcome::Found {
                    location: Location::Element(element),
                    healed: false,
                })
            }
            None => {
                session.element = None;
                Ok(LocateOutcome::NotFound)
            }
        }
    }
}

/// First fragment, in reported order, that is confident enough and contains
/// the query case-insensitively
pub fn first_text_match(fragments: Vec<OcrMatch>, query: &str) -> Option<OcrMatch> {
    let needle = query.to_lowercase();
    fragments
        .into_iter()
        .find(|f| f.confidence > OCR_MIN_CONFIDENCE && f.text.to_lowercase().contains(&needle))
}

pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .context("Failed to encode capture as PNG")?;
    Ok(bytes.into_inner())
}

fn found_point(x: i32, y: i32, healed: bool) -> LocateOutcome {
    LocateOutcome::Found {
        location: Location::Point(Position::new(x, y)),
        healed,
    }
}

fn describe(location: &Location) -> String {
    match location {
        Location::Point(position) => position.to_string(),
        Location::Element(element) => element.0.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::image_matcher::MatchResult;
    use crate::driver::testing::{MockDriver, MockMatcher, MockOcr, MockUiTree};

    fn fragment(text: &str, confidence: f32, x: i32) -> OcrMatch {
        OcrMatch {
            text: text.to_string(),
            x,
            y: 10,
            width: 40,
            height: 10,
            confidence,
        }
    }

    fn template_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("ok_button.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();
        path
    }

    fn locator(matcher: MockMatcher, ocr: Option<MockOcr>) -> (Locator, Arc<MockDriver>) {
        let driver = Arc::new(MockDriver::new(32, 32));
        let locator = Locator::new(
            driver.clone(),
            Arc::new(matcher),
            ocr.map(|o| Arc::new(o) as Arc<dyn TextRecognizer>),
            Arc::new(MockUiTree::default()),
            Duration::from_millis(1),
        );
        (locator, driver)
    }

    fn hit(x: i32, y: i32, confidence: f32) -> Option<MatchResult> {
        Some(MatchResult { x, y, confidence })
    }

    #[tokio::test]
    async fn test_image_found_at_primary_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let matcher = MockMatcher::new(vec![hit(5, 6, 0.95)]);
        let (locator, _) = locator(matcher.clone(), None);

        let outcome = locator
            .locate(&Target::Image(template_file(dir.path())), &mut UiSession::new(), true)
            .await
            .unwrap();

        assert_eq!(outcome, found_point(5, 6, false));
        assert_eq!(matcher.thresholds(), vec![PRIMARY_CONFIDENCE]);
    }

    #[tokio::test]
    async fn test_image_self_heals_at_relaxed_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let matcher = MockMatcher::new(vec![None, hit(7, 8, 0.85)]);
        let (locator, driver) = locator(matcher.clone(), None);

        let clicked = locator
            .click(&Target::Image(template_file(dir.path())), &mut UiSession::new())
            .await
            .unwrap();

        assert!(clicked);
        assert_eq!(matcher.thresholds(), vec![PRIMARY_CONFIDENCE, HEALED_CONFIDENCE]);
        assert_eq!(driver.clicks(), vec![Position::new(7, 8)]);
    }

    #[tokio::test]
    async fn test_image_not_found_after_retry() {
        let dir = tempfile::tempdir().unwrap();
        let (locator, driver) = locator(MockMatcher::new(vec![None, None]), None);

        let clicked = locator
            .click(&Target::Image(template_file(dir.path())), &mut UiSession::new())
            .await
            .unwrap();

        assert!(!clicked);
        assert!(driver.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_text_second_pass_finds_target() {
        let ocr = MockOcr::new(vec![
            vec![fragment("Loading", 0.9, 1)],
            vec![fragment("Welcome, user", 0.9, 30)],
        ]);
        let (locator, _) = locator(MockMatcher::new(vec![]), Some(ocr.clone()));

        let outcome = locator
            .locate(&Target::Text("welcome".into()), &mut UiSession::new(), true)
            .await
            .unwrap();

        assert_eq!(outcome, found_point(30, 10, true));
        assert_eq!(ocr.calls(), 2);
    }

    #[tokio::test]
    async fn test_text_without_ocr_backend_is_an_error() {
        let (locator, _) = locator(MockMatcher::new(vec![]), None);
        let result = locator
            .locate(&Target::Text("Save".into()), &mut UiSession::new(), false)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_first_text_match_policy() {
        let fragments = vec![
            fragment("Submit order", 0.60, 1),
            fragment("submit", 0.61, 2),
            fragment("SUBMIT", 0.99, 3),
        ];
        // 0.60 is not strictly above the threshold; first qualifying wins
        assert_eq!(first_text_match(fragments, "Submit").unwrap().x, 2);
        assert!(first_text_match(vec![fragment("Cancel", 0.9, 1)], "ok").is_none());
    }

    #[tokio::test]
    async fn test_ui_element_sets_session_element() {
        let tree = MockUiTree::default().with_element("Save", "elem-save");
        let locator = Locator::new(
            Arc::new(MockDriver::new(8, 8)),
            Arc::new(MockMatcher::new(vec![])),
            None,
            Arc::new(tree),
            Duration::from_millis(1),
        );

        let mut session = UiSession::new();
        let target = Target::UiElement(UiSelector::Name("Save".into()));
        assert!(locator.locate(&target, &mut session, true).await.is_err());

        session.attach(crate::driver::uia::WindowHandle("Editor".into()));
        assert!(locator.assert_visible(&target, &mut session).await.unwrap());
        assert_eq!(session.element, Some(ElementHandle("elem-save".into())));
    }
}
