//! Action dispatch: one step's action name to the capability that runs it
//!
//! A handler's `Err` is a step failure. It aborts the scenario at that step
//! and never escapes the scenario executor.

use super::context::RunContext;
use super::visual::{VisualChecker, VisualVerdict};
use super::Collaborators;
use crate::driver::{DesktopDriver, LocateOutcome, Locator, Target, UiSelector, UiSession, UiTree};
use crate::error::HarnessError;
use crate::parser::{Action, Step};
use crate::store::{KnowledgeBase, VisualBaselines};
use crate::utils::best_effort;
use crate::utils::config::Config;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Poll interval of the wait-for actions, in time units
pub const POLL_INTERVAL_UNITS: f64 = 0.5;

pub struct ActionDispatcher {
    locator: Locator,
    ui: Arc<dyn UiTree>,
    session: UiSession,
    knowledge_base: KnowledgeBase,
    visual: VisualChecker,
    ctx: RunContext,
}

impl ActionDispatcher {
    pub fn new(collaborators: &Collaborators, config: &Config) -> Self {
        let ctx = RunContext::from_config(config);
        Self {
            locator: Locator::new(
                collaborators.driver.clone(),
                collaborators.matcher.clone(),
                collaborators.ocr.clone(),
                collaborators.ui.clone(),
                ctx.time_unit,
            ),
            ui: collaborators.ui.clone(),
            session: UiSession::new(),
            knowledge_base: KnowledgeBase::new(config.knowledge_base_file(), config.images_dir()),
            visual: VisualChecker::new(VisualBaselines::new(config.visual_baselines_dir())),
            ctx,
        }
    }

    fn driver(&self) -> &Arc<dyn DesktopDriver> {
        self.locator.driver()
    }

    pub fn session(&self) -> &UiSession {
        &self.session
    }

    /// Run one step
    pub async fn dispatch(&mut self, step: &Step) -> Result<()> {
        let target = step.target.as_str();
        match &step.action {
            Action::FindImage => {
                let image = Target::Image(self.resolve_image(target)?);
                self.click(&image).await
            }
            Action::FindText => self.click(&Target::Text(target.to_string())).await,
            Action::Type => {
                self.driver().type_text(target).await?;
                log::info!("Typed '{}'", target);
                Ok(())
            }
            Action::Wait => {
                let secs = parse_seconds(target)?;
                tokio::time::sleep(self.ctx.units(secs)).await;
                Ok(())
            }
            Action::AssertImage => {
                let image = Target::Image(self.resolve_image(target)?);
                self.assert_visible(&image).await
            }
            Action::AssertText => self.assert_visible(&Target::Text(target.to_string())).await,
            Action::WaitForImage => {
                let image = Target::Image(self.resolve_image(target)?);
                self.wait_for(&image, step).await
            }
            Action::WaitForText => self.wait_for(&Target::Text(target.to_string()), step).await,
            Action::AssertVisuals => self.assert_visuals(target).await,
            Action::StartApp => {
                let window = self.ui.start_app(Path::new(target)).await?;
                log::info!("Started app {} (window {})", target, window.0);
                self.attach(window).await;
                Ok(())
            }
            Action::ConnectApp => {
                let window = self.ui.connect_app(target).await?;
                log::info!("Connected to window '{}'", window.0);
                self.attach(window).await;
                Ok(())
            }
            Action::FindUiaName => {
                self.assert_visible(&Target::UiElement(UiSelector::Name(target.to_string())))
                    .await
            }
            Action::FindUiaId => {
                self.assert_visible(&Target::UiElement(UiSelector::AutomationId(
                    target.to_string(),
                )))
                .await
            }
            Action::ClickUia => {
                let element = self.session.element()?;
                self.ui.click_element(element).await?;
                log::info!("Clicked element {}", element.0);
                Ok(())
            }
            Action::TypeUia => {
                let element = self.session.element()?;
                self.ui.type_into_element(element, target).await?;
                log::info!("Typed '{}' into element {}", target, element.0);
                Ok(())
            }
            Action::AssertUiaText => {
                let element = self.session.element()?;
                let actual = self.ui.element_text(element).await?;
                let matched = actual.to_lowercase().contains(&target.to_lowercase());
                log::info!(
                    "UIA text assertion. Expected: '{}', Actual: '{}'. Match: {}",
                    target,
                    actual,
                    matched
                );
                if !matched {
                    bail!("Element text '{}' does not contain '{}'", actual, target);
                }
                Ok(())
            }
            Action::Unknown(name) => bail!("Unknown action '{}'", name),
        }
    }

    /// Learned object name, or a direct path to an existing image
    fn resolve_image(&self, name: &str) -> Result<PathBuf> {
        match self.knowledge_base.resolve(name) {
            Ok(path) => Ok(path),
            Err(_) if Path::new(name).is_file() => Ok(PathBuf::from(name)),
            Err(e) => Err(e),
        }
    }

    async fn click(&mut self, target: &Target) -> Result<()> {
        if !self.locator.click(target, &mut self.session).await? {
            bail!("{} not found on screen", target);
        }
        Ok(())
    }

    async fn assert_visible(&mut self, target: &Target) -> Result<()> {
        if !self.locator.assert_visible(target, &mut self.session).await? {
            bail!("{} not found", target);
        }
        Ok(())
    }

    /// Poll until the target appears or the step's timeout elapses
    async fn wait_for(&mut self, target: &Target, step: &Step) -> Result<()> {
        let timeout = step
            .timeout
            .as_ref()
            .ok_or_else(|| HarnessError::InvalidInput(format!("{} requires a timeout", step.action)))?
            .as_secs()?;
        // None: the timeout is beyond what the clock can represent
        let deadline = Instant::now().checked_add(self.ctx.units(timeout));

        loop {
            if let LocateOutcome::Found { location, .. } =
                self.locator.locate(target, &mut self.session, false).await?
            {
                log::info!("SUCCESS: {} appeared at {:?}", target, location);
                return Ok(());
            }
            if deadline.map_or(false, |d| Instant::now() >= d) {
                bail!("{} did not appear within {}s", target, timeout);
            }
            tokio::time::sleep(self.ctx.units(POLL_INTERVAL_UNITS)).await;
        }
    }

    async fn assert_visuals(&mut self, page: &str) -> Result<()> {
        let verdict = self.visual.check(self.driver().as_ref(), page).await?;
        match verdict {
            VisualVerdict::BaselineCreated(_) | VisualVerdict::Matched => Ok(()),
            VisualVerdict::Mismatch { diff, bbox, .. } => bail!(
                "Visual difference on '{}' in region {:?}; diff saved to {}",
                page,
                bbox,
                diff.display()
            ),
            VisualVerdict::DimensionMismatch {
                baseline_size,
                current_size,
                ..
            } => bail!(
                "Screen size {:?} differs from baseline {:?} for '{}'",
                current_size,
                baseline_size,
                page
            ),
        }
    }

    async fn attach(&mut self, window: crate::driver::uia::WindowHandle) {
        let ui = self.ui.clone();
        best_effort("restore window", ui.restore_window(&window)).await;
        self.session.attach(window);
    }
}

/// Non-negative number of seconds
fn parse_seconds(target: &str) -> Result<f64> {
    match target.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs),
        _ => bail!("Invalid wait duration '{}'", target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::image_matcher::MatchResult;
    use crate::driver::ocr::TextRecognizer;
    use crate::driver::testing::{text_fragment, MockDriver, MockMatcher, MockOcr, MockUiTree};
    use crate::driver::Position;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::time::Duration;

    struct Fixture {
        dir: tempfile::TempDir,
        config: Config,
        driver: Arc<MockDriver>,
        dispatcher: ActionDispatcher,
    }

    fn fixture(ocr: MockOcr, ui: MockUiTree) -> Fixture {
        fixture_with(MockMatcher::default(), Some(ocr), ui)
    }

    fn fixture_with(matcher: MockMatcher, ocr: Option<MockOcr>, ui: MockUiTree) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path());
        config.time_unit_ms = 5;
        let driver = Arc::new(MockDriver::new(16, 16));
        let collaborators = Collaborators {
            driver: driver.clone(),
            matcher: Arc::new(matcher),
            ocr: ocr.map(|o| Arc::new(o) as Arc<dyn TextRecognizer>),
            ui: Arc::new(ui),
        };
        Fixture {
            dispatcher: ActionDispatcher::new(&collaborators, &config),
            driver,
            config,
            dir,
        }
    }

    fn hit(x: i32, y: i32) -> Option<MatchResult> {
        Some(MatchResult {
            x,
            y,
            confidence: 0.95,
        })
    }

    fn learn(config: &Config, name: &str) {
        KnowledgeBase::new(config.knowledge_base_file(), config.images_dir())
            .learn(name, &DynamicImage::new_rgb8(4, 4), false)
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_text_clicks_fragment_center() {
        let mut f = fixture(
            MockOcr::always(vec![text_fragment("Save As", 40, 12)]),
            MockUiTree::default(),
        );
        f.dispatcher.dispatch(&Step::new("find-text", "save")).await.unwrap();
        assert_eq!(f.driver.clicks(), vec![crate::driver::Position::new(40, 12)]);
    }

    #[tokio::test]
    async fn test_type_and_wait() {
        let mut f = fixture(MockOcr::default(), MockUiTree::default());
        f.dispatcher.dispatch(&Step::new("type", "user1")).await.unwrap();
        f.dispatcher.dispatch(&Step::new("wait", "1")).await.unwrap();
        assert_eq!(f.driver.typed(), vec!["user1".to_string()]);

        assert!(f.dispatcher.dispatch(&Step::new("wait", "soon")).await.is_err());
        assert!(f.dispatcher.dispatch(&Step::new("wait", "-2")).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_action_fails_step() {
        let mut f = fixture(MockOcr::default(), MockUiTree::default());
        let err = f
            .dispatcher
            .dispatch(&Step::new("teleport", "moon"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown action 'teleport'"));
    }

    #[tokio::test]
    async fn test_wait_for_text_polls_until_found() {
        let ocr = MockOcr::new(vec![vec![], vec![], vec![], vec![text_fragment("Ready", 5, 5)]]);
        let mut f = fixture(ocr.clone(), MockUiTree::default());

        let step = Step::new("wait-for-text", "ready").with_timeout(100.0);
        f.dispatcher.dispatch(&step).await.unwrap();
        assert_eq!(ocr.calls(), 4);
        assert!(f.driver.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_text_times_out() {
        let mut f = fixture(MockOcr::default(), MockUiTree::default());
        let started = Instant::now();
        let step = Step::new("wait-for-text", "never").with_timeout(2.0);
        assert!(f.dispatcher.dispatch(&step).await.is_err());
        assert!(started.elapsed() >= Duration::from_millis(10));

        let no_timeout = Step::new("wait-for-text", "never");
        assert!(f.dispatcher.dispatch(&no_timeout).await.is_err());
    }

    #[tokio::test]
    async fn test_uia_flow_with_explicit_session() {
        let ui = MockUiTree::default()
            .with_element("btnSave", "elem-1")
            .with_text("elem-1", "Save Document")
            .failing_restore();
        let mut f = fixture(MockOcr::default(), ui.clone());

        // nothing attached yet
        assert!(f.dispatcher.dispatch(&Step::new("click-uia", "")).await.is_err());

        f.dispatcher.dispatch(&Step::new("connect-app", "Notepad")).await.unwrap();
        assert_eq!(ui.restored(), 1);

        f.dispatcher.dispatch(&Step::new("find-uia-id", "btnSave")).await.unwrap();
        f.dispatcher.dispatch(&Step::new("click-uia", "")).await.unwrap();
        f.dispatcher.dispatch(&Step::new("type-uia", "hello")).await.unwrap();
        f.dispatcher.dispatch(&Step::new("assert-uia-text", "save doc")).await.unwrap();
        assert!(f
            .dispatcher
            .dispatch(&Step::new("assert-uia-text", "cancel"))
            .await
            .is_err());

        assert_eq!(ui.clicked().len(), 1);
        assert_eq!(ui.typed()[0].1, "hello");
        assert!(f
            .dispatcher
            .dispatch(&Step::new("find-uia-name", "Missing"))
            .await
            .is_err());
        assert!(f.dispatcher.session().element.is_none());
    }

    #[tokio::test]
    async fn test_find_image_requires_known_object() {
        let mut f = fixture(MockOcr::default(), MockUiTree::default());
        let err = f
            .dispatcher
            .dispatch(&Step::new("find-image", "trash can"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not in the knowledge base"));
    }

    #[tokio::test]
    async fn test_find_image_clicks_learned_object() {
        let matcher = MockMatcher::new(vec![hit(7, 9)]);
        let mut f = fixture_with(matcher.clone(), None, MockUiTree::default());
        learn(&f.config, "ok button");

        f.dispatcher.dispatch(&Step::new("find-image", "ok button")).await.unwrap();

        assert_eq!(f.driver.clicks(), vec![Position::new(7, 9)]);
        assert_eq!(matcher.thresholds(), vec![0.9]);
    }

    #[tokio::test]
    async fn test_assert_image_accepts_direct_path_and_heals() {
        let matcher = MockMatcher::new(vec![None, hit(2, 2)]);
        let mut f = fixture_with(matcher.clone(), None, MockUiTree::default());
        let template = f.dir.path().join("logo.png");
        DynamicImage::new_rgb8(3, 3).save(&template).unwrap();

        let step = Step::new("assert-image", template.to_string_lossy().to_string());
        f.dispatcher.dispatch(&step).await.unwrap();

        assert!(f.driver.clicks().is_empty());
        assert_eq!(matcher.thresholds(), vec![0.9, 0.8]);
    }

    #[tokio::test]
    async fn test_wait_for_image_polls_until_found() {
        let matcher = MockMatcher::new(vec![None, None, None, hit(1, 1)]);
        let mut f = fixture_with(matcher.clone(), None, MockUiTree::default());
        learn(&f.config, "spinner done");

        let step = Step::new("wait-for-image", "spinner done").with_timeout(100.0);
        f.dispatcher.dispatch(&step).await.unwrap();

        assert_eq!(matcher.thresholds(), vec![0.9, 0.8, 0.9, 0.8]);
        assert!(f.driver.clicks().is_empty());

        let missing = Step::new("wait-for-image", "spinner done").with_timeout(1.0);
        assert!(f.dispatcher.dispatch(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_text_actions_fail_without_ocr() {
        let mut f = fixture_with(MockMatcher::default(), None, MockUiTree::default());

        let err = f
            .dispatcher
            .dispatch(&Step::new("find-text", "Save"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::Unavailable { .. })
        ));
        assert!(f.driver.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_typing_failure_fails_step() {
        let mut f = fixture(MockOcr::default(), MockUiTree::default());
        f.driver.set_fail_typing(true);
        let err = f
            .dispatcher
            .dispatch(&Step::new("type", "user1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("keyboard unavailable"));
    }

    #[tokio::test]
    async fn test_assert_visuals_baseline_then_pass_then_fail() {
        let mut f = fixture(MockOcr::default(), MockUiTree::default());
        let screen = RgbImage::from_pixel(6, 4, Rgb([90, 90, 90]));
        f.driver.set_screen(DynamicImage::ImageRgb8(screen.clone()));
        let step = Step::new("assert-visuals", "dashboard");

        f.dispatcher.dispatch(&step).await.unwrap();
        assert!(f.config.visual_baselines_dir().join("dashboard.png").is_file());
        f.dispatcher.dispatch(&step).await.unwrap();

        let mut changed = screen;
        changed.put_pixel(0, 0, Rgb([0, 0, 0]));
        f.driver.set_screen(DynamicImage::ImageRgb8(changed));
        let err = f.dispatcher.dispatch(&step).await.unwrap_err();

        assert!(err.to_string().contains("Visual difference on 'dashboard'"));
        assert_eq!(f.driver.captures(), 3);
    }

    #[tokio::test]
    async fn test_huge_wait_sleeps_instead_of_panicking() {
        let mut f = fixture(MockOcr::default(), MockUiTree::default());
        let step = Step::new("wait", "1e300");
        let pending =
            tokio::time::timeout(Duration::from_millis(50), f.dispatcher.dispatch(&step)).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_text_with_huge_timeout() {
        let ocr = MockOcr::new(vec![vec![], vec![], vec![text_fragment("Ready", 3, 3)]]);
        let mut f = fixture(ocr, MockUiTree::default());
        let step = Step::new("wait-for-text", "ready").with_timeout(3e21);

        tokio::time::timeout(Duration::from_secs(5), f.dispatcher.dispatch(&step))
            .await
            .unwrap()
            .unwrap();
    }
}
