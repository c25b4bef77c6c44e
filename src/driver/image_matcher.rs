//! Template matching for the image locator
//!
//! Screens are downscaled to a fixed working width before normalized
//! cross-correlation, which keeps a full-HD search in the tens of
//! milliseconds. Coordinates are mapped back to the original screen.

use anyhow::Result;
use image::imageops::FilterType;
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::template_matching::{match_template, MatchTemplateMethod};

/// Width the screen is scaled down to before matching
pub const DEFAULT_TARGET_WIDTH: f32 = 220.0;

/// Best match of a template on screen
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Center of the matched area in screen coordinates
    pub x: i32,
    pub y: i32,
    /// Normalized correlation score (0.0 - 1.0)
    pub confidence: f32,
}

/// Search for a template on a screen capture at a given confidence
pub trait TemplateMatcher: Send + Sync {
    fn find(
        &self,
        screen: &GrayImage,
        template: &GrayImage,
        threshold: f32,
    ) -> Result<Option<MatchResult>>;
}

/// Normalized cross-correlation matcher
#[derive(Debug, Clone)]
pub struct NccMatcher {
    pub target_width: f32,
}

impl Default for NccMatcher {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
        }
    }
}

impl TemplateMatcher for NccMatcher {
    fn find(
        &self,
        screen: &GrayImage,
        template: &GrayImage,
        threshold: f32,
    ) -> Result<Option<MatchResult>> {
        find_template(screen, template, self.target_width, threshold)
    }
}

/// Find the best match of `template` in `screen`.
///
/// Returns `None` when the template does not fit or the best score is below
/// `threshold`.
pub fn find_template(
    screen: &GrayImage,
    template: &GrayImage,
    target_width: f32,
    threshold: f32,
) -> Result<Option<MatchResult>> {
    if template.width() == 0 || template.height() == 0 {
        anyhow::bail!("Template image is empty");
    }
    if template.width() > screen.width() || template.height() > screen.height() {
        return Ok(None);
    }

    let scale = (target_width / screen.width() as f32).min(1.0);

    let (loc, score) = if scale < 1.0 {
        let screen_w = ((screen.width() as f32 * scale) as u32).max(1);
        let screen_h = ((screen.height() as f32 * scale) as u32).max(1);
        let tpl_w = ((template.width() as f32 * scale).max(3.0) as u32).min(screen_w);
        let tpl_h = ((template.height() as f32 * scale).max(3.0) as u32).min(screen_h);

        let small_screen = image::imageops::resize(screen, screen_w, screen_h, FilterType::Nearest);
        let small_template = image::imageops::resize(template, tpl_w, tpl_h, FilterType::Nearest);

        let scores = match_template(
            &small_screen,
            &small_template,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );
        let ((x, y), score) = find_max(&scores);
        (((x as f32 / scale) as i32, (y as f32 / scale) as i32), score)
    } else {
        let scores = match_template(
            screen,
            template,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );
        let ((x, y), score) = find_max(&scores);
        ((x as i32, y as i32), score)
    };

    if score < threshold {
        return Ok(None);
    }

    Ok(Some(MatchResult {
        x: loc.0 + template.width() as i32 / 2,
        y: loc.1 + template.height() as i32 / 2,
        confidence: score,
    }))
}

fn find_max(scores: &ImageBuffer<Luma<f32>, Vec<f32>>) -> ((u32, u32), f32) {
    let mut best = ((0u32, 0u32), f32::MIN);
    for (x, y, pixel) in scores.enumerate_pixels() {
        if pixel[0] > best.1 {
            best = ((x, y), pixel[0]);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise_screen(width: u32, height: u32) -> GrayImage {
        let mut seed: u32 = 0x2545_f491;
        GrayImage::from_fn(width, height, |_, _| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            Luma([(seed & 0xff) as u8])
        })
    }

    #[test]
    fn test_finds_template_center() {
        let screen = noise_screen(120, 80);
        let template = image::imageops::crop_imm(&screen, 40, 20, 16, 12).to_image();

        let found = find_template(&screen, &template, DEFAULT_TARGET_WIDTH, 0.9)
            .unwrap()
            .expect("template should be found");

        assert_eq!((found.x, found.y), (48, 26));
        assert!(found.confidence > 0.99);
    }

    #[test]
    fn test_template_larger_than_screen() {
        let screen = noise_screen(10, 10);
        let template = noise_screen(20, 5);
        assert!(find_template(&screen, &template, DEFAULT_TARGET_WIDTH, 0.1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_threshold_rejects_weak_match() {
        let screen = noise_screen(60, 40);
        let template = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 0 } else { 255 }]));
        let found = find_template(&screen, &template, DEFAULT_TARGET_WIDTH, 0.999).unwrap();
        assert!(found.is_none());
    }
}
