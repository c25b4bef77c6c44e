//! Screenshot comparison against a stored per-page baseline

use crate::driver::DesktopDriver;
use crate::error::HarnessError;
use crate::store::VisualBaselines;
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use std::path::PathBuf;

/// Bounding box of differing pixels: x, y, width, height
pub type DiffBox = (u32, u32, u32, u32);

#[derive(Debug, Clone, PartialEq)]
pub enum VisualVerdict {
    /// No baseline existed; the current screen became the baseline
    BaselineCreated(PathBuf),
    Matched,
    /// Same size, differing pixels; current capture and diff saved for review
    Mismatch {
        current: PathBuf,
        diff: PathBuf,
        bbox: DiffBox,
    },
    /// Size changed; only the current capture is saved
    DimensionMismatch {
        current: PathBuf,
        baseline_size: (u32, u32),
        current_size: (u32, u32),
    },
}

impl VisualVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, VisualVerdict::BaselineCreated(_) | VisualVerdict::Matched)
    }
}

pub enum Comparison {
    Identical,
    DimensionMismatch,
    Different { diff: RgbImage, bbox: DiffBox },
}

/// Per-channel absolute difference and the box enclosing every non-zero pixel
pub fn compare(baseline: &RgbImage, current: &RgbImage) -> Comparison {
    if baseline.dimensions() != current.dimensions() {
        return Comparison::DimensionMismatch;
    }

    let (width, height) = baseline.dimensions();
    let mut diff = RgbImage::new(width, height);
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for (x, y, pixel) in diff.enumerate_pixels_mut() {
        let a = baseline.get_pixel(x, y);
        let b = current.get_pixel(x, y);
        *pixel = Rgb([a[0].abs_diff(b[0]), a[1].abs_diff(b[1]), a[2].abs_diff(b[2])]);

        if pixel.0 != [0, 0, 0] {
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }

    match bounds {
        None => Comparison::Identical,
        Some((x0, y0, x1, y1)) => Comparison::Different {
            diff,
            bbox: (x0, y0, x1 - x0 + 1, y1 - y0 + 1),
        },
    }
}

pub struct VisualChecker {
    baselines: VisualBaselines,
}

impl VisualChecker {
    pub fn new(baselines: VisualBaselines) -> Self {
        Self { baselines }
    }

    pub async fn check(&self, driver: &dyn DesktopDriver, page: &str) -> Result<VisualVerdict> {
        if page.trim().is_empty() {
            return Err(HarnessError::InvalidInput("assert-visuals needs a page name".into()).into());
        }

        let baseline_path = self.baselines.path_for(page);
        let current = driver.capture_screen().await?.to_rgb8();

        if !baseline_path.is_file() {
            std::fs::create_dir_all(self.baselines.dir())
                .map_err(|e| HarnessError::persistence(self.baselines.dir(), e))?;
            save(&current, &baseline_path)?;
            log::info!(
                "No visual baseline for '{}'. Saved current screen as baseline.",
                page
            );
            return Ok(VisualVerdict::BaselineCreated(baseline_path));
        }

        let baseline = image::open(&baseline_path)
            .with_context(|| format!("Failed to load baseline {}", baseline_path.display()))?
            .to_rgb8();

        match compare(&baseline, &current) {
            Comparison::Identical => {
                log::info!("Visual check passed for '{}'", page);
                Ok(VisualVerdict::Matched)
            }
            Comparison::DimensionMismatch => {
                let (current_path, _) = self.baselines.failure_paths(page);
                save(&current, &current_path)?;
                log::error!(
                    "Visual check failed for '{}': size {:?} differs from baseline {:?}",
                    page,
                    current.dimensions(),
                    baseline.dimensions()
                );
                Ok(VisualVerdict::DimensionMismatch {
                    current: current_path,
                    baseline_size: baseline.dimensions(),
                    current_size: current.dimensions(),
                })
            }
            Comparison::Different { diff, bbox } => {
                let (current_path, diff_path) = self.baselines.failure_paths(page);
                save(&current, &current_path)?;
                save(&diff, &diff_path)?;
                log::error!(
                    "Visual check failed for '{}': differences in {:?}. See {}",
                    page,
                    bbox,
                    diff_path.display()
                );
                Ok(VisualVerdict::Mismatch {
                    current: current_path,
                    diff: diff_path,
                    bbox,
                })
            }
        }
    }
}

fn save(image: &RgbImage, path: &std::path::Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Failed to save {}", path.display()))
}
