//! OCR backends for the text locator
//!
//! - Linux/macOS: Tesseract CLI (TSV output, line-grouped)
//! - Windows: Windows.Media.Ocr via PowerShell, Tesseract when installed

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// A recognized line of text
#[derive(Debug, Clone, PartialEq)]
pub struct OcrMatch {
    pub text: String,
    /// Center of the bounding box
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
}

/// Recognize text fragments in a PNG-encoded capture.
///
/// Fragments are returned in the order the backend reports them.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, png: &[u8]) -> Result<Vec<OcrMatch>>;
}

#[derive(Debug, Clone)]
enum OcrBackend {
    Tesseract { binary: PathBuf, language: String },
    WindowsOcr,
}

/// OCR engine selected from what the host provides
#[derive(Debug, Clone)]
pub struct OcrEngine {
    backend: OcrBackend,
}

impl OcrEngine {
    /// Pick an available backend, or `None` when the host has no OCR
    pub fn detect(language: &str) -> Option<Self> {
        if let Ok(binary) = which::which("tesseract") {
            return Some(Self {
                backend: OcrBackend::Tesseract {
                    binary,
                    language: language.to_string(),
                },
            });
        }
        if cfg!(target_os = "windows") {
            return Some(Self {
                backend: OcrBackend::WindowsOcr,
            });
        }
        log::warn!("Tesseract not found. Text actions are disabled.");
        None
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            OcrBackend::Tesseract { .. } => "tesseract",
            OcrBackend::WindowsOcr => "windows-ocr",
        }
    }

    fn run_tesseract(&self, binary: &Path, language: &str, image_path: &Path) -> Result<Vec<OcrMatch>> {
        let output = Command::new(binary)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", language, "--psm", "3", "tsv"])
            .output()
            .context("Failed to run tesseract")?;

        if !output.status.success() {
            anyhow::bail!(
                "Tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(parse_tesseract_tsv(&String::from_utf8_lossy(&output.stdout)))
    }

    fn run_windows_ocr(&self, image_path: &Path) -> Result<Vec<OcrMatch>> {
        let script = format!(
            r#"
Add-Type -AssemblyName System.Runtime.WindowsRuntime
$null = [Windows.Media.Ocr.OcrEngine,Windows.Foundation.UniversalApiContract,ContentType=WindowsRuntime]
$null = [Windows.Graphics.Imaging.BitmapDecoder,Windows.Foundation.UniversalApiContract,ContentType=WindowsRuntime]
$null = [Windows.Storage.StorageFile,Windows.Foundation.UniversalApiContract,ContentType=WindowsRuntime]
$file = [Windows.Storage.StorageFile]::GetFileFromPathAsync('{}').GetAwaiter().GetResult()
$stream = $file.OpenAsync([Windows.Storage.FileAccessMode]::Read).GetAwaiter().GetResult()
$decoder = [Windows.Graphics.Imaging.BitmapDecoder]::CreateAsync($stream).GetAwaiter().GetResult()
$bitmap = $decoder.GetSoftwareBitmapAsync().GetAwaiter().GetResult()
$engine = [Windows.Media.Ocr.OcrEngine]::TryCreateFromUserProfileLanguages()
$result = $engine.RecognizeAsync($bitmap).GetAwaiter().GetResult()
foreach ($line in $result.Lines) {{
    $words = ($line.Words | ForEach-Object {{ $_.Text }}) -join ' '
    $rect = $line.Words[0].BoundingRect
    Write-Output "$words`t$([int]$rect.X)`t$([int]$rect.Y)`t$([int]$rect.Width)`t$([int]$rect.Height)"
}}
"#,
            image_path.to_string_lossy().replace('\'', "''")
        );

        let output = Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .output()
            .context("Failed to run Windows OCR")?;

        if !output.status.success() {
            anyhow::bail!(
                "Windows OCR failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(parse_line_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl TextRecognizer for OcrEngine {
    fn recognize(&self, png: &[u8]) -> Result<Vec<OcrMatch>> {
        let start = Instant::now();
        let temp_path = std::env::temp_dir().join(format!("harness_ocr_{}.png", uuid::Uuid::new_v4()));
        std::fs::write(&temp_path, png)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;

        let lines = match &self.backend {
            OcrBackend::Tesseract { binary, language } => {
                self.run_tesseract(binary, language, &temp_path)
            }
            OcrBackend::WindowsOcr => self.run_windows_ocr(&temp_path),
        };

        if let Err(e) = std::fs::remove_file(&temp_path) {
            log::warn!("Failed to remove {} (ignored): {}", temp_path.display(), e);
        }

        let lines = lines?;
        log::debug!(
            "OCR ({}) found {} lines in {}ms",
            self.backend_name(),
            lines.len(),
            start.elapsed().as_millis()
        );
        Ok(lines)
    }
}

struct Word {
    text: String,
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    conf: f32,
}

/// Group Tesseract TSV words into lines, keeping first-seen line order
fn parse_tesseract_tsv(tsv: &str) -> Vec<OcrMatch> {
    let mut groups: Vec<((i32, i32, i32), Vec<Word>)> = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let text = cols[11].trim();
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let num = |i: usize| cols[i].trim().parse::<i32>().unwrap_or(0);
        let key = (num(2), num(3), num(4));
        let word = Word {
            text: text.to_string(),
            left: num(6),
            top: num(7),
            width: num(8),
            height: num(9),
            conf,
        };

        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, words)) => words.push(word),
            None => groups.push((key, vec![word])),
        }
    }

    groups
        .into_iter()
        .map(|(_, words)| {
            let left = words.iter().map(|w| w.left).min().unwrap_or(0);
            let top = words.iter().map(|w| w.top).min().unwrap_or(0);
            let right = words.iter().map(|w| w.left + w.width).max().unwrap_or(0);
            let bottom = words.iter().map(|w| w.top + w.height).max().unwrap_or(0);
            let text = words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            OcrMatch {
                text,
                x: (left + right) / 2,
                y: (top + bottom) / 2,
                width: (right - left).max(0) as u32,
                height: (bottom - top).max(0) as u32,
                confidence: words.iter().map(|w| w.conf).sum::<f32>() / words.len() as f32 / 100.0,
            }
        })
        .collect()
}

/// `text\tx\ty\twidth\theight` per line; the backend reports no confidence
fn parse_line_tsv(output: &str) -> Vec<OcrMatch> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 5 {
                return None;
            }
            let num = |i: usize| parts[i].trim().parse::<i32>().unwrap_or(0);
            let (x, y, width, height) = (num(1), num(2), num(3).max(0), num(4).max(0));
            Some(OcrMatch {
                text: parts[0].to_string(),
                x: x + width / 2,
                y: y + height / 2,
                width: width as u32,
                height: height as u32,
                confidence: 1.0,
            })
        })
        .collect()
}
