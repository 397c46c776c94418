//! OCR capability backed by the system `tesseract` binary.
//!
//! PDFs are rasterized with `pdftoppm` (poppler-utils) into one PNG per
//! page inside a temporary directory, then each page is OCR'd in order.
//! All calls block; callers run them on `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tempfile::TempDir;

/// Optical character recognition over images and paged documents.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    /// Text of a single image file.
    fn ocr_image(&self, image: &Path) -> Result<String>;
    /// Text of each page of a PDF, in page order.
    fn ocr_pdf(&self, pdf: &Path) -> Result<Vec<String>>;
}

/// Whether `name` resolves on `PATH`.
pub fn check_binary(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub struct TesseractOcr {
    language: String,
    dpi: u32,
}

impl TesseractOcr {
    pub fn new(language: &str, dpi: u32) -> Self {
        Self {
            language: language.to_string(),
            dpi,
        }
    }

    /// `Some` only when both `tesseract` and `pdftoppm` are installed.
    pub fn detect(language: &str, dpi: u32) -> Option<Self> {
        if !check_binary("tesseract") {
            tracing::info!("tesseract not found on PATH, OCR unavailable");
            return None;
        }
        if !check_binary("pdftoppm") {
            tracing::info!("pdftoppm not found on PATH, OCR unavailable");
            return None;
        }
        Some(Self::new(language, dpi))
    }

    fn run_tesseract(&self, image: &Path) -> Result<String> {
        let output = Command::new("tesseract")
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.language])
            .output()
            .context("failed to run tesseract")?;
        if !output.status.success() {
            bail!(
                "tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn rasterize(&self, pdf: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
        let prefix = dir.join("page");
        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &self.dpi.to_string()])
            .arg(pdf)
            .arg(&prefix)
            .status()
            .context("failed to run pdftoppm")?;
        if !status.success() {
            bail!("pdftoppm failed to rasterize {}", pdf.display());
        }

        // pdftoppm zero-pads page numbers to the width of the page count,
        // so a plain name sort is page order.
        let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e == "png"))
            .collect();
        pages.sort();
        Ok(pages)
    }
}

impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn ocr_image(&self, image: &Path) -> Result<String> {
        self.run_tesseract(image)
    }

    fn ocr_pdf(&self, pdf: &Path) -> Result<Vec<String>> {
        let temp_dir = TempDir::new()?;
        let pages = self.rasterize(pdf, temp_dir.path())?;
        tracing::debug!(pages = pages.len(), file = %pdf.display(), "rasterized pdf for OCR");
        pages.iter().map(|p| self.run_tesseract(p)).collect()
    }
}
