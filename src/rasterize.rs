//! Turning a single PDF page into a PNG image for OCR.

use std::io::Cursor;

use image::{ImageFormat, imageops::FilterType};
use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    config::OcrOpts,
    cpu_limit::with_cpu_semaphore,
    error::ExtractError,
    prelude::*,
};

/// Interface to anything that can render one page of a PDF.
#[async_trait]
pub trait PageRasterizer: Send + Sync + 'static {
    /// Render the page with 0-based index `page_index` as PNG bytes.
    async fn rasterize(
        &self,
        pdf: &[u8],
        page_index: usize,
    ) -> Result<Vec<u8>, ExtractError>;
}

/// Rasterizes pages using Poppler's `pdftocairo` CLI tool.
#[derive(Clone, Debug)]
pub struct PdfToCairoRasterizer {
    dpi: u32,
    max_dimension: u32,
}

impl PdfToCairoRasterizer {
    /// Create a new rasterizer.
    pub fn new(dpi: u32, max_dimension: u32) -> Self {
        Self { dpi, max_dimension }
    }

    /// Create a rasterizer from our OCR options.
    pub fn from_opts(opts: &OcrOpts) -> Self {
        Self::new(opts.rasterize_dpi, opts.max_ocr_image_dimension)
    }

    async fn rasterize_inner(&self, pdf: &[u8], page_index: usize) -> Result<Vec<u8>> {
        let tmpdir = tempfile::TempDir::with_prefix("rasterize")?;
        let pdf_path = tmpdir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, pdf)
            .await
            .with_context(|| format!("failed to write {}", pdf_path.display()))?;

        // With `-singlefile`, pdftocairo appends ".png" to this prefix.
        let out_prefix = tmpdir.path().join("page");
        let page_no = (page_index + 1).to_string();
        let mut cmd = Command::new("pdftocairo");
        cmd.arg("-png")
            .arg("-singlefile")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(&page_no)
            .arg("-l")
            .arg(&page_no)
            .arg(&pdf_path)
            .arg(&out_prefix);

        // pdftocairo will use at least 100% of a CPU.
        let output = with_cpu_semaphore(|| async {
            cmd.output().await.context("failed to run pdftocairo")
        })
        .await?;
        check_for_command_failure("pdftocairo", &output)?;

        let png_path = out_prefix.with_extension("png");
        let png = tokio::fs::read(&png_path)
            .await
            .with_context(|| format!("pdftocairo did not write {}", png_path.display()))?;

        let max_dimension = self.max_dimension;
        spawn_blocking_propagating_panics(move || fit_within(png, max_dimension)).await
    }
}

#[async_trait]
impl PageRasterizer for PdfToCairoRasterizer {
    #[instrument(level = "debug", skip(self, pdf), fields(dpi = self.dpi))]
    async fn rasterize(
        &self,
        pdf: &[u8],
        page_index: usize,
    ) -> Result<Vec<u8>, ExtractError> {
        self.rasterize_inner(pdf, page_index)
            .await
            .map_err(|err| ExtractError::RasterizationFailure(format!("{err:#}")))
    }
}

/// Scale a PNG down so that neither side exceeds `max_dimension`. Images
/// that already fit are returned untouched.
fn fit_within(png: Vec<u8>, max_dimension: u32) -> Result<Vec<u8>> {
    let img = image::load_from_memory_with_format(&png, ImageFormat::Png)
        .context("failed to decode page image")?;
    if img.width() <= max_dimension && img.height() <= max_dimension {
        return Ok(png);
    }
    debug!(
        width = img.width(),
        height = img.height(),
        max_dimension,
        "Downscaling page image"
    );
    let resized = img.resize(max_dimension, max_dimension, FilterType::Triangle);
    let mut out = Cursor::new(Vec::new());
    resized
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to encode page image")?;
    Ok(out.into_inner())
}
