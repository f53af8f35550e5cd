//! Command-line entry points.

use std::{sync::Arc, time::Duration};

use clap::Args;

use crate::{
    async_utils::io::read_bytes,
    config::OcrOpts,
    extract::{DocumentExtractor, DocumentFormat, ExtractionResult},
    ocr::ocr_engine_for_opts,
    prelude::*,
    rasterize::PdfToCairoRasterizer,
    ui::Ui,
};

pub mod ask;
pub mod extract;
pub mod render;
pub mod schema;
pub mod simplify;
pub mod speak;

/// Options for commands that read a document.
#[derive(Args, Clone, Debug)]
pub struct DocumentOpts {
    /// Give up on extraction after this many seconds. Ctrl-C also stops
    /// extraction.
    #[clap(long, value_name = "SECONDS")]
    pub deadline: Option<u64>,

    #[clap(flatten)]
    pub ocr: OcrOpts,
}

impl DocumentOpts {
    /// Build an extractor using our configured OCR engine.
    pub async fn extractor(&self, ui: &Ui) -> Result<DocumentExtractor> {
        let ocr = ocr_engine_for_opts(&self.ocr).await?;
        let rasterizer = Arc::new(PdfToCairoRasterizer::from_opts(&self.ocr));
        Ok(DocumentExtractor::new(rasterizer, ocr).with_ui(ui.clone()))
    }

    /// Extract the text of the document at `path`.
    ///
    /// The extension is checked before the file is opened, so unsupported
    /// files fail without being read.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn extract_file(&self, ui: &Ui, path: &Path) -> Result<ExtractionResult> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("cannot get a filename from {:?}", path))?;
        DocumentFormat::from_filename(filename)?;
        let bytes = read_bytes(path).await?;
        let extractor = self.extractor(ui).await?;
        let result = extractor
            .extract_until(&bytes, filename, cancel_signal(self.deadline))
            .await
            .with_context(|| format!("Failed to extract text from {:?}", path))?;
        if result.failed_page_count > 0 {
            warn!(
                failed_page_count = result.failed_page_count,
                "Some pages could not be read; their text is missing"
            );
        }
        Ok(result)
    }
}

/// Completes on Ctrl-C, or once `deadline` seconds have passed.
async fn cancel_signal(deadline: Option<u64>) {
    let interrupted = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        warn!("Interrupted");
    };
    let expired = async {
        match deadline {
            Some(secs) => {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                warn!(seconds = secs, "Deadline reached");
            }
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        () = interrupted => {}
        () = expired => {}
    }
}
