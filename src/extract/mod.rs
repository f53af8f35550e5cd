//! The text-extraction pipeline.
//!
//! Given document bytes and a filename, we pick a format from the extension,
//! parse the container, and produce one [`Page`] per unit of text. For PDFs
//! each page first tries its embedded text layer. Pages without one are
//! rasterized and sent to OCR. Pages are processed strictly in order, one at
//! a time, and a page that cannot be recognized is recorded as failed rather
//! than aborting the whole document.

use std::{fmt, sync::Arc};

use indicatif::ProgressBar;
use schemars::JsonSchema;

use crate::{
    async_utils::spawn_blocking_propagating_panics,
    error::ExtractError,
    ocr::OcrEngine,
    prelude::*,
    rasterize::PageRasterizer,
    ui::{ProgressConfig, Ui},
};

use self::pdf::PdfText;

pub mod docx;
pub mod pdf;

/// The document formats we accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
}

impl DocumentFormat {
    /// Choose a format from a filename's extension, ignoring case. The
    /// document's contents are never consulted.
    pub fn from_filename(filename: &str) -> Result<Self, ExtractError> {
        let unsupported = || ExtractError::UnsupportedFormat(filename.to_owned());
        let ext = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(unsupported)?
            .to_ascii_lowercase();
        let mime = mime_guess::from_ext(&ext).first().ok_or_else(unsupported)?;
        match (ext.as_str(), mime.essence_str()) {
            ("pdf", "application/pdf") => Ok(DocumentFormat::Pdf),
            (
                "docx",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ) => Ok(DocumentFormat::Docx),
            ("txt", "text/plain") => Ok(DocumentFormat::Txt),
            _ => Err(unsupported()),
        }
    }

    /// Warn if the content doesn't look like what the extension promised.
    /// The extension still decides how we parse.
    fn warn_on_content_mismatch(self, bytes: &[u8]) {
        let Some(kind) = infer::get(bytes) else {
            if self != DocumentFormat::Txt {
                warn!(format = %self, "Cannot recognize document contents");
            }
            return;
        };
        let plausible = match self {
            DocumentFormat::Pdf => kind.mime_type() == "application/pdf",
            DocumentFormat::Docx => matches!(
                kind.mime_type(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    | "application/zip"
            ),
            DocumentFormat::Txt => false,
        };
        if !plausible {
            warn!(
                format = %self,
                detected = kind.mime_type(),
                "Document contents do not match its extension"
            );
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Txt => "txt",
        };
        f.write_str(name)
    }
}

/// Where a page's text comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSource {
    /// A 1-based page of the parsed PDF. Its text stays in the PDF until
    /// the page is processed.
    PdfPage(u32),
    /// The whole document, which has no page structure.
    WholeDocument,
}

/// What happened to a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageOutcome {
    DirectText(String),
    NeedsRecognition,
    RecognizedText(String),
    Failed(String),
}

/// A single page of a document.
#[derive(Clone, Debug)]
pub struct Page {
    pub index: usize,
    pub source: PageSource,
    outcome: Option<PageOutcome>,
}

impl Page {
    fn new(index: usize, source: PageSource) -> Self {
        Self {
            index,
            source,
            outcome: None,
        }
    }

    /// Is `next` a legal successor to our current outcome?
    ///
    /// Outcomes are written once, except that `NeedsRecognition` is
    /// replaced by the result of recognition.
    fn can_advance_to(&self, next: &PageOutcome) -> bool {
        use PageOutcome::*;
        matches!(
            (&self.outcome, next),
            (None, DirectText(_) | NeedsRecognition)
                | (Some(NeedsRecognition), RecognizedText(_) | Failed(_))
        )
    }

    fn record(&mut self, next: PageOutcome) {
        debug_assert!(
            self.can_advance_to(&next),
            "illegal page transition on page {}: {:?} -> {:?}",
            self.index,
            self.outcome,
            next
        );
        self.outcome = Some(next);
    }

    /// The text this page contributes to the result.
    fn resolved_text(&self) -> Option<&str> {
        match &self.outcome {
            Some(PageOutcome::DirectText(text) | PageOutcome::RecognizedText(text)) => {
                Some(text)
            }
            _ => None,
        }
    }

    fn is_failed(&self) -> bool {
        matches!(self.outcome, Some(PageOutcome::Failed(_)))
    }
}

/// A parsed document. Lives only for the duration of one extraction.
#[derive(Clone, Debug)]
pub struct Document {
    pub format: DocumentFormat,
    pub pages: Vec<Page>,
}

impl Document {
    /// A document with no page structure, whose text is already known.
    fn single_page(format: DocumentFormat, text: String) -> Self {
        let mut page = Page::new(0, PageSource::WholeDocument);
        page.record(PageOutcome::DirectText(text));
        Self {
            format,
            pages: vec![page],
        }
    }

    /// Join resolved pages in index order.
    fn into_result(self) -> Result<ExtractionResult, ExtractError> {
        let failed_page_count = self.pages.iter().filter(|page| page.is_failed()).count();
        let text = self
            .pages
            .iter()
            .filter_map(Page::resolved_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_owned();
        if text.is_empty() {
            debug!(format = %self.format, pages = self.pages.len(), "No text in document");
            return Err(ExtractError::EmptyDocument);
        }
        Ok(ExtractionResult {
            text,
            failed_page_count,
        })
    }
}

/// The text of a document.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    /// Page texts in page order, separated by newlines.
    pub text: String,
    /// How many pages could not be recognized. Their text is missing from
    /// `text`.
    pub failed_page_count: usize,
}

/// Extracts text from documents, using OCR for PDF pages with no text layer.
pub struct DocumentExtractor {
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<dyn OcrEngine>,
    ui: Option<Ui>,
}

impl DocumentExtractor {
    /// Create a new extractor.
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            rasterizer,
            ocr,
            ui: None,
        }
    }

    /// Show a page progress bar while extracting PDFs.
    pub fn with_ui(mut self, ui: Ui) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Extract the text of a document.
    #[instrument(level = "debug", skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn extract(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ExtractionResult, ExtractError> {
        let format = DocumentFormat::from_filename(filename)?;
        format.warn_on_content_mismatch(bytes);
        let document = match format {
            DocumentFormat::Pdf => self.extract_pdf(bytes).await?,
            DocumentFormat::Docx => {
                let owned = bytes.to_vec();
                let text =
                    spawn_blocking_propagating_panics(move || docx::docx_text(&owned))
                        .await?;
                Document::single_page(format, text)
            }
            DocumentFormat::Txt => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|err| ExtractError::DecodeFailure(err.to_string()))?;
                Document::single_page(format, text.trim().to_owned())
            }
        };
        let result = document.into_result()?;
        debug!(
            chars = result.text.len(),
            failed_page_count = result.failed_page_count,
            "Extracted document"
        );
        Ok(result)
    }

    /// Like [`Self::extract`], but give up with [`ExtractError::Cancelled`] as
    /// soon as `cancel` completes. Any in-flight OCR polling is abandoned.
    pub async fn extract_until<C>(
        &self,
        bytes: &[u8],
        filename: &str,
        cancel: C,
    ) -> Result<ExtractionResult, ExtractError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancel => {
                warn!(filename, "Extraction cancelled");
                Err(ExtractError::Cancelled)
            }
            result = self.extract(bytes, filename) => result,
        }
    }

    async fn extract_pdf(&self, bytes: &[u8]) -> Result<Document, ExtractError> {
        let owned = bytes.to_vec();
        let pdf =
            spawn_blocking_propagating_panics(move || PdfText::load(&owned)).await?;
        let pdf = Arc::new(pdf);

        let pages = pdf
            .page_numbers()
            .into_iter()
            .enumerate()
            .map(|(index, page_number)| Page::new(index, PageSource::PdfPage(page_number)))
            .collect::<Vec<_>>();
        let mut document = Document {
            format: DocumentFormat::Pdf,
            pages,
        };
        debug!(pages = document.pages.len(), "Parsed PDF");

        let progress = self.page_progress_bar(document.pages.len());
        for page in &mut document.pages {
            self.resolve_pdf_page(&pdf, bytes, page).await?;
            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }
        Ok(document)
    }

    fn page_progress_bar(&self, page_count: usize) -> Option<ProgressBar> {
        // Single pages aren't worth a progress bar.
        if page_count < 2 {
            return None;
        }
        let ui = self.ui.as_ref()?;
        Some(ui.new_progress_bar(
            &ProgressConfig {
                emoji: "📄",
                msg: "Extracting pages",
                done_msg: "Extracted pages",
            },
            page_count as u64,
        ))
    }

    /// Decide between the text layer and OCR for one PDF page.
    #[instrument(level = "debug", skip_all, fields(page = page.index))]
    async fn resolve_pdf_page(
        &self,
        pdf: &Arc<PdfText>,
        bytes: &[u8],
        page: &mut Page,
    ) -> Result<(), ExtractError> {
        let PageSource::PdfPage(page_number) = page.source else {
            return Ok(());
        };

        let pdf = pdf.clone();
        let direct =
            spawn_blocking_propagating_panics(move || pdf.page_text(page_number)).await;
        let direct = direct.trim();
        if !direct.is_empty() {
            debug!(chars = direct.len(), "Using embedded text");
            page.record(PageOutcome::DirectText(direct.to_owned()));
            return Ok(());
        }

        info!("Page has no text layer; falling back to OCR");
        page.record(PageOutcome::NeedsRecognition);
        let outcome = match self.recognize_page(bytes, page.index).await {
            Ok(text) if !text.trim().is_empty() => {
                PageOutcome::RecognizedText(text.trim().to_owned())
            }
            Ok(_) => {
                warn!("OCR found no text on page");
                PageOutcome::Failed("no text was recognized".to_owned())
            }
            Err(err) if err.is_page_level() => {
                warn!(%err, "Page failed");
                PageOutcome::Failed(err.to_string())
            }
            Err(err) => return Err(err),
        };
        page.record(outcome);
        Ok(())
    }

    async fn recognize_page(
        &self,
        bytes: &[u8],
        page_index: usize,
    ) -> Result<String, ExtractError> {
        let image = self.rasterizer.rasterize(bytes, page_index).await?;
        self.ocr.recognize(&image).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use super::*;
    use crate::{
        ocr::{JobStatus, OcrClient, PollSettings, ReadBackend, ReadStatus},
        render::render_pdf,
    };

    /// Returns a fake "image" naming the page it came from.
    #[derive(Default)]
    struct FakeRasterizer {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl PageRasterizer for FakeRasterizer {
        async fn rasterize(
            &self,
            _pdf: &[u8],
            page_index: usize,
        ) -> Result<Vec<u8>, ExtractError> {
            self.calls.lock().unwrap().push(page_index);
            Ok(format!("page-{page_index}").into_bytes())
        }
    }

    /// Maps fake images to canned results. Unknown images recognize as "".
    #[derive(Default)]
    struct FakeOcr {
        results: HashMap<Vec<u8>, Result<String, ExtractError>>,
        calls: AtomicU32,
    }

    impl FakeOcr {
        fn with(mut self, page_index: usize, result: Result<&str, ExtractError>) -> Self {
            self.results.insert(
                format!("page-{page_index}").into_bytes(),
                result.map(str::to_owned),
            );
            self
        }
    }

    #[async_trait]
    impl OcrEngine for FakeOcr {
        async fn recognize(&self, image: &[u8]) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.get(image).cloned().unwrap_or_else(|| Ok(String::new()))
        }
    }

    /// A remote job that never finishes.
    struct NeverFinishes;

    #[async_trait]
    impl ReadBackend for NeverFinishes {
        async fn submit(&self, _image: &[u8]) -> Result<String, ExtractError> {
            Ok("op-1".to_owned())
        }

        async fn fetch(&self, _operation_id: &str) -> Result<ReadStatus, ExtractError> {
            Ok(ReadStatus {
                status: JobStatus::Running,
                lines: vec![],
            })
        }
    }

    /// Accepts images, then never answers a status request.
    struct StallsOnFetch;

    #[async_trait]
    impl ReadBackend for StallsOnFetch {
        async fn submit(&self, _image: &[u8]) -> Result<String, ExtractError> {
            Ok("op-2".to_owned())
        }

        async fn fetch(&self, _operation_id: &str) -> Result<ReadStatus, ExtractError> {
            std::future::pending().await
        }
    }

    fn extractor(
        rasterizer: &Arc<FakeRasterizer>,
        ocr: &Arc<FakeOcr>,
    ) -> DocumentExtractor {
        DocumentExtractor::new(rasterizer.clone(), ocr.clone())
    }

    #[tokio::test]
    async fn all_text_pdf_never_calls_ocr() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(FakeOcr::default());
        let pdf = render_pdf("Alpha\x0cBeta\x0cGamma").unwrap();

        let result = extractor(&rasterizer, &ocr)
            .extract(&pdf, "doc.pdf")
            .await
            .unwrap();
        assert_eq!(result.text, "Alpha\nBeta\nGamma");
        assert_eq!(result.failed_page_count, 0);
        assert!(rasterizer.calls.lock().unwrap().is_empty());
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_page_is_recognized_in_order() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(FakeOcr::default().with(1, Ok("World")));
        let pdf = render_pdf("Hello\x0c\x0cGoodbye").unwrap();

        let result = extractor(&rasterizer, &ocr)
            .extract(&pdf, "scan.pdf")
            .await
            .unwrap();
        assert_eq!(result.text, "Hello\nWorld\nGoodbye");
        assert_eq!(result.failed_page_count, 0);
        assert_eq!(*rasterizer.calls.lock().unwrap(), vec![1]);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_page_fails_alone() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(OcrClient::new(NeverFinishes, PollSettings::default()));
        let pdf = render_pdf("Hello\x0c\x0cGoodbye").unwrap();

        let result = DocumentExtractor::new(rasterizer.clone(), ocr)
            .extract(&pdf, "scan.pdf")
            .await
            .unwrap();
        assert_eq!(result.text, "Hello\nGoodbye");
        assert_eq!(result.failed_page_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_status_request_fails_only_that_page() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(OcrClient::new(StallsOnFetch, PollSettings::default()));
        let pdf = render_pdf("Hello\x0c\x0cGoodbye").unwrap();

        let result = DocumentExtractor::new(rasterizer, ocr)
            .extract(&pdf, "scan.pdf")
            .await
            .unwrap();
        assert_eq!(result.text, "Hello\nGoodbye");
        assert_eq!(result.failed_page_count, 1);
    }

    #[tokio::test]
    async fn page_level_errors_become_failed_pages() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(
            FakeOcr::default()
                .with(0, Err(ExtractError::SubmissionFailure("403".to_owned())))
                .with(2, Err(ExtractError::RecognitionFailed("failed".to_owned()))),
        );
        let pdf = render_pdf("\x0cMiddle\x0c").unwrap();

        let result = extractor(&rasterizer, &ocr)
            .extract(&pdf, "scan.pdf")
            .await
            .unwrap();
        assert_eq!(result.text, "Middle");
        assert_eq!(result.failed_page_count, 2);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_up_front() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(FakeOcr::default());

        let err = extractor(&rasterizer, &ocr)
            .extract(b"", "report.xlsx")
            .await
            .unwrap_err();
        assert_eq!(err, ExtractError::UnsupportedFormat("report.xlsx".to_owned()));
        assert!(rasterizer.calls.lock().unwrap().is_empty());
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn image_only_pdf_with_no_recognized_text_is_empty() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(FakeOcr::default().with(0, Ok("  ")));
        let pdf = render_pdf("").unwrap();

        let err = extractor(&rasterizer, &ocr)
            .extract(&pdf, "blank.pdf")
            .await
            .unwrap_err();
        assert_eq!(err, ExtractError::EmptyDocument);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn extraction_is_repeatable() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(FakeOcr::default().with(1, Ok("World")));
        let pdf = render_pdf("Hello\x0c\x0cGoodbye").unwrap();
        let extractor = extractor(&rasterizer, &ocr);

        let first = extractor.extract(&pdf, "a.pdf").await.unwrap();
        let second = extractor.extract(&pdf, "a.pdf").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn extensions_are_case_insensitive() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(FakeOcr::default());
        let pdf = render_pdf("Shouting").unwrap();

        let result = extractor(&rasterizer, &ocr)
            .extract(&pdf, "LOUD.PDF")
            .await
            .unwrap();
        assert_eq!(result.text, "Shouting");
    }

    #[tokio::test]
    async fn corrupt_pdf_is_a_parse_failure() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(FakeOcr::default());

        let err = extractor(&rasterizer, &ocr)
            .extract(b"this is not a pdf", "broken.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ParseFailure(_)), "{err:?}");
    }

    #[tokio::test]
    async fn docx_paragraphs_are_extracted_without_ocr() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(FakeOcr::default());
        let docx = docx::docx_from_body(
            "<w:p><w:r><w:t>First</w:t></w:r></w:p><w:p><w:r><w:t>Second</w:t></w:r></w:p>",
        );

        let result = extractor(&rasterizer, &ocr)
            .extract(&docx, "memo.docx")
            .await
            .unwrap();
        assert_eq!(result.text, "First\nSecond");
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn text_files_must_be_utf8() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(FakeOcr::default());
        let extractor = extractor(&rasterizer, &ocr);

        let result = extractor.extract(b"  plain words \n", "notes.txt").await.unwrap();
        assert_eq!(result.text, "plain words");

        let err = extractor.extract(b"caf\xe9", "notes.txt").await.unwrap_err();
        assert!(matches!(err, ExtractError::DecodeFailure(_)));

        let err = extractor.extract(b"   \n", "notes.txt").await.unwrap_err();
        assert_eq!(err, ExtractError::EmptyDocument);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_polling() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let ocr = Arc::new(OcrClient::new(NeverFinishes, PollSettings::default()));
        let pdf = render_pdf("Hello\x0c\x0cGoodbye").unwrap();
        let extractor = DocumentExtractor::new(rasterizer, ocr);

        let start = tokio::time::Instant::now();
        let err = extractor
            .extract_until(&pdf, "scan.pdf", tokio::time::sleep(Duration::from_secs(3)))
            .await
            .unwrap_err();
        assert_eq!(err, ExtractError::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn page_outcomes_are_write_once() {
        let mut page = Page::new(0, PageSource::PdfPage(1));
        assert!(page.can_advance_to(&PageOutcome::NeedsRecognition));
        assert!(!page.can_advance_to(&PageOutcome::RecognizedText("x".to_owned())));

        page.record(PageOutcome::NeedsRecognition);
        assert!(page.can_advance_to(&PageOutcome::Failed("x".to_owned())));
        assert!(!page.can_advance_to(&PageOutcome::DirectText("x".to_owned())));

        page.record(PageOutcome::RecognizedText("x".to_owned()));
        assert!(!page.can_advance_to(&PageOutcome::Failed("x".to_owned())));
        assert_eq!(page.resolved_text(), Some("x"));

        let mut direct = Page::new(1, PageSource::PdfPage(2));
        direct.record(PageOutcome::DirectText("y".to_owned()));
        assert!(!direct.can_advance_to(&PageOutcome::NeedsRecognition));
    }

    #[test]
    fn formats_come_from_extensions() {
        assert_eq!(DocumentFormat::from_filename("a.pdf"), Ok(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_filename("a.Docx"), Ok(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_filename("dir/a.TXT"), Ok(DocumentFormat::Txt));
        assert!(DocumentFormat::from_filename("README").is_err());
        assert!(DocumentFormat::from_filename("a.doc").is_err());
    }
}
