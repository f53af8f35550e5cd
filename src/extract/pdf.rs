//! Reading the embedded text layer of a PDF.

use lopdf::Document;

use crate::{error::ExtractError, prelude::*};

/// A parsed PDF. Page text is pulled out one page at a time, on demand.
pub struct PdfText {
    doc: Document,
}

impl PdfText {
    /// Parse a PDF. This is CPU-bound, so call it from a blocking task.
    pub fn load(bytes: &[u8]) -> Result<Self, ExtractError> {
        let doc = Document::load_mem(bytes)
            .map_err(|err| ExtractError::ParseFailure(format!("invalid PDF: {err}")))?;
        if doc.is_encrypted() {
            warn!("PDF is encrypted; its text layer may be unreadable");
        }
        Ok(Self { doc })
    }

    /// 1-based page numbers, in page order.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.doc.get_pages().into_keys().collect()
    }

    /// The embedded text of a single page, or an empty string if the page has
    /// no usable text layer. Unreadable content streams are treated as empty,
    /// so that the page falls back to OCR.
    pub fn page_text(&self, page_number: u32) -> String {
        match self.doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(err) => {
                warn!(page_number, %err, "Cannot read text layer; treating page as empty");
                String::new()
            }
        }
    }
}
