//! Errors produced while extracting text from a document.
//!
//! Callers branch on the variant, not on the message. Page-level variants
//! are normally caught by the extraction pipeline and recorded on the page,
//! so only the document-level variants escape [`crate::extract`].

use thiserror::Error;

/// A failure while extracting text from a document or one of its pages.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The declared filename does not have a supported extension.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The container (PDF, DOCX) could not be opened.
    #[error("could not parse document: {0}")]
    ParseFailure(String),

    /// Plain text was not valid UTF-8.
    #[error("could not decode text as UTF-8: {0}")]
    DecodeFailure(String),

    /// A single page could not be turned into an image.
    #[error("could not rasterize page: {0}")]
    RasterizationFailure(String),

    /// The OCR service refused or never received our image.
    #[error("could not submit image for recognition: {0}")]
    SubmissionFailure(String),

    /// The OCR job was still running after the last allowed poll.
    #[error("text recognition timed out after {attempts} status checks")]
    RecognitionTimeout { attempts: u32 },

    /// The OCR job finished without succeeding.
    #[error("text recognition failed: {0}")]
    RecognitionFailed(String),

    /// No page produced any text, even after OCR.
    #[error("document contains no extractable text")]
    EmptyDocument,

    /// The surrounding request gave up before extraction finished.
    #[error("extraction was cancelled")]
    Cancelled,
}

impl ExtractError {
    /// Does this error only affect a single page?
    ///
    /// Page-level errors are downgraded to a failed page. Everything else
    /// aborts the whole document.
    pub fn is_page_level(&self) -> bool {
        matches!(
            self,
            ExtractError::RasterizationFailure(_)
                | ExtractError::SubmissionFailure(_)
                | ExtractError::RecognitionTimeout { .. }
                | ExtractError::RecognitionFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_errors_are_page_level() {
        assert!(ExtractError::RasterizationFailure("x".to_owned()).is_page_level());
        assert!(ExtractError::SubmissionFailure("x".to_owned()).is_page_level());
        assert!(ExtractError::RecognitionTimeout { attempts: 30 }.is_page_level());
        assert!(ExtractError::RecognitionFailed("failed".to_owned()).is_page_level());
    }

    #[test]
    fn document_errors_are_not_page_level() {
        assert!(!ExtractError::UnsupportedFormat(".xlsx".to_owned()).is_page_level());
        assert!(!ExtractError::ParseFailure("x".to_owned()).is_page_level());
        assert!(!ExtractError::DecodeFailure("x".to_owned()).is_page_level());
        assert!(!ExtractError::EmptyDocument.is_page_level());
        assert!(!ExtractError::Cancelled.is_page_level());
    }
}
