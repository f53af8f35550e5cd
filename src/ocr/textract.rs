//! OCR using AWS Textract.
//!
//! `DetectDocumentText` is synchronous for single images, so there is no
//! job to poll. Textract returns `LINE` blocks in reading order, which is
//! all we need.

use aws_config::BehaviorVersion;
use aws_sdk_textract::{
    primitives::Blob,
    types::{Block, BlockType, Document},
};

use crate::{error::ExtractError, prelude::*};

use super::OcrEngine;

/// OCR engine wrapping the AWS Textract API.
pub struct TextractOcrEngine {
    client: aws_sdk_textract::Client,
}

impl TextractOcrEngine {
    /// Create a new engine using the standard AWS credential chain.
    pub async fn new() -> Result<Self> {
        let config = aws_config::load_defaults(BehaviorVersion::v2025_01_17()).await;
        let client = aws_sdk_textract::Client::new(&config);
        Ok(Self { client })
    }
}

#[async_trait]
impl OcrEngine for TextractOcrEngine {
    #[instrument(level = "debug", skip_all, fields(image_bytes = image.len()))]
    async fn recognize(&self, image: &[u8]) -> Result<String, ExtractError> {
        let document = Document::builder().bytes(Blob::new(image.to_vec())).build();
        let response = self
            .client
            .detect_document_text()
            .document(document)
            .send()
            .await
            .map_err(|err| {
                ExtractError::SubmissionFailure(format!("AWS Textract error: {err:?}"))
            })?;
        trace!("Textract response: {response:#?}");
        let text = text_from_blocks(response.blocks());
        debug!(chars = text.len(), "Recognized text");
        Ok(text)
    }
}

/// Join the text of all `LINE` blocks, in the order Textract returned them.
fn text_from_blocks(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter(|block| block.block_type() == Some(&BlockType::Line))
        .filter_map(|block| block.text())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(block_type: BlockType, text: &str) -> Block {
        Block::builder().block_type(block_type).text(text).build()
    }

    #[test]
    fn keeps_only_lines_in_order() {
        let blocks = vec![
            Block::builder().block_type(BlockType::Page).build(),
            block(BlockType::Line, "First line"),
            block(BlockType::Word, "First"),
            block(BlockType::Word, "line"),
            block(BlockType::Line, "Second line"),
        ];
        assert_eq!(text_from_blocks(&blocks), "First line\nSecond line");
    }

    #[test]
    fn no_lines_means_no_text() {
        let blocks = vec![Block::builder().block_type(BlockType::Page).build()];
        assert_eq!(text_from_blocks(&blocks), "");
    }
}
