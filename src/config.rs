//! Command-line and environment configuration.
//!
//! These structs are built once in `main` and passed down by reference.
//! Nothing here is mutated after startup.

use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::{drivers::DriverType, ocr::PollSettings};

/// Which OCR service to use for pages without a text layer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum OcrEngineType {
    /// Azure Computer Vision "Read" API.
    #[default]
    Azure,
    /// AWS Textract `DetectDocumentText`.
    Textract,
}

/// Options controlling rasterization and OCR.
#[derive(Args, Clone)]
pub struct OcrOpts {
    /// The OCR service to use for image-only pages.
    #[clap(long, value_enum, default_value_t = OcrEngineType::default())]
    pub ocr_engine: OcrEngineType,

    /// Resolution used when converting a PDF page to an image.
    #[clap(long, default_value = "300")]
    pub rasterize_dpi: u32,

    /// How long to wait, in seconds, for a single page to be recognized.
    #[clap(long, default_value = "30")]
    pub ocr_timeout: u64,

    /// Delay between OCR status checks, in milliseconds.
    #[clap(long, default_value = "1000")]
    pub ocr_poll_interval_ms: u64,

    /// Page images larger than this (in either direction) are scaled down
    /// before being sent to the OCR service.
    #[clap(long, default_value = "10000")]
    pub max_ocr_image_dimension: u32,

    /// Azure Computer Vision endpoint, e.g.
    /// `https://myresource.cognitiveservices.azure.com/`.
    #[clap(long, env = "AZURE_VISION_ENDPOINT", hide_env_values = true)]
    pub azure_vision_endpoint: Option<String>,

    /// Azure Computer Vision subscription key.
    #[clap(long, env = "AZURE_VISION_KEY", hide_env_values = true)]
    pub azure_vision_key: Option<String>,
}

// Keep the Azure key out of debug logs.
impl std::fmt::Debug for OcrOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrOpts")
            .field("ocr_engine", &self.ocr_engine)
            .field("rasterize_dpi", &self.rasterize_dpi)
            .field("ocr_timeout", &self.ocr_timeout)
            .field("ocr_poll_interval_ms", &self.ocr_poll_interval_ms)
            .field("max_ocr_image_dimension", &self.max_ocr_image_dimension)
            .field("azure_vision_endpoint", &self.azure_vision_endpoint)
            .field(
                "azure_vision_key",
                &self.azure_vision_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl OcrOpts {
    /// How often, and how many times, to check on an OCR job.
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings::from_timeout(
            Duration::from_secs(self.ocr_timeout),
            Duration::from_millis(self.ocr_poll_interval_ms),
        )
    }
}

/// Options for the LLM calls behind `simplify`, `ask` and `--glossary`.
#[derive(Args, Clone, Debug)]
pub struct LlmOpts {
    /// The LLM driver to use. `openai` works with OpenAI and any compatible
    /// gateway. `echo` returns the input unchanged, for testing.
    #[clap(long, value_enum, default_value_t = DriverType::default())]
    pub driver: DriverType,

    /// The chat model to use.
    #[clap(long, default_value = "gpt-4-turbo-preview")]
    pub model: String,

    /// The temperature to use for sampling, between 0.0 and 2.0.
    #[clap(long, default_value = "0.7")]
    pub temperature: f32,

    /// An upper limit on the number of completion tokens to generate. If
    /// omitted, each request uses its own default.
    #[clap(long)]
    pub max_completion_tokens: Option<u32>,

    /// A timeout, in seconds, for the LLM to return a complete response.
    #[clap(long)]
    pub timeout: Option<u64>,
}

/// Options for speech synthesis.
#[derive(Args, Clone, Debug)]
pub struct SpeechOpts {
    /// The text-to-speech model to use.
    #[clap(long, default_value = "tts-1")]
    pub speech_model: String,

    /// The voice to use, e.g. `alloy`, `echo`, `fable`, `onyx`, `nova` or
    /// `shimmer`.
    #[clap(long, default_value = "alloy")]
    pub voice: String,
}
