//! The `simplify` subcommand.

use clap::Args;
use schemars::JsonSchema;

use crate::{
    assistant::{Assistant, Glossary, ReadingLevel},
    async_utils::{
        io::{write_bytes, write_json_output},
        spawn_blocking_propagating_panics,
    },
    config::{LlmOpts, SpeechOpts},
    data_url::decode_data_url,
    prelude::*,
    prompt::PromptSet,
    render::render_pdf,
    speech::SpeechSynthesizer,
    ui::Ui,
};

use super::DocumentOpts;

/// Simplify command line arguments.
#[derive(Debug, Args)]
pub struct SimplifyOpts {
    /// A PDF, DOCX or TXT file to simplify.
    #[clap(required_unless_present = "text", conflicts_with = "text")]
    pub input_path: Option<PathBuf>,

    /// Simplify this text instead of reading a file.
    #[clap(long)]
    pub text: Option<String>,

    /// The target reading level: `beginner`, `intermediate` or `expert`.
    /// Unknown levels fall back to `intermediate`.
    #[clap(long, default_value = "intermediate")]
    pub reading_level: String,

    /// Also list hard terms with plain-language definitions.
    #[clap(long)]
    pub glossary: bool,

    /// Read the simplified text aloud and write an MP3 here.
    #[clap(long, value_name = "PATH")]
    pub speech_out: Option<PathBuf>,

    /// Write the simplified text as a PDF here.
    #[clap(long, value_name = "PATH")]
    pub pdf_out: Option<PathBuf>,

    /// A TOML or JSON file overriding the built-in prompts.
    #[clap(long, value_name = "PATH")]
    pub prompts: Option<PathBuf>,

    /// Where to write the `SimplifyOutput` JSON. Defaults to stdout.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub document: DocumentOpts,

    #[clap(flatten)]
    pub llm: LlmOpts,

    #[clap(flatten)]
    pub speech: SpeechOpts,
}

/// The result of simplifying a document.
#[derive(Debug, Deserialize, JsonSchema, Serialize)]
pub struct SimplifyOutput {
    /// The extracted (or supplied) text.
    pub original_text: String,

    /// The simplified text.
    pub simplified_text: String,

    /// The reading level that was actually used.
    pub reading_level: ReadingLevel,

    /// How many pages of the input could not be read.
    pub failed_page_count: usize,

    /// Definitions of hard terms, if requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossary: Option<Glossary>,

    /// Where we wrote the speech audio, if requested and available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_path: Option<PathBuf>,

    /// Where we wrote the PDF, if requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<PathBuf>,
}

/// The `simplify` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_simplify(ui: &Ui, opts: &SimplifyOpts) -> Result<()> {
    let reading_level = ReadingLevel::from_name_or_default(&opts.reading_level);

    // Build everything that can fail on bad options before doing slow work.
    let prompts = PromptSet::load(opts.prompts.as_deref()).await?;
    let driver = opts.llm.driver.create_driver()?;
    let assistant =
        Assistant::new(driver, prompts, opts.llm.clone()).with_ui(ui.clone());
    let synthesizer = match &opts.speech_out {
        Some(_) => Some(SpeechSynthesizer::from_opts(&opts.speech)?),
        None => None,
    };

    let (original_text, failed_page_count) = match (&opts.text, &opts.input_path) {
        (Some(text), _) => (text.clone(), 0),
        (None, Some(path)) => {
            let result = opts.document.extract_file(ui, path).await?;
            (result.text, result.failed_page_count)
        }
        (None, None) => return Err(anyhow!("no input: pass a file or --text")),
    };

    let simplified_text = assistant.simplify(&original_text, reading_level).await?;

    let glossary = if opts.glossary {
        Some(assistant.glossary(&simplified_text).await?)
    } else {
        None
    };

    let mut speech_path = None;
    if let (Some(path), Some(synthesizer)) = (&opts.speech_out, &synthesizer) {
        match synthesizer.synthesize(&simplified_text).await? {
            Some(url) => {
                let (_mime_type, audio) = decode_data_url(&url)?;
                write_bytes(path, &audio).await?;
                speech_path = Some(path.clone());
            }
            None => warn!("Skipping speech output"),
        }
    }

    let mut pdf_path = None;
    if let Some(path) = &opts.pdf_out {
        let text = simplified_text.clone();
        let pdf = spawn_blocking_propagating_panics(move || render_pdf(&text)).await?;
        write_bytes(path, &pdf).await?;
        pdf_path = Some(path.clone());
    }

    let output = SimplifyOutput {
        original_text,
        simplified_text,
        reading_level,
        failed_page_count,
        glossary,
        speech_path,
        pdf_path,
    };
    write_json_output(opts.output_path.as_deref(), &output).await
}
