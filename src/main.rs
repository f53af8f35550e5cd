use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod assistant;
mod async_utils;
mod cmd;
mod config;
mod cpu_limit;
mod data_url;
mod drivers;
mod error;
mod extract;
mod ocr;
mod prelude;
mod prompt;
mod rasterize;
mod render;
mod speech;
mod ui;

/// Extract text from documents and make it easier to read.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - OPENAI_API_BASE (optional): Override the server URL.
  - OPENAI_API_KEY: The OpenAI key to use. Without it, speech output is
    skipped.
  - AZURE_VISION_ENDPOINT, AZURE_VISION_KEY: Credentials for the Azure
    Read OCR engine.

  Standard AWS environment variables and credential files
  are used for `--ocr-engine textract`.

  Scanned PDF pages are rasterized with `pdftocairo` from poppler-utils.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Extract the text of a PDF, DOCX or TXT file, using OCR for pages
    /// without a text layer.
    Extract(cmd::extract::ExtractOpts),
    /// Simplify a document or some text for a target reading level.
    Simplify(cmd::simplify::SimplifyOpts),
    /// Answer a question using only the supplied context.
    Ask(cmd::ask::AskOpts),
    /// Read text aloud and save it as an MP3.
    Speak(cmd::speak::SpeakOpts),
    /// Render plain text as a PDF.
    Render(cmd::render::RenderOpts),
    /// Print schemas for input and output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Extract(opts) => opts.output_path.is_none(),
            Cmd::Simplify(opts) => opts.output_path.is_none(),
            Cmd::Ask(opts) => opts.output_path.is_none(),
            Cmd::Speak(_) | Cmd::Render(_) => false,
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Progress bars would interleave with JSON on stdout.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    match &opts.subcmd {
        Cmd::Extract(opts) => cmd::extract::cmd_extract(&ui, opts).await,
        Cmd::Simplify(opts) => cmd::simplify::cmd_simplify(&ui, opts).await,
        Cmd::Ask(opts) => cmd::ask::cmd_ask(&ui, opts).await,
        Cmd::Speak(opts) => cmd::speak::cmd_speak(opts).await,
        Cmd::Render(opts) => cmd::render::cmd_render(opts).await,
        Cmd::Schema(schema_opts) => cmd::schema::cmd_schema(schema_opts).await,
    }
}
