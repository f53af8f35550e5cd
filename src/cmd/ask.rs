//! The `ask` subcommand.

use clap::Args;
use schemars::JsonSchema;

use crate::{
    assistant::Assistant,
    async_utils::io::{read_text_input, write_json_output},
    config::LlmOpts,
    prelude::*,
    prompt::PromptSet,
    ui::Ui,
};

/// Ask command line arguments.
#[derive(Debug, Args)]
pub struct AskOpts {
    /// The question to answer.
    #[clap(long, short = 'q')]
    pub question: String,

    /// The context to answer from.
    #[clap(long, required_unless_present = "context_file")]
    pub context: Option<String>,

    /// A UTF-8 text file containing the context to answer from.
    #[clap(long, value_name = "PATH", conflicts_with = "context")]
    pub context_file: Option<PathBuf>,

    /// A TOML or JSON file overriding the built-in prompts.
    #[clap(long, value_name = "PATH")]
    pub prompts: Option<PathBuf>,

    /// Where to write the `AnswerOutput` JSON. Defaults to stdout.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub llm: LlmOpts,
}

/// An answer to a question about a document.
#[derive(Debug, Deserialize, JsonSchema, Serialize)]
pub struct AnswerOutput {
    pub question: String,
    pub answer: String,
}

/// The `ask` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ask(ui: &Ui, opts: &AskOpts) -> Result<()> {
    let context =
        read_text_input(opts.context.as_deref(), opts.context_file.as_deref()).await?;
    let prompts = PromptSet::load(opts.prompts.as_deref()).await?;
    let driver = opts.llm.driver.create_driver()?;
    let assistant =
        Assistant::new(driver, prompts, opts.llm.clone()).with_ui(ui.clone());
    let answer = assistant.answer(&opts.question, &context).await?;
    let output = AnswerOutput {
        question: opts.question.clone(),
        answer,
    };
    write_json_output(opts.output_path.as_deref(), &output).await
}
