//! The `extract` subcommand.

use clap::Args;

use crate::{async_utils::io::write_json_output, prelude::*, ui::Ui};

use super::DocumentOpts;

/// Extract command line arguments.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    /// A PDF, DOCX or TXT file.
    pub input_path: PathBuf,

    /// Where to write the `ExtractionResult` JSON. Defaults to stdout.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub document: DocumentOpts,
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_extract(ui: &Ui, opts: &ExtractOpts) -> Result<()> {
    let result = opts.document.extract_file(ui, &opts.input_path).await?;
    write_json_output(opts.output_path.as_deref(), &result).await
}
