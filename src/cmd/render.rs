//! The `render` subcommand.

use clap::Args;

use crate::{
    async_utils::{
        io::{read_text_input, write_bytes},
        spawn_blocking_propagating_panics,
    },
    prelude::*,
    render::render_pdf,
};

/// Render command line arguments.
#[derive(Debug, Args)]
pub struct RenderOpts {
    /// A UTF-8 text file to render.
    #[clap(required_unless_present = "text", conflicts_with = "text")]
    pub input_path: Option<PathBuf>,

    /// Render this text instead of a file.
    #[clap(long)]
    pub text: Option<String>,

    /// Where to write the PDF.
    #[clap(short = 'o', long = "out")]
    pub output_path: PathBuf,
}

/// The `render` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_render(opts: &RenderOpts) -> Result<()> {
    let text = read_text_input(opts.text.as_deref(), opts.input_path.as_deref()).await?;
    let pdf = spawn_blocking_propagating_panics(move || render_pdf(&text)).await?;
    write_bytes(&opts.output_path, &pdf).await
}
