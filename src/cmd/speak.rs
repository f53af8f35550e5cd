//! The `speak` subcommand.

use clap::Args;

use crate::{
    async_utils::io::{read_text_input, write_bytes},
    config::SpeechOpts,
    data_url::decode_data_url,
    prelude::*,
    speech::SpeechSynthesizer,
};

/// Speak command line arguments.
#[derive(Debug, Args)]
pub struct SpeakOpts {
    /// A UTF-8 text file to read aloud.
    #[clap(required_unless_present = "text", conflicts_with = "text")]
    pub input_path: Option<PathBuf>,

    /// Read this text aloud instead of a file.
    #[clap(long)]
    pub text: Option<String>,

    /// Where to write the MP3 audio.
    #[clap(short = 'o', long = "out")]
    pub output_path: PathBuf,

    #[clap(flatten)]
    pub speech: SpeechOpts,
}

/// The `speak` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_speak(opts: &SpeakOpts) -> Result<()> {
    let synthesizer = SpeechSynthesizer::from_opts(&opts.speech)?;
    let text = read_text_input(opts.text.as_deref(), opts.input_path.as_deref()).await?;
    let url = synthesizer
        .synthesize(&text)
        .await?
        .ok_or_else(|| anyhow!("speech synthesis is unavailable (set OPENAI_API_KEY)"))?;
    let (mime_type, audio) = decode_data_url(&url)?;
    debug!(%mime_type, bytes = audio.len(), "Writing speech");
    write_bytes(&opts.output_path, &audio).await
}
