//! Text-to-speech using OpenAI's `/audio/speech` endpoint.
//!
//! Results are returned as `data:audio/mpeg;base64,...` URLs. If no API key
//! is configured, speech is simply unavailable and we return `None`.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{CreateSpeechRequestArgs, SpeechModel, SpeechResponseFormat, Voice},
};

use crate::{
    config::SpeechOpts, data_url::data_url, drivers::openai::create_openai_client,
    prelude::*,
};

/// The most input characters the endpoint accepts in one request.
const MAX_SPEECH_CHARS: usize = 4096;

/// Synthesizes speech, if we have credentials.
pub struct SpeechSynthesizer {
    client: Option<Client<OpenAIConfig>>,
    model: SpeechModel,
    voice: Voice,
}

impl SpeechSynthesizer {
    /// Create a synthesizer from our options and the environment.
    pub fn from_opts(opts: &SpeechOpts) -> Result<Self> {
        let model = serde_json::from_value::<SpeechModel>(Value::String(
            opts.speech_model.clone(),
        ))
        .with_context(|| format!("invalid speech model {:?}", opts.speech_model))?;
        let voice = parse_voice(&opts.voice)?;
        let client = if std::env::var_os("OPENAI_API_KEY").is_some() {
            Some(create_openai_client())
        } else {
            warn!("OPENAI_API_KEY is not set; speech synthesis is unavailable");
            None
        };
        Ok(Self {
            client,
            model,
            voice,
        })
    }

    /// Synthesize `text` as MP3, returning a `data:` URL. Returns `None` if
    /// speech is unavailable. Blank text is an error.
    #[instrument(level = "debug", skip_all, fields(chars = text.len()))]
    pub async fn synthesize(&self, text: &str) -> Result<Option<String>> {
        let Some(client) = &self.client else {
            return Ok(None);
        };
        let chunks = split_for_speech(text, MAX_SPEECH_CHARS);
        if chunks.is_empty() {
            return Err(anyhow!("no text to synthesize"));
        }
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let request = CreateSpeechRequestArgs::default()
                .input(chunk.as_str())
                .model(self.model.clone())
                .voice(self.voice.clone())
                .response_format(SpeechResponseFormat::Mp3)
                .build()
                .context("Error building speech request")?;
            let response = client
                .audio()
                .speech(request)
                .await
                .with_context(|| format!("Error synthesizing speech chunk {}", idx + 1))?;
            debug!(
                chunk = idx + 1,
                of = chunks.len(),
                bytes = response.bytes.len(),
                "Synthesized speech"
            );
            // MP3 frames are self-delimiting, so chunks can simply be
            // concatenated.
            audio.extend_from_slice(&response.bytes);
        }
        Ok(Some(data_url("audio/mpeg", &audio)))
    }
}

fn parse_voice(name: &str) -> Result<Voice> {
    serde_json::from_value::<Voice>(Value::String(name.to_ascii_lowercase()))
        .with_context(|| format!("unknown voice {name:?}"))
}

/// Split text into chunks of at most `max_chars` characters, breaking on
/// whitespace where possible. Empty text gives no chunks.
fn split_for_speech(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if word_len > max_chars {
            // A single enormous "word". Hard-split it.
            let chars = word.chars().collect::<Vec<_>>();
            let mut pieces = chars.chunks(max_chars).map(|c| c.iter().collect::<String>());
            let last = pieces.next_back().unwrap_or_default();
            chunks.extend(pieces);
            current_len = last.chars().count();
            current = last;
            continue;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_for_speech("Hello  there,\nfriend.", 4096), vec![
            "Hello there, friend."
        ]);
        assert!(split_for_speech("   ", 4096).is_empty());
    }

    #[test]
    fn long_text_is_split_on_whitespace() {
        let chunks = split_for_speech("aaa bbb ccc ddd", 7);
        assert_eq!(chunks, vec!["aaa bbb", "ccc ddd"]);
        let chunks = split_for_speech("abcdefghij k", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij k"]);
    }

    #[test]
    fn chunks_respect_the_limit() {
        let text = "word ".repeat(3000);
        let chunks = split_for_speech(&text, MAX_SPEECH_CHARS);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_SPEECH_CHARS));
        assert_eq!(chunks.join(" "), text.trim());
    }

    #[test]
    fn voices_are_parsed_by_name() {
        assert_eq!(parse_voice("alloy").unwrap(), Voice::Alloy);
        assert_eq!(parse_voice("Nova").unwrap(), Voice::Nova);
        assert!(parse_voice("hal9000").is_err());
    }

    #[tokio::test]
    async fn no_credentials_means_no_speech() {
        let synth = SpeechSynthesizer {
            client: None,
            model: SpeechModel::Tts1,
            voice: Voice::Alloy,
        };
        assert_eq!(synth.synthesize("Hello").await.unwrap(), None);
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_a_request() {
        let client = Client::with_config(OpenAIConfig::new().with_api_key("sk-test"));
        let synth = SpeechSynthesizer {
            client: Some(client),
            model: SpeechModel::Tts1,
            voice: Voice::Alloy,
        };
        let err = synth.synthesize(" \n\t ").await.unwrap_err();
        assert!(err.to_string().contains("no text"), "{err}");
    }
}
