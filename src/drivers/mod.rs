//! LLM drivers.
//!
//! Every LLM call in this tool is a single chat completion with no retries:
//! a failed request fails the command. Drivers only need to turn rendered
//! messages (and an optional response schema) into reply text.

use std::{fmt, time::Duration};

use clap::ValueEnum;
use futures::{FutureExt as _, future::BoxFuture};
use tokio::time;

use crate::{config::LlmOpts, prelude::*};

pub mod echo;
pub mod openai;

/// Our different driver types.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum DriverType {
    /// OpenAI driver (also for LiteLLM, Ollama, etc).
    #[default]
    #[clap(name = "openai")]
    OpenAi,

    /// Returns the last user message unchanged. Makes no network calls.
    Echo,
}

impl DriverType {
    /// Instantiate an appropriate driver.
    pub fn create_driver(&self) -> Result<Box<dyn Driver>> {
        match self {
            DriverType::OpenAi => Ok(Box::new(openai::OpenAiDriver::new()?)),
            DriverType::Echo => Ok(Box::new(echo::EchoDriver)),
        }
    }
}

/// A single chat completion request.
#[derive(Debug)]
pub struct ChatRequest {
    /// OpenAI-style messages, as produced by [`crate::prompt::ChatPrompt`].
    pub messages: Value,

    /// A JSON Schema the reply must follow. If present, the reply text will
    /// be JSON.
    pub response_schema: Option<Value>,

    /// The token limit to use when `--max-completion-tokens` isn't given.
    pub default_max_completion_tokens: u32,
}

/// A chat completion response.
#[derive(Debug)]
pub struct ChatCompletionResponse {
    /// The reply text. Not yet validated against any schema.
    pub content: String,

    /// Token usage, if the server reported it.
    pub token_usage: Option<TokenUsage>,
}

/// Token usage.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Interface trait for LLM drivers.
#[async_trait]
pub trait Driver: fmt::Debug + Send + Sync + 'static {
    /// Run a "chat completion" request.
    async fn chat_completion(
        &self,
        request: &ChatRequest,
        llm_opts: &LlmOpts,
    ) -> Result<ChatCompletionResponse>;
}

impl LlmOpts {
    /// The completion token limit for a request.
    pub fn max_completion_tokens_for(&self, request: &ChatRequest) -> u32 {
        self.max_completion_tokens
            .unwrap_or(request.default_max_completion_tokens)
    }

    /// Apply `--timeout`, if any, to a request future.
    pub fn apply_timeout<'fut, T>(
        &self,
        future: impl Future<Output = Result<T>> + Send + 'fut,
    ) -> BoxFuture<'fut, Result<T>>
    where
        T: Send + 'static,
    {
        match self.timeout {
            Some(timeout) => time::timeout(Duration::from_secs(timeout), future)
                .map(move |result| match result {
                    Ok(inner) => inner,
                    Err(_) => Err(anyhow!("LLM request timed out after {timeout}s")),
                })
                .boxed(),
            None => future.boxed(),
        }
    }
}
