//! Our OpenAI driver, which we also use for LiteLLM, Ollama and other
//! compatible gateways.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, FinishReason, ResponseFormat,
        ResponseFormatJsonSchema,
    },
};

use crate::{config::LlmOpts, prelude::*};

use super::{ChatCompletionResponse, ChatRequest, Driver, TokenUsage};

/// Create an OpenAI-compatible client from `OPENAI_API_KEY` and
/// `OPENAI_API_BASE`.
pub fn create_openai_client() -> Client<OpenAIConfig> {
    let mut client_config = OpenAIConfig::new();
    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        client_config = client_config.with_api_key(api_key);
    }
    if let Ok(api_base) = std::env::var("OPENAI_API_BASE") {
        client_config = client_config.with_api_base(api_base);
    }
    Client::with_config(client_config)
}

/// Talks to `/chat/completions`.
#[derive(Debug)]
pub struct OpenAiDriver {
    client: Client<OpenAIConfig>,
}

impl OpenAiDriver {
    /// Create a new OpenAI driver.
    pub fn new() -> Result<Self> {
        if std::env::var_os("OPENAI_API_KEY").is_none()
            && std::env::var_os("OPENAI_API_BASE").is_none()
        {
            return Err(anyhow!(
                "OPENAI_API_KEY is not set (use --driver echo to test without an LLM)"
            ));
        }
        Ok(Self {
            client: create_openai_client(),
        })
    }
}

#[async_trait]
impl Driver for OpenAiDriver {
    #[instrument(level = "debug", skip_all, fields(model = %llm_opts.model))]
    async fn chat_completion(
        &self,
        request: &ChatRequest,
        llm_opts: &LlmOpts,
    ) -> Result<ChatCompletionResponse> {
        let messages =
            serde_json::from_value::<Vec<ChatCompletionRequestMessage>>(request.messages.clone())
                .context("Error converting prompt to OpenAI messages")?;

        let mut req = CreateChatCompletionRequestArgs::default();
        req.model(llm_opts.model.clone())
            .messages(messages)
            .temperature(llm_opts.temperature)
            .max_completion_tokens(llm_opts.max_completion_tokens_for(request))
            // Don't let the API keep copies of people's documents.
            .store(false);
        if let Some(schema) = &request.response_schema {
            let json_schema = ResponseFormatJsonSchema {
                name: schema
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or("ResponseFormat")
                    .to_owned(),
                schema: Some(schema.clone()),
                strict: Some(true),
                description: None,
            };
            req.response_format(ResponseFormat::JsonSchema { json_schema });
        }
        let req = req.build().context("Error building request")?;
        trace!(?req, "Request");

        let chat = self.client.chat();
        let chat_result: Value = llm_opts
            .apply_timeout(async move {
                chat.create_byot(req)
                    .await
                    .context("Error calling OpenAI-compatible API")
            })
            .await?;
        trace!(%chat_result, "OpenAI response");
        let response = serde_json::from_value::<CreateChatCompletionResponse>(chat_result)
            .context("Error parsing OpenAI response")?;

        let token_usage = response.usage.map(|usage| TokenUsage {
            prompt_tokens: u64::from(usage.prompt_tokens),
            completion_tokens: u64::from(usage.completion_tokens),
        });

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in OpenAI response"))?;
        if choice.finish_reason == Some(FinishReason::ContentFilter) {
            return Err(anyhow!("Content filter triggered"));
        }
        if choice.finish_reason == Some(FinishReason::Length) {
            warn!("LLM response was cut off by the completion token limit");
        }
        if let Some(refusal) = choice.message.refusal {
            return Err(anyhow!("Model refused to answer: {refusal}"));
        }
        let content = choice
            .message
            .content
            .ok_or_else(|| anyhow!("OpenAI response has no content"))?;
        debug!(chars = content.len(), ?token_usage, "Response");
        Ok(ChatCompletionResponse {
            content,
            token_usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_prompts_are_valid_openai_messages() {
        let messages = json!([
            {"role": "system", "content": "Be brief."},
            {"role": "user", "content": "Hello"},
            {"role": "assistant", "content": "Hi"},
        ]);
        let parsed =
            serde_json::from_value::<Vec<ChatCompletionRequestMessage>>(messages).unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(matches!(parsed[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(parsed[2], ChatCompletionRequestMessage::Assistant(_)));
    }
}
