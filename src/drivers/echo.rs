//! Echo driver for testing.
//!
//! This driver returns the last user message unchanged, so the whole
//! `simplify` pipeline can run without network access. It refuses requests
//! that need structured output, since echoed text would never match a schema.

use crate::{config::LlmOpts, prelude::*};

use super::{ChatCompletionResponse, ChatRequest, Driver, TokenUsage};

/// Echo driver for testing.
#[derive(Debug)]
pub struct EchoDriver;

/// Extract the text from the last user message.
fn extract_last_user_message(messages: &Value) -> Result<String> {
    messages
        .as_array()
        .ok_or_else(|| anyhow!("Prompt messages must be an array"))?
        .iter()
        .rev()
        .find(|msg| msg.get("role").and_then(Value::as_str) == Some("user"))
        .and_then(|msg| msg.get("content"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("No user message found in prompt"))
}

#[async_trait]
impl Driver for EchoDriver {
    async fn chat_completion(
        &self,
        request: &ChatRequest,
        _llm_opts: &LlmOpts,
    ) -> Result<ChatCompletionResponse> {
        if request.response_schema.is_some() {
            return Err(anyhow!(
                "Echo driver does not support structured output (try without --glossary)"
            ));
        }
        let content = extract_last_user_message(&request.messages)?;
        Ok(ChatCompletionResponse {
            content,
            token_usage: Some(TokenUsage::default()),
        })
    }
}
