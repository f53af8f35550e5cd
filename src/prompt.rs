//! Chat prompts, stored as TOML and rendered with Handlebars.

use handlebars::Handlebars;
use schemars::JsonSchema;
use serde_json::Map;

use crate::{async_utils::io::read_json_or_toml, prelude::*};

/// The prompts we ship with.
const BUILTIN_PROMPTS: &str = include_str!("prompts.toml");

/// Every prompt this tool uses. Override with `--prompts FILE`.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PromptSet {
    /// Simplification prompts, one per reading level. Bindings: `text`.
    pub simplify: SimplifyPrompts,

    /// Question answering. Bindings: `question`, `context`.
    pub answer: ChatPrompt,

    /// Glossary extraction. Bindings: `text`.
    pub glossary: ChatPrompt,
}

/// One simplification prompt per reading level.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SimplifyPrompts {
    pub beginner: ChatPrompt,
    pub intermediate: ChatPrompt,
    pub expert: ChatPrompt,
}

impl PromptSet {
    /// The built-in prompts.
    pub fn builtin() -> Result<Self> {
        toml::from_str(BUILTIN_PROMPTS).context("Failed to parse built-in prompts")
    }

    /// Load prompts from `path`, or fall back to the built-in prompts.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => read_json_or_toml(path).await,
            None => Self::builtin(),
        }
    }
}

/// A chat completion prompt.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ChatPrompt {
    /// The developer (aka "system") message, if any.
    pub developer: Option<String>,

    /// Messages. The last one is normally the user message carrying our
    /// input.
    pub messages: Vec<Message>,
}

impl ChatPrompt {
    /// Render the prompt as an OpenAI-style message array.
    ///
    /// Bindings are inserted verbatim. Missing bindings are an error.
    pub fn render_prompt(&self, bindings: &Map<String, Value>) -> Result<Value> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);

        let mut messages = Vec::new();
        if let Some(developer) = &self.developer {
            messages.push(json!({
                "role": "system",
                "content": render(&handlebars, developer, bindings)?,
            }));
        }
        for message in &self.messages {
            messages.push(json!({
                "role": "user",
                "content": render(&handlebars, &message.user, bindings)?,
            }));
            if let Some(assistant) = &message.assistant {
                messages.push(json!({
                    "role": "assistant",
                    "content": render(&handlebars, assistant, bindings)?,
                }));
            }
        }
        Ok(Value::Array(messages))
    }
}

fn render(
    handlebars: &Handlebars<'_>,
    template: &str,
    bindings: &Map<String, Value>,
) -> Result<String> {
    handlebars
        .render_template(template, bindings)
        .with_context(|| format!("Failed to render prompt template {template:?}"))
}

/// A user message, and optionally an example assistant response.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Message {
    /// The user message.
    pub user: String,

    /// The assistant response (optional).
    pub assistant: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("bindings must be an object"),
        }
    }

    #[test]
    fn builtin_prompts_parse() {
        let prompts = PromptSet::builtin().unwrap();
        assert!(prompts.simplify.beginner.developer.is_some());
        assert!(prompts.answer.developer.is_some());
    }

    #[test]
    fn renders_without_html_escaping() {
        let prompt: ChatPrompt = toml::from_str(
            r#"
            developer = "Be nice."
            [[messages]]
            user = "Example: {{example}}"
            assistant = "Done."
            [[messages]]
            user = "{{text}}"
            "#,
        )
        .unwrap();
        let rendered = prompt
            .render_prompt(&bindings(json!({"example": "x", "text": "Smith & <Sons>"})))
            .unwrap();
        assert_eq!(
            rendered,
            json!([
                {"role": "system", "content": "Be nice."},
                {"role": "user", "content": "Example: x"},
                {"role": "assistant", "content": "Done."},
                {"role": "user", "content": "Smith & <Sons>"},
            ])
        );
    }

    #[test]
    fn missing_bindings_are_errors() {
        let prompt: ChatPrompt = toml::from_str(
            r#"
            [[messages]]
            user = "{{question}}"
            "#,
        )
        .unwrap();
        assert!(prompt.render_prompt(&Map::new()).is_err());
    }

    #[tokio::test]
    async fn prompts_can_be_overridden_from_a_file() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("prompts")?;
        let path = dir.path().join("prompts.toml");
        let custom = BUILTIN_PROMPTS.replace("grade school", "kindergarten");
        tokio::fs::write(&path, custom).await?;

        let prompts = PromptSet::load(Some(&path)).await?;
        let developer = prompts.simplify.beginner.developer.unwrap_or_default();
        assert!(developer.contains("kindergarten"), "{developer}");
        Ok(())
    }
}
