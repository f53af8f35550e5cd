//! LLM-backed operations: simplification, question answering and glossaries.

use std::{fmt, str::FromStr};

use clap::ValueEnum;
use schemars::{JsonSchema, r#gen::SchemaSettings};
use serde_json::Map;

use crate::{
    config::LlmOpts,
    drivers::{ChatRequest, Driver},
    prelude::*,
    prompt::{ChatPrompt, PromptSet},
    ui::{ProgressConfig, Ui},
};

/// Default completion token limit for simplification.
const SIMPLIFY_MAX_TOKENS: u32 = 1500;

/// Default completion token limit for answers.
const ANSWER_MAX_TOKENS: u32 = 500;

/// Default completion token limit for glossaries.
const GLOSSARY_MAX_TOKENS: u32 = 1500;

/// Who the simplified text is written for.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReadingLevel {
    /// Grade school.
    Beginner,
    /// High school.
    #[default]
    Intermediate,
    /// College-educated.
    Expert,
}

impl ReadingLevel {
    /// Parse a level name, falling back to [`ReadingLevel::Intermediate`]
    /// for anything we don't recognize.
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!(level = name, "Unknown reading level; using intermediate");
            ReadingLevel::default()
        })
    }
}

impl FromStr for ReadingLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(s.trim(), true)
            .map_err(|_| anyhow!("unknown reading level {s:?}"))
    }
}

impl fmt::Display for ReadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadingLevel::Beginner => "beginner",
            ReadingLevel::Intermediate => "intermediate",
            ReadingLevel::Expert => "expert",
        };
        f.write_str(name)
    }
}

/// A difficult term and its plain-language definition.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GlossaryTerm {
    /// The term, exactly as it appears in the text.
    pub term: String,
    /// A short, plain-language definition.
    pub definition: String,
}

/// Difficult terms found in a text.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Glossary {
    pub terms: Vec<GlossaryTerm>,
}

impl Glossary {
    /// A JSON Schema suitable for strict structured output. Subschemas are
    /// inlined, because not every gateway resolves `$ref`.
    pub fn response_schema() -> Result<Value> {
        let generator = SchemaSettings::draft07()
            .with(|settings| settings.inline_subschemas = true)
            .into_generator();
        let schema = generator.into_root_schema_for::<Glossary>();
        let mut schema =
            serde_json::to_value(schema).context("failed to serialize glossary schema")?;
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("$schema");
        }
        Ok(schema)
    }
}

/// Runs our prompts against an LLM.
pub struct Assistant {
    driver: Box<dyn Driver>,
    prompts: PromptSet,
    llm_opts: LlmOpts,
    ui: Option<Ui>,
}

impl Assistant {
    /// Create a new assistant.
    pub fn new(driver: Box<dyn Driver>, prompts: PromptSet, llm_opts: LlmOpts) -> Self {
        Self {
            driver,
            prompts,
            llm_opts,
            ui: None,
        }
    }

    /// Show a spinner while waiting for the LLM.
    pub fn with_ui(mut self, ui: Ui) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Rewrite `text` for the given reading level.
    #[instrument(level = "debug", skip(self, text), fields(chars = text.len()))]
    pub async fn simplify(&self, text: &str, level: ReadingLevel) -> Result<String> {
        let prompt = match level {
            ReadingLevel::Beginner => &self.prompts.simplify.beginner,
            ReadingLevel::Intermediate => &self.prompts.simplify.intermediate,
            ReadingLevel::Expert => &self.prompts.simplify.expert,
        };
        let bindings = bindings([("text", text)]);
        let content = self
            .complete(prompt, &bindings, None, SIMPLIFY_MAX_TOKENS, "Simplifying")
            .await
            .context("Failed to simplify text")?;
        Ok(content)
    }

    /// Answer `question` using only `context`.
    #[instrument(level = "debug", skip_all)]
    pub async fn answer(&self, question: &str, context: &str) -> Result<String> {
        let bindings = bindings([("question", question), ("context", context)]);
        let content = self
            .complete(
                &self.prompts.answer,
                &bindings,
                None,
                ANSWER_MAX_TOKENS,
                "Answering",
            )
            .await
            .context("Failed to answer question")?;
        Ok(content.trim().to_owned())
    }

    /// List the difficult terms in `text`, with definitions.
    #[instrument(level = "debug", skip_all, fields(chars = text.len()))]
    pub async fn glossary(&self, text: &str) -> Result<Glossary> {
        let schema = Glossary::response_schema()?;
        let validator = jsonschema::validator_for(&schema)?;
        let bindings = bindings([("text", text)]);
        let content = self
            .complete(
                &self.prompts.glossary,
                &bindings,
                Some(schema),
                GLOSSARY_MAX_TOKENS,
                "Building glossary",
            )
            .await
            .context("Failed to build glossary")?;

        let response = serde_json::from_str::<Value>(&content)
            .with_context(|| format!("Glossary response is not JSON: {content:?}"))?;
        validator
            .validate(&response)
            .map_err(|err| err.to_owned())
            .with_context(|| format!("Failed to validate {}", response))?;
        let glossary = serde_json::from_value::<Glossary>(response)
            .context("Failed to parse glossary")?;
        debug!(terms = glossary.terms.len(), "Built glossary");
        Ok(glossary)
    }

    async fn complete(
        &self,
        prompt: &ChatPrompt,
        bindings: &Map<String, Value>,
        response_schema: Option<Value>,
        default_max_completion_tokens: u32,
        activity: &str,
    ) -> Result<String> {
        let request = ChatRequest {
            messages: prompt.render_prompt(bindings)?,
            response_schema,
            default_max_completion_tokens,
        };
        let _spinner = self.ui.as_ref().map(|ui| {
            ui.new_spinner(&ProgressConfig {
                emoji: "🤖",
                msg: activity,
                done_msg: "Done",
            })
        });
        let response = self
            .driver
            .chat_completion(&request, &self.llm_opts)
            .await?;
        if let Some(usage) = response.token_usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }
        Ok(response.content)
    }
}

fn bindings<const N: usize>(pairs: [(&str, &str); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_owned(), Value::String(value.to_owned())))
        .collect()
}
