use anyhow::{anyhow, ensure, Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use econome::models::{Ingredients, Recipe};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::CompletionConfig;

/// What gets sent to the completion provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Text(String),
    /// An instruction about a picture, given by URL.
    Vision { text: String, image_url: String },
}

/// The name and JSON Schema of the object a completion must come back as.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseShape {
    pub name: &'static str,
    pub schema: Value,
}

/// A type the completion provider can be asked to produce directly.
pub trait StructuredOutput: DeserializeOwned + Send {
    fn shape() -> ResponseShape;

    /// Check a freshly parsed value against the rules a schema can't express,
    /// tidying it up along the way.
    fn conform(self) -> Result<Self>;
}

impl StructuredOutput for Recipe {
    fn shape() -> ResponseShape {
        ResponseShape {
            name: "recipe",
            schema: json!({
                "type": "object",
                "properties": {
                    "meal": {"type": "string"},
                    "steps": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {"content": {"type": "string"}},
                            "required": ["content"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["meal", "steps"],
                "additionalProperties": false
            }),
        }
    }

    fn conform(mut self) -> Result<Self> {
        self.meal = self.meal.trim().to_string();
        ensure!(!self.meal.is_empty(), "Recipe has no meal name");
        ensure!(!self.steps.is_empty(), "Recipe has no steps");
        ensure!(
            self.steps.iter().all(|step| !step.content.trim().is_empty()),
            "Recipe has an empty step"
        );
        // Pictures only ever come from the illustrator
        self.image_url = None;
        Ok(self)
    }
}

impl StructuredOutput for Ingredients {
    fn shape() -> ResponseShape {
        ResponseShape {
            name: "ingredients",
            schema: json!({
                "type": "object",
                "properties": {
                    "ingredients": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "quantity": {"type": ["string", "null"]}
                            },
                            "required": ["name", "quantity"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["ingredients"],
                "additionalProperties": false
            }),
        }
    }

    fn conform(mut self) -> Result<Self> {
        for ingredient in &mut self.ingredients {
            ingredient.name = ingredient.name.trim().to_string();
            ensure!(!ingredient.name.is_empty(), "Ingredient has no name");
            ingredient.quantity = ingredient
                .quantity
                .take()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty());
        }
        Ok(self)
    }
}

/// A completion provider that can answer a prompt with JSON of a requested shape.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete_json(&self, prompt: &Prompt, shape: &ResponseShape) -> Result<Value>;
}

/// Ask for a `T` and get one back, parsed and checked.
pub async fn complete<T: StructuredOutput>(
    client: &dyn CompletionClient,
    prompt: &Prompt,
) -> Result<T> {
    let shape = T::shape();
    let value = client.complete_json(prompt, &shape).await?;
    let parsed: T = serde_json::from_value(value)
        .with_context(|| format!("Completion does not match the {} shape", shape.name))?;
    parsed.conform()
}

/// Completion over any OpenAI-compatible chat API (Mistral by default).
pub struct OpenAICompletionClient {
    client: async_openai::Client<OpenAIConfig>,
    model: String,
    vision_model: String,
}

impl OpenAICompletionClient {
    pub fn new(config: &CompletionConfig, http_client: reqwest::Client) -> Self {
        // Failures go straight back to the caller instead of being retried
        let no_retries = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(std::time::Duration::ZERO))
            .build();
        let client = async_openai::Client::with_config(
            OpenAIConfig::new()
                .with_api_key(&config.api_key)
                .with_api_base(&config.api_base),
        )
        .with_http_client(http_client)
        .with_backoff(no_retries);
        Self {
            client,
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAICompletionClient {
    async fn complete_json(&self, prompt: &Prompt, shape: &ResponseShape) -> Result<Value> {
        let (model, message) = match prompt {
            Prompt::Text(text) => (
                &self.model,
                ChatCompletionRequestUserMessageArgs::default()
                    .content(text.as_str())
                    .build()?,
            ),
            Prompt::Vision { text, image_url } => (
                &self.vision_model,
                ChatCompletionRequestUserMessageArgs::default()
                    .content(vec![
                        ChatCompletionRequestMessageContentPartTextArgs::default()
                            .text(text.as_str())
                            .build()?
                            .into(),
                        ChatCompletionRequestMessageContentPartImageArgs::default()
                            .image_url(
                                ImageUrlArgs::default()
                                    .url(image_url.as_str())
                                    .detail(ImageDetail::Auto)
                                    .build()?,
                            )
                            .build()?
                            .into(),
                    ])
                    .build()?,
            ),
        };
        let request = CreateChatCompletionRequestArgs::default()
            .model(model.as_str())
            .messages([message.into()])
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: shape.name.to_string(),
                    schema: Some(shape.schema.clone()),
                    strict: Some(true),
                },
            })
            .build()?;
        tracing::debug!("Requesting {} from {}", shape.name, model);
        let text = self
            .client
            .chat()
            .create(request)
            .await?
            .choices
            .into_iter()
            .next()
            .ok_or(anyhow!("No response from LLM"))?
            .message
            .content
            .ok_or(anyhow!("No message content in LLM response"))?;
        parse_json_reply(&text)
    }
}

/// Parse the model's reply as JSON. Some models wrap it in a markdown fence anyway.
fn parse_json_reply(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim()).context("LLM reply is not valid JSON")
}
