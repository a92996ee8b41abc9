use std::sync::Arc;

use anyhow::Context;
use econome::models::{Ingredient, Ingredients, Recipe};

use crate::config::Config;

pub mod completion;
pub mod illustrate;

pub use completion::{complete, CompletionClient, OpenAICompletionClient, Prompt};
pub use illustrate::{FalIllustrator, ImageResult, Illustrator, NoIllustrator};

pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Recipe generation failed: {0:#}")]
    Failure(#[from] anyhow::Error),
}

/// Joins the rendered ingredients into the recipe prompt.
pub fn recipe_prompt(ingredients: &[Ingredient]) -> String {
    let listed = ingredients
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    include_str!("../prompts/generate-recipe.md").replace("{ingredients}", &listed)
}

/// Turns ingredients (or a photo of them) into a recipe, with a picture when one can be had.
///
/// The recipe text is required; a failure there fails the whole request. The picture is
/// best effort, so an illustrator that is missing or misbehaving only means no `image_url`.
pub struct RecipeGenerator {
    completion: Arc<dyn CompletionClient>,
    illustrator: Arc<dyn Illustrator>,
}

impl RecipeGenerator {
    pub fn new(completion: Arc<dyn CompletionClient>, illustrator: Arc<dyn Illustrator>) -> Self {
        Self {
            completion,
            illustrator,
        }
    }

    /// Build the generator and its provider clients from the configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Building HTTP client")?;
        if config.completion.api_key.is_empty() {
            tracing::warn!("MISTRAL_KEY is not set, recipe generation will fail");
        }
        if config.illustration.api_key.is_none() {
            tracing::info!("FAL_KEY is not set, recipes will not be illustrated");
        }
        Ok(Self::new(
            Arc::new(OpenAICompletionClient::new(
                &config.completion,
                http_client.clone(),
            )),
            Arc::new(FalIllustrator::new(&config.illustration, http_client)),
        ))
    }

    pub async fn generate_from_ingredients(
        &self,
        ingredients: &[Ingredient],
    ) -> GenerationResult<Recipe> {
        if ingredients.is_empty() {
            return Err(GenerationError::InvalidInput(
                "At least one ingredient is needed".into(),
            ));
        }
        if ingredients.iter().any(|i| i.name.trim().is_empty()) {
            return Err(GenerationError::InvalidInput(
                "Every ingredient needs a name".into(),
            ));
        }

        let prompt = Prompt::Text(recipe_prompt(ingredients));
        tracing::debug!("Prompt: {:?}", prompt);
        let mut recipe: Recipe = complete(self.completion.as_ref(), &prompt).await?;
        tracing::info!("Generated recipe for {:?}", recipe.meal);

        if self.illustrator.is_available() {
            match self.illustrator.illustrate(&recipe.meal).await {
                Ok(ImageResult::Image(url)) => recipe.image_url = Some(url),
                Ok(ImageResult::Unavailable) => {
                    tracing::info!("No illustration came back for {:?}", recipe.meal)
                }
                Err(err) => {
                    tracing::warn!("Illustrating {:?} failed: {:#}", recipe.meal, err)
                }
            }
        }
        Ok(recipe)
    }

    pub async fn generate_from_image(&self, image_url: &str) -> GenerationResult<Recipe> {
        if reqwest::Url::parse(image_url).is_err() {
            return Err(GenerationError::InvalidInput(format!(
                "{:?} is not a valid image URL",
                image_url
            )));
        }
        let prompt = Prompt::Vision {
            text: include_str!("../prompts/identify-ingredients.md").into(),
            image_url: image_url.into(),
        };
        let found: Ingredients = complete(self.completion.as_ref(), &prompt).await?;
        tracing::info!("Found {} ingredients in image", found.ingredients.len());
        self.generate_from_ingredients(&found.ingredients).await
    }
}
