use serde::{Deserialize, Serialize};

/// One ingredient, as typed by a user or read off a photo.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<String>,
}

impl Ingredient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: None,
        }
    }

    pub fn with_quantity(name: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: Some(quantity.into()),
        }
    }
}

/// Renders as `"<quantity> of <name>"`, or just the name when there is no quantity.
impl std::fmt::Display for Ingredient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.quantity.as_deref().map(str::trim) {
            Some(quantity) if !quantity.is_empty() => {
                write!(f, "{} of {}", quantity, self.name.trim())
            }
            _ => write!(f, "{}", self.name.trim()),
        }
    }
}

/// Ingredients extracted from an image. Never stored.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
pub struct Ingredients {
    pub ingredients: Vec<Ingredient>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RecipeStep {
    pub content: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub meal: String,
    pub steps: Vec<RecipeStep>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A recipe as it sits in the store, with the id the store assigned to it.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StoredRecipe {
    pub id: String,
    #[serde(flatten)]
    pub recipe: Recipe,
}
