use std::str::FromStr;

use crate::database::{Database, FromRow, StoreError, StoreResult};
use crate::generation::illustrate::is_absolute_url;
use econome::models::{Recipe, StoredRecipe};
use rusqlite::params;

pub fn sqlite_current_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Store-assigned recipe identifier: 24 lowercase hex digits.
///
/// The first four bytes are the creation time in seconds, the other eight are random.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipeId(String);

impl RecipeId {
    pub fn generate() -> Self {
        let seconds = chrono::Utc::now().timestamp() as u32;
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&rand::random::<[u8; 8]>());
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RecipeId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match hex::decode(s) {
            Ok(bytes) if bytes.len() == 12 => Ok(Self(s.to_ascii_lowercase())),
            _ => Err(StoreError::InvalidId(s.to_string())),
        }
    }
}

impl std::fmt::Display for RecipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check a recipe sent in for saving.
///
/// It needs a meal and at least one step, none of them blank. A blank image URL counts as
/// no image; any other image URL must be absolute.
pub fn checked_for_saving(mut recipe: Recipe) -> StoreResult<Recipe> {
    if recipe.meal.trim().is_empty() {
        return Err(StoreError::InvalidRecipe("meal must not be blank".into()));
    }
    if recipe.steps.is_empty() {
        return Err(StoreError::InvalidRecipe("a recipe needs at least one step".into()));
    }
    if recipe.steps.iter().any(|step| step.content.trim().is_empty()) {
        return Err(StoreError::InvalidRecipe("steps must not be blank".into()));
    }
    recipe.image_url = match recipe.image_url.take() {
        Some(url) if url.trim().is_empty() => None,
        Some(url) if !is_absolute_url(&url) => {
            return Err(StoreError::InvalidRecipe(format!(
                "image_url is not an absolute URL: {:?}",
                url
            )))
        }
        other => other,
    };
    Ok(recipe)
}

/// One live row of the Recipe table. The recipe itself is kept as a JSON document.
#[derive(Debug, Clone)]
pub struct RecipeDocument {
    pub recipe_id: String,
    pub document: String,
    pub created_on: String,
}

impl FromRow for RecipeDocument {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            recipe_id: row.get("recipe_id")?,
            document: row.get("document")?,
            created_on: row.get("created_on")?,
        })
    }
}

impl RecipeDocument {
    pub fn into_stored(self) -> StoreResult<StoredRecipe> {
        Ok(StoredRecipe {
            id: self.recipe_id,
            recipe: serde_json::from_str(&self.document)?,
        })
    }

    /// Save a recipe and return the id it was given.
    pub fn push(db: &Database, recipe: &Recipe) -> StoreResult<RecipeId> {
        Self::push_with(db, recipe, RecipeId::generate)
    }

    /// Save a recipe under the first id from `next_id` that isn't already taken.
    ///
    /// Gives up after four draws.
    pub fn push_with(
        db: &Database,
        recipe: &Recipe,
        mut next_id: impl FnMut() -> RecipeId,
    ) -> StoreResult<RecipeId> {
        let document = serde_json::to_string(recipe)?;
        let conn = db.pool.get()?;
        // Ids are random, but a collision with a live or deleted row must still not reuse it
        let mut attempts = 0;
        loop {
            let recipe_id = next_id();
            let inserted = conn.execute(
                "INSERT INTO Recipe (recipe_id, document, created_on) VALUES (?, ?, ?)",
                params![recipe_id.as_str(), document, sqlite_current_timestamp()],
            );
            match inserted {
                Ok(_) => return Ok(recipe_id),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation && attempts < 3 =>
                {
                    tracing::warn!("Recipe id {} already taken, drawing another", recipe_id);
                    attempts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// List every saved recipe, oldest first.
    pub fn list_all(db: &Database) -> StoreResult<Vec<StoredRecipe>> {
        db.collect_rows::<RecipeDocument, _>(
            "SELECT recipe_id, document, created_on
            FROM Recipe
            WHERE deleted_on IS NULL
            ORDER BY created_on, rowid",
            params![],
        )?
        .into_iter()
        .map(RecipeDocument::into_stored)
        .collect()
    }

    /// Get a saved recipe by ID
    pub fn get_by_id(db: &Database, recipe_id: &RecipeId) -> StoreResult<Option<StoredRecipe>> {
        db.collect_rows::<RecipeDocument, _>(
            "SELECT recipe_id, document, created_on
            FROM Recipe
            WHERE recipe_id = ? AND deleted_on IS NULL",
            params![recipe_id.as_str()],
        )?
        .pop()
        .map(RecipeDocument::into_stored)
        .transpose()
    }

    /// Delete a saved recipe, returning how many recipes matched (zero or one).
    ///
    /// The row stays behind as a tombstone so its id is retired for good.
    pub fn delete_by_id(db: &Database, recipe_id: &RecipeId) -> StoreResult<usize> {
        let conn = db.pool.get()?;
        let deleted = conn.execute(
            "UPDATE Recipe
            SET document = NULL, deleted_on = ?
            WHERE recipe_id = ? AND deleted_on IS NULL",
            params![sqlite_current_timestamp(), recipe_id.as_str()],
        )?;
        Ok(deleted)
    }
}
