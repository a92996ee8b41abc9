use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use econome::models::{Ingredient, Recipe};
use serde::{Deserialize, Serialize};

use crate::{
    database::Database,
    errors::{WebError, WebResult},
    generation::RecipeGenerator,
    models::{checked_for_saving, RecipeDocument, RecipeId},
};

/// `Json`, but unreadable bodies are answered with a JSON `detail` like every other error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(WebError))]
struct ApiJson<T>(T);

/// `Query`, with the same error body as `ApiJson`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(WebError))]
struct ApiQuery<T>(T);

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub generator: Arc<RecipeGenerator>,
}

/// All the recipe routes, mounted under `/api`, plus a health check.
pub fn router(state: AppState) -> Router {
    let recipes = Router::new()
        // `POST /recipes/` generates a recipe from ingredients, `GET` lists saved ones
        .route("/recipes", get(list_recipes).post(generate_recipe))
        .route("/recipes/", get(list_recipes).post(generate_recipe))
        // `POST /recipes/vision` generates a recipe from a picture of ingredients
        .route("/recipes/vision", post(generate_recipe_from_image))
        // `POST /recipes/save` stores a recipe
        .route("/recipes/save", post(save_recipe))
        // `GET` and `DELETE /recipes/:id` work on one saved recipe
        .route("/recipes/:id", get(get_recipe).delete(delete_recipe));

    Router::new()
        .route("/health", get(health))
        .nest("/api", recipes)
        .layer(
            tower_http::compression::CompressionLayer::new()
                .quality(tower_http::CompressionLevel::Fastest),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

// Just reply that everything is okay
async fn health() -> StatusCode {
    StatusCode::OK
}

async fn generate_recipe(
    State(state): State<AppState>,
    ApiJson(ingredients): ApiJson<Vec<Ingredient>>,
) -> WebResult<Json<Recipe>> {
    Ok(Json(
        state.generator.generate_from_ingredients(&ingredients).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct VisionQuery {
    image_url: String,
}

async fn generate_recipe_from_image(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<VisionQuery>,
) -> WebResult<Json<Recipe>> {
    Ok(Json(
        state.generator.generate_from_image(&query.image_url).await?,
    ))
}

/// The id of a recipe that was just saved or deleted.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecipeRef {
    pub id: String,
}

async fn save_recipe(
    State(state): State<AppState>,
    ApiJson(recipe): ApiJson<Recipe>,
) -> WebResult<(StatusCode, Json<RecipeRef>)> {
    let recipe = checked_for_saving(recipe)?;
    let recipe_id = RecipeDocument::push(&state.db, &recipe)?;
    tracing::info!(id = %recipe_id, "Saved new recipe");
    Ok((
        StatusCode::CREATED,
        Json(RecipeRef {
            id: recipe_id.to_string(),
        }),
    ))
}

async fn list_recipes(State(state): State<AppState>) -> WebResult<Json<Vec<Recipe>>> {
    let recipes = RecipeDocument::list_all(&state.db)?
        .into_iter()
        .map(|stored| stored.recipe)
        .collect();
    Ok(Json(recipes))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Json<Recipe>> {
    let recipe_id: RecipeId = id.parse()?;
    let stored = RecipeDocument::get_by_id(&state.db, &recipe_id)?.ok_or(WebError::NotFound)?;
    Ok(Json(stored.recipe))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<(StatusCode, Json<RecipeRef>)> {
    let recipe_id: RecipeId = id.parse()?;
    if RecipeDocument::delete_by_id(&state.db, &recipe_id)? == 0 {
        return Err(WebError::NotFound);
    }
    tracing::info!(id = %recipe_id, "Deleted recipe");
    Ok((
        StatusCode::ACCEPTED,
        Json(RecipeRef {
            id: recipe_id.to_string(),
        }),
    ))
}
