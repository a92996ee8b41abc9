use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use econome::models::{Recipe, RecipeStep};
use econome_server::{
    api::{router, AppState, RecipeRef},
    config::DatabaseConfig,
    database::Database,
    generation::{
        completion::ResponseShape, CompletionClient, ImageResult, Illustrator, Prompt,
        RecipeGenerator,
    },
};
use reqwest::StatusCode;
use serde_json::{json, Value};

/// Answers every recipe request with pancakes, and every image with eggs and flour.
#[derive(Default)]
struct PancakeKitchen {
    prompts: Mutex<Vec<Prompt>>,
}

#[async_trait]
impl CompletionClient for PancakeKitchen {
    async fn complete_json(&self, prompt: &Prompt, shape: &ResponseShape) -> anyhow::Result<Value> {
        self.prompts.lock().unwrap().push(prompt.clone());
        match shape.name {
            "recipe" => Ok(json!({"meal": "Pancakes", "steps": [
                {"content": "Whisk"},
                {"content": "Fry"}
            ]})),
            "ingredients" => Ok(json!({"ingredients": [
                {"name": "egg", "quantity": null},
                {"name": "flour", "quantity": "200g"}
            ]})),
            other => anyhow::bail!("unexpected shape {other}"),
        }
    }
}

struct DownKitchen;

#[async_trait]
impl CompletionClient for DownKitchen {
    async fn complete_json(&self, _: &Prompt, _: &ResponseShape) -> anyhow::Result<Value> {
        anyhow::bail!("provider is down")
    }
}

struct Easel(Option<&'static str>);

#[async_trait]
impl Illustrator for Easel {
    fn is_available(&self) -> bool {
        self.0.is_some()
    }

    async fn illustrate(&self, _subject: &str) -> anyhow::Result<ImageResult> {
        Ok(self
            .0
            .map(|url| ImageResult::Image(url.to_string()))
            .unwrap_or(ImageResult::Unavailable))
    }
}

/// Serve the app on an ephemeral port, returning its base URL.
async fn serve(completion: Arc<dyn CompletionClient>, easel: Easel) -> String {
    let db = Database::connect(&DatabaseConfig {
        url: ":memory:".into(),
    })
    .await
    .unwrap();
    let generator = RecipeGenerator::new(completion, Arc::new(easel));
    let app = router(AppState {
        db,
        generator: Arc::new(generator),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", address)
}

fn sample_recipe() -> Recipe {
    Recipe {
        meal: "Shakshuka".into(),
        steps: vec![
            RecipeStep {
                content: "Simmer the tomatoes".into(),
            },
            RecipeStep {
                content: "Crack in the eggs".into(),
            },
        ],
        image_url: Some("https://fal.media/files/shakshuka.png".into()),
    }
}

#[tokio::test]
async fn health_check() {
    let base = serve(Arc::new(PancakeKitchen::default()), Easel(None)).await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn generate_from_ingredients_without_illustration() {
    let kitchen = Arc::new(PancakeKitchen::default());
    let base = serve(kitchen.clone(), Easel(None)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/recipes/"))
        .json(&json!([{"name": "egg"}, {"name": "flour", "quantity": "200g"}]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["meal"], "Pancakes");
    assert_eq!(body["steps"][1]["content"], "Fry");
    assert!(body["image_url"].is_null());

    let prompts = kitchen.prompts.lock().unwrap().clone();
    let [Prompt::Text(text)] = prompts.as_slice() else {
        panic!("expected one text prompt, got {prompts:?}");
    };
    assert!(text.contains("egg, 200g of flour"));
}

#[tokio::test]
async fn generate_from_ingredients_with_illustration() {
    let base = serve(
        Arc::new(PancakeKitchen::default()),
        Easel(Some("https://fal.media/files/pancakes.png")),
    )
    .await;
    let recipe: Recipe = reqwest::Client::new()
        .post(format!("{base}/api/recipes"))
        .json(&json!([{"name": "egg"}]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        recipe.image_url.as_deref(),
        Some("https://fal.media/files/pancakes.png")
    );
}

#[tokio::test]
async fn generation_errors_map_to_client_and_gateway_statuses() {
    let base = serve(Arc::new(PancakeKitchen::default()), Easel(None)).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/api/recipes/"))
        .json(&json!([]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let base = serve(Arc::new(DownKitchen), Easel(None)).await;
    let resp = client
        .post(format!("{base}/api/recipes/"))
        .json(&json!([{"name": "egg"}]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("provider is down"));
}

#[tokio::test]
async fn generate_from_image() {
    let kitchen = Arc::new(PancakeKitchen::default());
    let base = serve(kitchen.clone(), Easel(None)).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/recipes/vision"))
        .query(&[("image_url", "https://pics.example/counter.jpg")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let recipe: Recipe = resp.json().await.unwrap();
    assert_eq!(recipe.meal, "Pancakes");

    let prompts = kitchen.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 2);
    assert!(matches!(
        &prompts[0],
        Prompt::Vision { image_url, .. } if image_url == "https://pics.example/counter.jpg"
    ));
}

#[tokio::test]
async fn save_fetch_list_and_delete() {
    let base = serve(Arc::new(PancakeKitchen::default()), Easel(None)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/recipes/save"))
        .json(&sample_recipe())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let saved: RecipeRef = resp.json().await.unwrap();

    let fetched: Recipe = client
        .get(format!("{base}/api/recipes/{}", saved.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched, sample_recipe());

    let listed: Vec<Recipe> = client
        .get(format!("{base}/api/recipes/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed, vec![sample_recipe()]);

    let resp = client
        .delete(format!("{base}/api/recipes/{}", saved.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let deleted: RecipeRef = resp.json().await.unwrap();
    assert_eq!(deleted.id, saved.id);

    let resp = client
        .get(format!("{base}/api/recipes/{}", saved.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Resource not found");

    let resp = client
        .delete(format!("{base}/api/recipes/{}", saved.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_ids_are_client_errors() {
    let base = serve(Arc::new(PancakeKitchen::default()), Easel(None)).await;
    let client = reqwest::Client::new();
    for resp in [
        client.get(format!("{base}/api/recipes/nope")).send(),
        client.delete(format!("{base}/api/recipes/nope")).send(),
    ] {
        let resp = resp.await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["detail"], "Invalid Id passed");
    }
}

#[tokio::test]
async fn incomplete_recipes_are_not_saved() {
    let base = serve(Arc::new(PancakeKitchen::default()), Easel(None)).await;
    let client = reqwest::Client::new();

    for recipe in [
        json!({"meal": "", "steps": [], "image_url": ""}),
        json!({"meal": "Toast", "steps": [{"content": "  "}]}),
        json!({"meal": "Toast", "steps": [{"content": "Toast it"}], "image_url": "toast.png"}),
    ] {
        let resp = client
            .post(format!("{base}/api/recipes/save"))
            .json(&recipe)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().starts_with("Invalid recipe"));
    }
    let listed: Vec<Recipe> = client
        .get(format!("{base}/api/recipes/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.is_empty());

    // A blank image URL just means there is no picture
    let resp = client
        .post(format!("{base}/api/recipes/save"))
        .json(&json!({"meal": "Toast", "steps": [{"content": "Toast it"}], "image_url": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let saved: RecipeRef = resp.json().await.unwrap();
    let fetched: Value = client
        .get(format!("{base}/api/recipes/{}", saved.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(fetched["image_url"].is_null());
}

#[tokio::test]
async fn unreadable_requests_get_a_json_detail() {
    let base = serve(Arc::new(PancakeKitchen::default()), Easel(None)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/recipes/"))
        .json(&json!([{"quantity": "2"}]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("name"));

    let resp = client
        .post(format!("{base}/api/recipes/save"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].is_string());

    let resp = client
        .post(format!("{base}/api/recipes/vision"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("image_url"));
}
