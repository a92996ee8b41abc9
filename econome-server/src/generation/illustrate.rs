use anyhow::{anyhow, bail, ensure, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio_retry::{strategy::FixedInterval, Retry};

use crate::config::IllustrationConfig;

/// What came of asking for a picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageResult {
    Image(String),
    Unavailable,
}

/// An image generator for finished dishes. Always optional.
#[async_trait]
pub trait Illustrator: Send + Sync {
    /// Whether it's worth calling `illustrate` at all, e.g. credentials are present.
    fn is_available(&self) -> bool;

    async fn illustrate(&self, subject: &str) -> Result<ImageResult>;
}

/// An illustrator that never has anything to offer.
pub struct NoIllustrator;

#[async_trait]
impl Illustrator for NoIllustrator {
    fn is_available(&self) -> bool {
        false
    }

    async fn illustrate(&self, _subject: &str) -> Result<ImageResult> {
        Ok(ImageResult::Unavailable)
    }
}

#[derive(Debug, Deserialize)]
struct QueuedRequest {
    request_id: String,
    status_url: String,
    response_url: String,
}

#[derive(Debug, Deserialize)]
struct QueueStatus {
    status: String,
    #[serde(default)]
    logs: Option<Vec<QueueLog>>,
}

#[derive(Debug, Deserialize)]
struct QueueLog {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedImages {
    #[serde(default)]
    images: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: String,
}

/// Image generation through the fal.ai request queue.
///
/// A request is submitted, its status polled until it completes, then the result fetched.
pub struct FalIllustrator {
    client: Client,
    api_key: Option<String>,
    queue_base: String,
    model: String,
    poll_interval: std::time::Duration,
    max_polls: usize,
}

impl FalIllustrator {
    pub fn new(config: &IllustrationConfig, client: Client) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            queue_base: config.queue_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            poll_interval: config.poll_interval,
            max_polls: config.max_polls,
        }
    }

    fn authorization(&self) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("No image generation key configured"))?;
        Ok(format!("Key {}", key))
    }

    /// The API key is only ever sent back to the queue it was configured for.
    fn check_on_queue(&self, url: &str) -> Result<()> {
        ensure!(
            url.starts_with(&format!("{}/", self.queue_base)),
            "Image queue pointed at {:?}, outside {}",
            url,
            self.queue_base
        );
        Ok(())
    }

    async fn submit(&self, subject: &str) -> Result<QueuedRequest> {
        let queued: QueuedRequest = self
            .client
            .post(format!("{}/{}", self.queue_base, self.model))
            .header("Authorization", self.authorization()?)
            .json(&json!({ "prompt": subject }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Reading queue submission")?;
        self.check_on_queue(&queued.status_url)?;
        self.check_on_queue(&queued.response_url)?;
        Ok(queued)
    }

    /// Check on a queued request once, logging whatever the generator has said so far.
    ///
    /// `seen_logs` counts the log lines already printed by earlier polls.
    async fn poll_once(&self, status_url: &str, seen_logs: &mut usize) -> Result<()> {
        let status: QueueStatus = self
            .client
            .get(status_url)
            .query(&[("logs", "1")])
            .header("Authorization", self.authorization()?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let logs = status.logs.unwrap_or_default();
        for log in logs.iter().skip(*seen_logs) {
            tracing::info!("{}", log.message);
        }
        *seen_logs = (*seen_logs).max(logs.len());
        match status.status.as_str() {
            "COMPLETED" => Ok(()),
            other => bail!("Image request is {}", other),
        }
    }

    async fn wait_until_done(&self, queued: &QueuedRequest) -> Result<()> {
        let seen_logs = &tokio::sync::Mutex::new(0usize);
        let status_url = queued.status_url.as_str();
        let strategy = FixedInterval::new(self.poll_interval).take(self.max_polls);
        Retry::spawn(strategy, move || async move {
            let mut seen = seen_logs.lock().await;
            self.poll_once(status_url, &mut seen).await
        })
        .await
        .with_context(|| format!("Image request {} did not finish", queued.request_id))
    }
}

#[async_trait]
impl Illustrator for FalIllustrator {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn illustrate(&self, subject: &str) -> Result<ImageResult> {
        tracing::info!("Illustrating {:?} with {}", subject, self.model);
        let queued = self.submit(subject).await?;
        self.wait_until_done(&queued).await?;
        let generated: GeneratedImages = self
            .client
            .get(&queued.response_url)
            .header("Authorization", self.authorization()?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Reading generated images")?;
        // Only the first image is used
        Ok(match generated.images.into_iter().next() {
            Some(image) if is_absolute_url(&image.url) => ImageResult::Image(image.url),
            Some(image) => {
                tracing::warn!("Ignoring malformed image URL {:?}", image.url);
                ImageResult::Unavailable
            }
            None => ImageResult::Unavailable,
        })
    }
}

pub(crate) fn is_absolute_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|parsed| parsed.has_host() || parsed.scheme() == "data")
        .unwrap_or(false)
}
