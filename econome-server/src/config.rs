use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub completion: CompletionConfig,
    pub illustration: IllustrationConfig,
    pub database: DatabaseConfig,
    pub request_timeout: Duration,
}

impl Config {
    /// Load the configuration from the process environment (after `.env` has been read).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    /// Build the configuration from any key lookup, filling in defaults for missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a whole number, got {raw:?}")),
                None => Ok(default),
            }
        };

        Ok(Self {
            completion: CompletionConfig {
                api_key: get("MISTRAL_KEY", ""),
                api_base: get("MISTRAL_API_BASE", "https://api.mistral.ai/v1"),
                model: get("MISTRAL_MODEL", "mistral-large-latest"),
                vision_model: get("VISION_MODEL", "pixtral-12b-2409"),
            },
            illustration: IllustrationConfig {
                // A blank key is the same as no key at all
                api_key: lookup("FAL_KEY").filter(|key| !key.trim().is_empty()),
                queue_base: get("FAL_QUEUE_BASE", "https://queue.fal.run"),
                model: get("FLUX_MODEL", "fal-ai/flux-pro/v1.1-ultra"),
                poll_interval: Duration::from_millis(number("FAL_POLL_INTERVAL_MS", 1000)?),
                max_polls: number("FAL_MAX_POLLS", 120)? as usize,
            },
            database: DatabaseConfig {
                url: get("DATABASE_URL", "data/econome.db"),
            },
            request_timeout: Duration::from_secs(number("REQUEST_TIMEOUT_SECS", 120)?),
        })
    }
}

/// The OpenAI-compatible chat endpoint used for recipes and for reading photos.
#[derive(Clone, Debug)]
pub struct CompletionConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub vision_model: String,
}

#[derive(Clone, Debug)]
pub struct IllustrationConfig {
    /// Illustration is switched off when this is `None`.
    pub api_key: Option<String>,
    pub queue_base: String,
    pub model: String,
    pub poll_interval: Duration,
    pub max_polls: usize,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    /// A SQLite file path, or `:memory:`.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.completion.model, "mistral-large-latest");
        assert_eq!(config.completion.vision_model, "pixtral-12b-2409");
        assert_eq!(config.illustration.model, "fal-ai/flux-pro/v1.1-ultra");
        assert!(config.illustration.api_key.is_none());
        assert_eq!(config.illustration.max_polls, 120);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn blank_fal_key_disables_illustration() {
        let config = config_from(&[("FAL_KEY", "   ")]).unwrap();
        assert!(config.illustration.api_key.is_none());

        let config = config_from(&[("FAL_KEY", "secret")]).unwrap();
        assert_eq!(config.illustration.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn overrides_are_read() {
        let config = config_from(&[
            ("MISTRAL_MODEL", "mistral-small-latest"),
            ("DATABASE_URL", ":memory:"),
            ("FAL_POLL_INTERVAL_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.completion.model, "mistral-small-latest");
        assert_eq!(config.database.url, ":memory:");
        assert_eq!(config.illustration.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config_from(&[("FAL_MAX_POLLS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("FAL_MAX_POLLS"));
    }
}
