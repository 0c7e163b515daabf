use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::migrate;
use crate::model::{default_config, PortfolioConfig, CONFIG_FILE_NAME};
use crate::validate::validate_document;

pub const BUCKET_URL_ENV: &str = "PORTFOLIO_BUCKET_URL";
pub const CONFIG_FILENAME_ENV: &str = "PORTFOLIO_CONFIG_FILENAME";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Where the loader gets the document from and how hard it retries.
///
/// Retry counts and delays are deliberately plain defaults, not tuned values.
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub base_url: String,
    pub config_filename: String,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl LoaderSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        LoaderSettings {
            base_url: base_url.into(),
            config_filename: CONFIG_FILE_NAME.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }

    /// Resolve settings from the environment. A missing bucket URL is a
    /// configuration error, distinct from any network failure.
    pub fn from_env() -> AppResult<Self> {
        let base_url = std::env::var(BUCKET_URL_ENV).map_err(|_| {
            AppError::new(
                "CONFIG/ENV",
                "Bucket base URL is not configured",
            )
            .with_context("env", BUCKET_URL_ENV)
        })?;
        let mut settings = LoaderSettings::new(base_url);
        if let Ok(filename) = std::env::var(CONFIG_FILENAME_ENV) {
            if !filename.trim().is_empty() {
                settings.config_filename = filename;
            }
        }
        Ok(settings)
    }

    /// Deterministic document URL: base location plus the fixed filename.
    pub fn document_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.config_filename
        )
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Read-side transport seam. The production implementation is [`HttpFetcher`];
/// tests substitute fakes.
pub trait ConfigFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, AppResult<FetchResponse>>;
}

/// `reqwest`-backed fetcher. Requests no-cache so a read immediately after an
/// admin save sees the new document rather than an edge-cached copy.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, AppResult<FetchResponse>> {
        async move {
            let response = self
                .client
                .get(url)
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .header(reqwest::header::PRAGMA, "no-cache")
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(FetchResponse { status, body })
        }
        .boxed()
    }
}

/// Why the loader handed back the document it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed, migrated and validated remote document.
    Remote,
    /// No document exists remotely yet; the built-in default was used.
    DefaultMissing,
    /// Storage stayed unreachable through every retry; default used.
    DefaultUnreachable,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub config: PortfolioConfig,
    pub source: ConfigSource,
}

pub struct ConfigLoader {
    settings: LoaderSettings,
    fetcher: Arc<dyn ConfigFetcher>,
}

impl ConfigLoader {
    pub fn new(settings: LoaderSettings, fetcher: Arc<dyn ConfigFetcher>) -> Self {
        ConfigLoader { settings, fetcher }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    fn cache_busted_url(&self) -> String {
        let stamp = chrono::Utc::now().timestamp_millis();
        format!("{}?cb={stamp}", self.settings.document_url())
    }

    /// Load the shared document.
    ///
    /// Missing (404) and persistently unreachable storage both resolve to the
    /// default document. Malformed JSON and validation failures are returned
    /// as errors so the admin app can surface them; the public site wraps
    /// this with [`ConfigLoader::load_or_default`].
    pub async fn load(&self) -> AppResult<LoadOutcome> {
        let mut last_error: Option<AppError> = None;
        let mut body: Option<String> = None;

        for attempt in 1..=self.settings.max_attempts.max(1) {
            if attempt > 1 {
                let exponent = attempt.saturating_sub(2);
                let delay = self.settings.base_delay * 2u32.saturating_pow(exponent);
                tokio::time::sleep(delay).await;
            }

            let url = self.cache_busted_url();
            match self.fetcher.fetch(&url).await {
                Ok(response) if response.status == 404 => {
                    debug!(
                        target: "biffcross",
                        event = "config_load_missing",
                        url = %self.settings.document_url()
                    );
                    return Ok(LoadOutcome {
                        config: self.finish(serde_json::Value::Null, ConfigSource::DefaultMissing)?,
                        source: ConfigSource::DefaultMissing,
                    });
                }
                Ok(response) if response.is_success() => {
                    body = Some(response.body);
                    break;
                }
                Ok(response) => {
                    last_error = Some(
                        AppError::new("HTTP/STATUS", "Configuration fetch returned an error status")
                            .with_context("status", response.status.to_string())
                            .with_context("attempt", attempt.to_string()),
                    );
                }
                Err(err) => {
                    last_error = Some(err.with_context("attempt", attempt.to_string()));
                }
            }
        }

        let Some(body) = body else {
            warn!(
                target: "biffcross",
                event = "config_load_unreachable",
                attempts = self.settings.max_attempts,
                error = %last_error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            );
            return Ok(LoadOutcome {
                config: self.finish(serde_json::Value::Null, ConfigSource::DefaultUnreachable)?,
                source: ConfigSource::DefaultUnreachable,
            });
        };

        // A parse failure is a different animal from an unreachable bucket:
        // retrying will not fix broken bytes, diagnostics might.
        let raw: Value = serde_json::from_str(&body).map_err(AppError::from)?;
        let config = self.finish(raw, ConfigSource::Remote)?;
        Ok(LoadOutcome {
            config,
            source: ConfigSource::Remote,
        })
    }

    /// Public-site entry point: never fails, never surfaces errors.
    pub async fn load_or_default(&self) -> PortfolioConfig {
        match self.load().await {
            Ok(outcome) => outcome.config,
            Err(err) => {
                warn!(
                    target: "biffcross",
                    event = "config_load_fallback",
                    code = err.code(),
                    error = %err
                );
                default_config()
            }
        }
    }

    fn finish(&self, raw: Value, source: ConfigSource) -> AppResult<PortfolioConfig> {
        let merged = if raw.is_null() {
            merge_with_defaults(Value::Null)
        } else {
            merge_with_defaults(migrate::migrate(raw))
        };

        let report = validate_document(&merged);
        if !report.is_valid {
            return Err(AppError::new(
                "CONFIG/VALIDATION",
                "Remote configuration failed validation",
            )
            .with_context("errors", report.errors.join("; "))
            .with_context("error_count", report.errors.len().to_string()));
        }

        let config: PortfolioConfig = serde_json::from_value(merged).map_err(AppError::from)?;
        debug!(
            target: "biffcross",
            event = "config_loaded",
            source = ?source,
            categories = config.categories.len(),
            images = config.images.len()
        );
        Ok(config)
    }
}

/// Merge a loaded document with the built-in defaults.
///
/// `site` and `easterEggs` merge field-by-field so older documents missing
/// newly introduced optional fields still validate; `categories` and `images`
/// are taken wholesale from the loaded document when present.
pub fn merge_with_defaults(loaded: Value) -> Value {
    let mut merged = serde_json::to_value(default_config())
        .expect("default config always serializes");
    let Value::Object(loaded) = loaded else {
        return merged;
    };

    for section in ["site", "easterEggs"] {
        if let Some(Value::Object(fields)) = loaded.get(section) {
            if let Some(Value::Object(target)) = merged.get_mut(section) {
                for (key, value) in fields {
                    if !value.is_null() {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }
    for section in ["categories", "images"] {
        if let Some(value) = loaded.get(section) {
            if !value.is_null() {
                merged[section] = value.clone();
            }
        }
    }
    merged
}
