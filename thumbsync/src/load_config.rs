/// `load_config` module: Loads a static YAML config and injects the API token from the environment.
///
/// This module is the only place where user-supplied YAML is parsed and mapped to the
/// strongly-typed [`PipelineConfig`] of the core crate and the connection settings of
/// [`crate::upload::AirtableClient`].
///
/// # Responsibilities
/// - Parse the YAML file into intermediate section structs, applying defaults for optional keys
/// - Inject the secret token from `AIRTABLE_TOKEN` (`main` loads `.env` beforehand)
/// - Surface every failure as an `anyhow::Error` with enough context for the CLI user
///
/// The config file itself never holds secrets.
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thumbsync_core::archive::DEFAULT_MAX_ENTRY_BYTES;
use thumbsync_core::throttle::RetryPolicy;
use thumbsync_core::PipelineConfig;
use tracing::{error, info};

/// Environment variable holding the personal access token.
pub const TOKEN_ENV: &str = "AIRTABLE_TOKEN";

pub const DEFAULT_API_URL: &str = "https://api.airtable.com";
pub const DEFAULT_CONTENT_URL: &str = "https://content.airtable.com";

#[derive(Debug, Deserialize)]
struct FileConfig {
    airtable: AirtableSection,
    #[serde(default)]
    pipeline: PipelineSection,
}

#[derive(Debug, Deserialize)]
struct AirtableSection {
    base_id: String,
    table: String,
    key_field: String,
    thumbnail_field: String,
    #[serde(default = "default_api_url")]
    api_url: String,
    #[serde(default = "default_content_url")]
    content_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PipelineSection {
    dry_run: bool,
    min_call_interval_ms: u64,
    max_entry_bytes: u64,
    retry: RetrySection,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            dry_run: false,
            min_call_interval_ms: 200,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            retry: RetrySection::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RetrySection {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_content_url() -> String {
    DEFAULT_CONTENT_URL.to_string()
}

/// Connection settings for one Airtable base.
#[derive(Clone)]
pub struct AirtableSettings {
    pub base_id: String,
    pub api_url: String,
    pub content_url: String,
    pub token: String,
}

impl std::fmt::Debug for AirtableSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirtableSettings")
            .field("base_id", &self.base_id)
            .field("api_url", &self.api_url)
            .field("content_url", &self.content_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub airtable: AirtableSettings,
    pub pipeline: PipelineConfig,
}

/// Loads a static YAML config file (no secrets) and injects the token from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let raw: FileConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    let token = std::env::var(TOKEN_ENV)
        .with_context(|| format!("{TOKEN_ENV} environment variable not set"))?;
    if token.trim().is_empty() {
        error!("{TOKEN_ENV} is empty");
        anyhow::bail!("{TOKEN_ENV} environment variable is empty");
    }

    let airtable = AirtableSettings {
        base_id: raw.airtable.base_id,
        api_url: raw.airtable.api_url.trim_end_matches('/').to_string(),
        content_url: raw.airtable.content_url.trim_end_matches('/').to_string(),
        token,
    };

    let retry = RetryPolicy {
        max_retries: raw.pipeline.retry.max_retries,
        base_delay: Duration::from_millis(raw.pipeline.retry.base_delay_ms),
        max_delay: Duration::from_millis(raw.pipeline.retry.max_delay_ms),
    };
    let pipeline = PipelineConfig {
        table: raw.airtable.table,
        key_field: raw.airtable.key_field,
        thumbnail_field: raw.airtable.thumbnail_field,
        dry_run: raw.pipeline.dry_run,
        min_call_interval: Duration::from_millis(raw.pipeline.min_call_interval_ms),
        retry,
        max_entry_bytes: raw.pipeline.max_entry_bytes,
    };

    info!(
        base_id = %airtable.base_id,
        table = %pipeline.table,
        "Config loaded and merged successfully"
    );
    Ok(AppConfig { airtable, pipeline })
}
