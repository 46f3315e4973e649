use crate::error::{Error, Result};
use std::env;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: String,
    pub api_url: String,
    pub database_path: String,
    pub chunk_size: usize,
    pub strict: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_token = env::var("GITHUB_TOKEN")
            .map_err(|_| Error::Config("GITHUB_TOKEN environment variable not set".to_string()))?;

        let api_url = env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let database_path = env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "repoclass.db".to_string());

        let chunk_size = env::var("FEATURE_CHUNK_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(PipelineConfig::DEFAULT_CHUNK_SIZE)
            .max(1);

        let strict = env::var("STRICT_EXTRACTION")
            .ok()
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Ok(Self {
            github_token,
            api_url,
            database_path,
            chunk_size,
            strict,
        })
    }
}

/// Scheduling and failure knobs for a feature extraction run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of extractor tasks batched into one worker submission.
    pub chunk_size: usize,
    /// Abort the whole run when an extractor fails instead of omitting its features.
    pub strict: bool,
}

impl PipelineConfig {
    pub const DEFAULT_CHUNK_SIZE: usize = 5;
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            strict: true,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            strict: config.strict,
        }
    }
}
