use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::{DEFAULT_API_BASE, DEFAULT_MODEL};

/// Application configuration loaded from environment variables.
/// Every variable has a default; startup fails only on unparsable values.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub storage_path: PathBuf,
    pub gemini_api_base: String,
    pub gemini_model: String,
    /// Seeds the stored key when storage has none.
    pub gemini_api_key: Option<String>,
    /// Unset means model calls never time out.
    pub llm_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: env_or("PORT", "3001")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
            storage_path: PathBuf::from(env_or("STORAGE_PATH", "./extension-storage.json")),
            gemini_api_base: env_or("GEMINI_API_BASE", DEFAULT_API_BASE),
            gemini_model: env_or("GEMINI_MODEL", DEFAULT_MODEL),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            llm_timeout: optional_env("LLM_TIMEOUT_SECS")
                .map(|secs| {
                    secs.parse::<u64>()
                        .context("LLM_TIMEOUT_SECS must be a whole number of seconds")
                })
                .transpose()?
                .map(Duration::from_secs),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

/// A set but blank variable counts as unset.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
