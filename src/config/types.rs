use crate::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Notion-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub notion: NotionConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Notion API access configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotionConfig {
    /// Base URL of the Notion REST API
    #[serde(rename = "api-url", default = "default_notion_api_url")]
    pub api_url: String,

    /// Value sent in the Notion-Version header
    #[serde(rename = "api-version", default = "default_notion_api_version")]
    pub api_version: String,

    /// Integration token; takes precedence over `token-env`
    #[serde(default)]
    pub token: Option<String>,

    /// Environment variable holding the integration token
    #[serde(rename = "token-env", default = "default_notion_token_env")]
    pub token_env: String,

    /// Page size used for child listing and database queries
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Seconds to wait on a 429 without a Retry-After header
    #[serde(rename = "default-retry-after", default = "default_retry_after")]
    pub default_retry_after: u64,
}

/// Gemini enrichment configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// Base URL of the Generative Language API
    #[serde(rename = "api-url", default = "default_gemini_api_url")]
    pub api_url: String,

    /// API key; takes precedence over `api-key-env`
    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(rename = "api-key-env", default = "default_gemini_key_env")]
    pub api_key_env: String,

    /// Model identifier, also part of the enrichment result key
    #[serde(default = "default_model")]
    pub model: String,

    /// Attempts per note before quota exhaustion becomes terminal
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds to wait when the quota error carries no usable retry delay
    #[serde(rename = "default-retry-delay", default = "default_retry_delay")]
    pub default_retry_delay: f64,
}

/// Local store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

/// Filesystem locations used by import/export commands
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Root of an extracted Notion markdown export
    #[serde(rename = "exports-dir", default = "default_exports_dir")]
    pub exports_dir: PathBuf,

    /// Directory for enrichment result artifacts
    #[serde(rename = "outputs-dir", default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,

    /// Directory holding questions_v{N}.json files
    #[serde(rename = "questions-dir", default = "default_questions_dir")]
    pub questions_dir: PathBuf,
}

impl NotionConfig {
    /// Resolves the integration token from the config or the environment
    pub fn resolve_token(&self) -> Result<String, ConfigError> {
        resolve_secret(self.token.as_deref(), &self.token_env)
    }
}

impl GeminiConfig {
    /// Resolves the API key from the config or the environment
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }
}

fn resolve_secret(inline: Option<&str>, env_var: &str) -> Result<String, ConfigError> {
    if let Some(value) = inline.filter(|v| !v.trim().is_empty()) {
        return Ok(value.trim().to_string());
    }
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingCredential(env_var.to_string())),
    }
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_url: default_notion_api_url(),
            api_version: default_notion_api_version(),
            token: None,
            token_env: default_notion_token_env(),
            page_size: default_page_size(),
            default_retry_after: default_retry_after(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_url: default_gemini_api_url(),
            api_key: None,
            api_key_env: default_gemini_key_env(),
            model: default_model(),
            max_attempts: default_max_attempts(),
            default_retry_delay: default_retry_delay(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            exports_dir: default_exports_dir(),
            outputs_dir: default_outputs_dir(),
            questions_dir: default_questions_dir(),
        }
    }
}

fn default_notion_api_url() -> String {
    "https://api.notion.com/v1".to_string()
}

fn default_notion_api_version() -> String {
    "2022-06-28".to_string()
}

fn default_notion_token_env() -> String {
    "NOTION_TOKEN".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_retry_after() -> u64 {
    1
}

fn default_gemini_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay() -> f64 {
    10.0
}

fn default_database_path() -> String {
    "notion_pages.db".to_string()
}

fn default_exports_dir() -> PathBuf {
    PathBuf::from("notion_notes")
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("answers_to_questions_by_LLM")
}

fn default_questions_dir() -> PathBuf {
    PathBuf::from("questions")
}
