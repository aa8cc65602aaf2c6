use crate::config::types::{Config, GeminiConfig, NotionConfig, PathsConfig, StorageConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_notion_config(&config.notion)?;
    validate_gemini_config(&config.gemini)?;
    validate_storage_config(&config.storage)?;
    validate_paths_config(&config.paths)?;
    Ok(())
}

/// Validates Notion API configuration
fn validate_notion_config(config: &NotionConfig) -> Result<(), ConfigError> {
    validate_api_url("notion.api-url", &config.api_url)?;

    if config.api_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "notion.api-version cannot be empty".to_string(),
        ));
    }

    // Notion caps page_size at 100
    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "notion.page-size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    if config.token.is_none() && config.token_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "notion.token-env cannot be empty when no inline token is given".to_string(),
        ));
    }

    Ok(())
}

/// Validates Gemini configuration
fn validate_gemini_config(config: &GeminiConfig) -> Result<(), ConfigError> {
    validate_api_url("gemini.api-url", &config.api_url)?;

    validate_model_name(&config.model)?;

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "gemini.max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if !config.default_retry_delay.is_finite() || config.default_retry_delay < 0.0 {
        return Err(ConfigError::Validation(format!(
            "gemini.default-retry-delay must be a non-negative number, got {}",
            config.default_retry_delay
        )));
    }

    if config.api_key.is_none() && config.api_key_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "gemini.api-key-env cannot be empty when no inline key is given".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "storage.database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates filesystem paths
fn validate_paths_config(config: &PathsConfig) -> Result<(), ConfigError> {
    for (name, path) in [
        ("paths.exports-dir", &config.exports_dir),
        ("paths.outputs-dir", &config.outputs_dir),
        ("paths.questions-dir", &config.questions_dir),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }
    Ok(())
}

/// Validates an API base URL (http or https)
fn validate_api_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    Ok(())
}

/// Validates a model identifier
///
/// The model is embedded in artifact file names after the version separator,
/// so it must be non-empty and free of path separators.
fn validate_model_name(model: &str) -> Result<(), ConfigError> {
    if model.is_empty() {
        return Err(ConfigError::Validation(
            "gemini.model cannot be empty".to_string(),
        ));
    }

    if !model
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "gemini.model must contain only alphanumerics, '-', '.' or '_', got '{}'",
            model
        )));
    }

    Ok(())
}
