//! Rate-limited HTTP transport for the Notion API
//!
//! This module handles all outbound Notion requests, including:
//! - Building an HTTP client with the bearer credential and API version headers
//! - Re-issuing a request after a 429 for as long as the server keeps asking
//! - Turning every other non-success status into an error for the caller

use crate::config::NotionConfig;
use crate::transport::retry::parse_retry_after;
use crate::{ConfigError, HarvestError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Maximum number of response-body characters kept in a status error
const ERROR_BODY_LIMIT: usize = 500;

/// A replayable API request
///
/// The transport re-sends the identical request after a rate-limit backoff,
/// so requests are described by value rather than as a consumed builder.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Appends a query parameter
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// HTTP client that sleeps and retries on 429 responses
///
/// The retry loop has no upper bound. Callers that need a bounded number of
/// attempts must wrap it themselves.
#[derive(Debug, Clone)]
pub struct RateLimitedClient {
    http: Client,
    base_url: String,
    default_retry_after: Duration,
}

impl RateLimitedClient {
    /// Wraps an already configured reqwest client
    pub fn new(http: Client, base_url: &str, default_retry_after: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_retry_after,
        }
    }

    /// Joins a request path onto the base URL
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends a request, retrying indefinitely while the server answers 429
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 2xx | Return the response |
    /// | HTTP 429 | Sleep for Retry-After (or the default), resend |
    /// | Other HTTP status | Immediate `HarvestError::Status` |
    /// | Network error | Immediate `HarvestError::Http` |
    pub async fn send(&self, request: &ApiRequest) -> Result<Response> {
        let url = self.url_for(&request.path);

        loop {
            let mut builder = self.http.request(request.method.clone(), &url);
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|source| HarvestError::Http {
                url: url.clone(),
                source,
            })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let hint = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok());
                let delay = parse_retry_after(hint, self.default_retry_after);
                tracing::warn!("Rate limited on {}. Retrying after {:?}...", url, delay);
                tokio::time::sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(HarvestError::Status {
                    url,
                    status: status.as_u16(),
                    body: body.chars().take(ERROR_BODY_LIMIT).collect(),
                });
            }

            tracing::trace!("{} {} -> {}", request.method, url, status);
            return Ok(response);
        }
    }

    /// Sends a request and decodes the JSON body
    pub async fn send_json(&self, request: &ApiRequest) -> Result<Value> {
        let response = self.send(request).await?;
        let url = response.url().to_string();
        response
            .json::<Value>()
            .await
            .map_err(|source| HarvestError::Http { url, source })
    }
}

/// Builds the Notion transport from configuration
///
/// Resolves the integration token, then installs the bearer credential,
/// the fixed Notion-Version header and a JSON content type as default headers.
///
/// # Example
///
/// ```no_run
/// use notion_harvest::config::NotionConfig;
/// use notion_harvest::transport::build_notion_client;
///
/// let config = NotionConfig {
///     token: Some("secret_abc".to_string()),
///     ..NotionConfig::default()
/// };
///
/// let client = build_notion_client(&config).unwrap();
/// ```
pub fn build_notion_client(config: &NotionConfig) -> Result<RateLimitedClient> {
    let token = config.resolve_token()?;

    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ConfigError::Validation("Notion token contains invalid characters".into()))?;
    headers.insert(AUTHORIZATION, bearer);
    let version = HeaderValue::from_str(&config.api_version)
        .map_err(|_| ConfigError::Validation("notion.api-version is not a valid header".into()))?;
    headers.insert("Notion-Version", version);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let http = build_http_client(headers)?;

    Ok(RateLimitedClient::new(
        http,
        &config.api_url,
        Duration::from_secs(config.default_retry_after),
    ))
}

/// Builds a reqwest client with the crate user agent and timeouts
pub fn build_http_client(default_headers: HeaderMap) -> Result<Client> {
    let user_agent = format!("notion-harvest/{}", env!("CARGO_PKG_VERSION"));

    let client = Client::builder()
        .user_agent(user_agent)
        .default_headers(default_headers)
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}
