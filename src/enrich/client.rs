//! Gemini generation client with bounded quota retries
//!
//! Unlike the Notion transport, this client never retries forever: quota
//! exhaustion can persist for hours, so after `max_attempts` the call ends
//! with a `QuotaExhausted` record and the batch driver decides what to do.

use crate::config::GeminiConfig;
use crate::enrich::questions::QuestionSet;
use crate::transport::{build_http_client, parse_retry_delay, seconds_to_duration};
use crate::{ConfigError, Result};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::fmt;

const QUOTA_STATUS: &str = "RESOURCE_EXHAUSTED";
const RETRY_INFO_TYPE: &str = "type.googleapis.com/google.rpc.RetryInfo";

/// Why an enrichment call produced no answers
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentFailure {
    /// Quota still exhausted after the last allowed attempt
    QuotaExhausted { message: String },
    /// Any other remote failure; not retried
    Api {
        message: String,
        status_code: Option<u16>,
    },
    /// The model answered, but not with a JSON object
    Parse { message: String, raw: String },
}

impl EnrichmentFailure {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. })
    }
}

impl fmt::Display for EnrichmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaExhausted { message } => write!(f, "API quota exceeded: {}", message),
            Self::Api {
                message,
                status_code: Some(code),
            } => write!(f, "API error ({}): {}", code, message),
            Self::Api { message, .. } => write!(f, "API error: {}", message),
            Self::Parse { message, .. } => write!(f, "{}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    /// Question tag (`q1`, `q2`, ...) to answer
    Answered(Map<String, Value>),
    Failed(EnrichmentFailure),
}

/// Result of one enrichment call, annotated with what produced it
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResult {
    pub questions_version: String,
    pub model: String,
    pub date_executed: String,
    pub outcome: EnrichmentOutcome,
}

impl EnrichmentResult {
    /// Renders the flat artifact object
    ///
    /// Answers (or the error fields) sit next to the meta keys at the top level.
    pub fn to_json(&self) -> Value {
        let mut object = match &self.outcome {
            EnrichmentOutcome::Answered(answers) => answers.clone(),
            EnrichmentOutcome::Failed(failure) => failure_fields(failure),
        };
        object.insert(
            "questions_version".to_string(),
            Value::String(self.questions_version.clone()),
        );
        object.insert("model".to_string(), Value::String(self.model.clone()));
        object.insert(
            "date_executed".to_string(),
            Value::String(self.date_executed.clone()),
        );
        Value::Object(object)
    }

    /// Reads a flat artifact object back
    ///
    /// Missing meta keys come back as empty strings; callers that know the
    /// key from elsewhere (the file name) fill them in.
    pub fn from_json(value: &Value) -> Option<Self> {
        let mut object = value.as_object()?.clone();
        let mut take = |key: &str| match object.remove(key) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let questions_version = take("questions_version");
        let model = take("model");
        let date_executed = take("date_executed");

        let outcome = match object.get("error").and_then(Value::as_str) {
            None => EnrichmentOutcome::Answered(object),
            Some(error) => EnrichmentOutcome::Failed(failure_from_fields(error, &object)),
        };

        Some(Self {
            questions_version,
            model,
            date_executed,
            outcome,
        })
    }
}

fn failure_fields(failure: &EnrichmentFailure) -> Map<String, Value> {
    let value = match failure {
        EnrichmentFailure::QuotaExhausted { message } => json!({
            "error": "API quota exceeded",
            "message": message,
            "status_code": 429,
        }),
        EnrichmentFailure::Api {
            message,
            status_code,
        } => {
            let mut v = json!({ "error": "API error", "message": message });
            if let Some(code) = status_code {
                v["status_code"] = json!(code);
            }
            v
        }
        EnrichmentFailure::Parse { message, raw } => json!({ "error": message, "raw": raw }),
    };
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn failure_from_fields(error: &str, object: &Map<String, Value>) -> EnrichmentFailure {
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(error)
        .to_string();
    let status_code = object
        .get("status_code")
        .and_then(Value::as_u64)
        .and_then(|c| u16::try_from(c).ok());

    if error == "API quota exceeded" {
        EnrichmentFailure::QuotaExhausted { message }
    } else if let Some(raw) = object.get("raw").and_then(Value::as_str) {
        EnrichmentFailure::Parse {
            message: error.to_string(),
            raw: raw.to_string(),
        }
    } else {
        EnrichmentFailure::Api {
            message,
            status_code,
        }
    }
}

/// One failed generate call
#[derive(Debug)]
enum CallError {
    Quota {
        message: String,
        retry_delay: Option<Value>,
    },
    Other {
        message: String,
        status_code: Option<u16>,
    },
}

/// Client for the `generateContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
    default_retry_delay: f64,
}

impl GeminiClient {
    pub fn new(
        http: Client,
        api_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        default_retry_delay: f64,
    ) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            default_retry_delay,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answers a question set for one note
    ///
    /// # Arguments
    ///
    /// * `content` - The note body
    /// * `questions` - The question set to answer
    /// * `questions_version` - Version label recorded on the result
    /// * `max_attempts` - Calls allowed while the quota is exhausted
    ///
    /// # Returns
    ///
    /// Always a result record; failures are carried in the outcome.
    pub async fn enrich(
        &self,
        content: &str,
        questions: &QuestionSet,
        questions_version: &str,
        max_attempts: u32,
    ) -> EnrichmentResult {
        let prompt = questions.build_prompt(content);
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        let outcome = loop {
            attempt += 1;
            match self.generate(&prompt).await {
                Ok(text) => break parse_response(&text),
                Err(CallError::Quota {
                    message,
                    retry_delay,
                }) => {
                    let delay = parse_retry_delay(retry_delay.as_ref(), self.default_retry_delay);
                    if attempt >= max_attempts {
                        tracing::error!("Max retries ({}) exceeded for quota errors", max_attempts);
                        break EnrichmentOutcome::Failed(EnrichmentFailure::QuotaExhausted {
                            message: format!(
                                "Gemini API quota exceeded. Suggested retry delay: {}s ({})",
                                delay, message
                            ),
                        });
                    }
                    tracing::warn!(
                        "Quota exceeded. Retrying in {:.1}s (attempt {}/{})",
                        delay,
                        attempt,
                        max_attempts
                    );
                    tokio::time::sleep(seconds_to_duration(delay)).await;
                }
                Err(CallError::Other {
                    message,
                    status_code,
                }) => {
                    break EnrichmentOutcome::Failed(EnrichmentFailure::Api {
                        message,
                        status_code,
                    })
                }
            }
        };

        EnrichmentResult {
            questions_version: questions_version.to_string(),
            model: self.model.clone(),
            date_executed: Utc::now().to_rfc3339(),
            outcome,
        }
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, CallError> {
        let url = format!("{}/models/{}:generateContent", self.api_url, self.model);
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Other {
                message: e.without_url().to_string(),
                status_code: None,
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| CallError::Other {
            message: e.without_url().to_string(),
            status_code: Some(status.as_u16()),
        })?;

        if !status.is_success() {
            return Err(classify_error(status, &text));
        }

        let payload: Value = serde_json::from_str(&text).map_err(|e| CallError::Other {
            message: format!("Invalid response body: {}", e),
            status_code: Some(status.as_u16()),
        })?;
        tracing::debug!("Gemini answered with status {}", status);

        response_text(&payload).ok_or_else(|| CallError::Other {
            message: "Response contained no candidate text".to_string(),
            status_code: Some(status.as_u16()),
        })
    }
}

/// Sorts an error response into quota exhaustion or a plain failure
fn classify_error(status: StatusCode, body: &str) -> CallError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = &parsed["error"];
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(500).collect());

    let exhausted = error["status"].as_str() == Some(QUOTA_STATUS) || body.contains(QUOTA_STATUS);
    if status == StatusCode::TOO_MANY_REQUESTS && exhausted {
        let retry_delay = error["details"].as_array().and_then(|details| {
            details
                .iter()
                .find(|d| d["@type"].as_str() == Some(RETRY_INFO_TYPE))
                .or_else(|| details.iter().find(|d| d.get("retryDelay").is_some()))
                .and_then(|d| d.get("retryDelay").cloned())
        });
        return CallError::Quota {
            message,
            retry_delay,
        };
    }

    CallError::Other {
        message,
        status_code: Some(status.as_u16()),
    }
}

/// Concatenates the text parts of the first candidate
fn response_text(payload: &Value) -> Option<String> {
    let parts = payload["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    (!text.is_empty()).then_some(text)
}

/// Strips the ```json fence and parses the answer object
pub fn parse_response(text: &str) -> EnrichmentOutcome {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix("```json").unwrap_or(trimmed).trim_start();
    let body = body.strip_suffix("```").unwrap_or(body).trim();

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(answers)) => EnrichmentOutcome::Answered(answers),
        Ok(_) => EnrichmentOutcome::Failed(EnrichmentFailure::Parse {
            message: "Failed to parse Gemini response: expected a JSON object".to_string(),
            raw: text.to_string(),
        }),
        Err(e) => EnrichmentOutcome::Failed(EnrichmentFailure::Parse {
            message: format!("Failed to parse Gemini response: {}", e),
            raw: text.to_string(),
        }),
    }
}

/// Builds the Gemini client from configuration
pub fn build_gemini_client(config: &GeminiConfig) -> Result<GeminiClient> {
    let api_key = config.resolve_api_key()?;
    if config.model.trim().is_empty() {
        return Err(ConfigError::Validation("gemini.model must not be empty".into()).into());
    }

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let http = build_http_client(headers)?;

    Ok(GeminiClient::new(
        http,
        &config.api_url,
        api_key,
        &config.model,
        config.default_retry_delay,
    ))
}
