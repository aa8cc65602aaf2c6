//! Retry-delay parsing shared by the Notion transport and the Gemini client
//!
//! Notion sends a `Retry-After` header in whole (occasionally fractional)
//! seconds. Gemini embeds a compact duration string such as `"7s"` in the
//! `RetryInfo` detail of its error payload. Both fall back to a configured
//! default when the hint is absent or malformed.

use serde_json::Value;
use std::time::Duration;

/// Parses a `Retry-After` header value into a sleep duration
///
/// Accepts an integer or decimal number of seconds, capped at
/// [`MAX_RETRY_DELAY`]. HTTP-date values, values too large for a `Duration`
/// and anything else unparsable yield `fallback`.
pub fn parse_retry_after(value: Option<&str>, fallback: Duration) -> Duration {
    value
        .and_then(|v| parse_seconds(v.trim()))
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(|delay| delay.min(MAX_RETRY_DELAY))
        .unwrap_or(fallback)
}

/// Parses a Gemini retry delay into seconds
///
/// # Examples
///
/// ```
/// use notion_harvest::transport::parse_retry_delay;
/// use serde_json::json;
///
/// assert_eq!(parse_retry_delay(Some(&json!("7s")), 10.0), 7.0);
/// assert_eq!(parse_retry_delay(Some(&json!("2.5s")), 10.0), 2.5);
/// assert_eq!(parse_retry_delay(Some(&json!(10)), 7.0), 10.0);
/// assert_eq!(parse_retry_delay(None, 10.0), 10.0);
/// ```
pub fn parse_retry_delay(value: Option<&Value>, fallback: f64) -> f64 {
    let parsed = match value {
        Some(Value::String(s)) => {
            let s = s.trim();
            parse_seconds(s.strip_suffix('s').unwrap_or(s))
        }
        Some(Value::Number(n)) => n.as_f64().filter(|secs| secs.is_finite() && *secs >= 0.0),
        _ => None,
    };
    parsed.unwrap_or(fallback)
}

/// Converts a seconds value into a duration
///
/// Negative and NaN input clamps to zero; anything longer than
/// [`MAX_RETRY_DELAY`] clamps to it.
pub fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds)
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

/// Longest sleep a server-supplied retry delay can request
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60 * 60);

fn parse_seconds(s: &str) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
}
