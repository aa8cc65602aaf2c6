//! Outbound request layer
//!
//! This module contains:
//! - The rate-limited Notion transport (unbounded sleep-and-retry on 429)
//! - Retry-delay parsing shared with the Gemini enrichment client

mod client;
mod retry;

pub use client::{build_http_client, build_notion_client, ApiRequest, RateLimitedClient};
pub use retry::{parse_retry_after, parse_retry_delay, seconds_to_duration, MAX_RETRY_DELAY};
