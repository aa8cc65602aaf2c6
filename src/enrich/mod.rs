//! LLM enrichment of stored notes
//!
//! This module contains:
//! - Versioned question sets and their sync into the store
//! - The Gemini client with bounded quota retries
//! - The batch driver that enriches notes longest-first
//! - Result files and their reload into the store

mod artifact;
mod batch;
mod client;
mod questions;

pub use artifact::{
    artifact_file_name, load_outputs, parse_artifact_file_name, write_artifact, ArtifactKey,
};
pub use batch::{select_candidates, BatchDriver, BatchReport};
pub use client::{
    build_gemini_client, parse_response, EnrichmentFailure, EnrichmentOutcome, EnrichmentResult,
    GeminiClient,
};
pub use questions::{
    load_question_set, parse_question_file_name, question_file_name, sync_questions,
    version_label, QuestionSet,
};

use crate::config::Config;
use crate::storage::Storage;
use crate::{HarvestError, Result};
use chrono::{DateTime, Utc};

/// Picks the requested question set version, or the latest stored one
pub fn resolve_questions_version<S: Storage + ?Sized>(
    storage: &S,
    requested: Option<&str>,
) -> Result<String> {
    match requested {
        Some(v) => Ok(v.strip_prefix('v').unwrap_or(v).to_string()),
        None => storage
            .latest_question_version()?
            .ok_or_else(|| HarvestError::QuestionSetNotFound("latest".to_string())),
    }
}

/// Runs a full enrichment batch from configuration
///
/// Results go to the store and to `paths.outputs-dir`.
pub async fn run_analysis<S: Storage + ?Sized>(
    config: &Config,
    storage: &mut S,
    questions_version: Option<&str>,
    since: Option<DateTime<Utc>>,
) -> Result<BatchReport> {
    let version = resolve_questions_version(&*storage, questions_version)?;
    let client = build_gemini_client(&config.gemini)?;

    BatchDriver::new(storage, client, config.gemini.max_attempts)
        .with_outputs_dir(config.paths.outputs_dir.clone())
        .run(&version, since)
        .await
}
