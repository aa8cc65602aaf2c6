use crate::enrich::artifact::write_artifact;
use crate::enrich::client::{EnrichmentFailure, EnrichmentOutcome, GeminiClient};
use crate::enrich::questions::{load_question_set, version_label};
use crate::storage::{EnrichmentRow, NodeRecord, Storage};
use crate::{HarvestError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

/// Counters for one enrichment batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub candidates: usize,
    pub enriched: usize,
    pub skipped_existing: usize,
    pub skipped_errors: usize,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} candidates: {} enriched, {} already done, {} failed",
            self.candidates, self.enriched, self.skipped_existing, self.skipped_errors
        )
    }
}

/// Runs enrichment over every stored note with content
pub struct BatchDriver<'a, S: Storage + ?Sized> {
    storage: &'a mut S,
    client: GeminiClient,
    max_attempts: u32,
    outputs_dir: Option<PathBuf>,
}

impl<'a, S: Storage + ?Sized> BatchDriver<'a, S> {
    pub fn new(storage: &'a mut S, client: GeminiClient, max_attempts: u32) -> Self {
        Self {
            storage,
            client,
            max_attempts,
            outputs_dir: None,
        }
    }

    /// Also write every result as a file under `dir`
    pub fn with_outputs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.outputs_dir = Some(dir.into());
        self
    }

    /// Enriches candidates longest-first under one question set version
    ///
    /// # Arguments
    ///
    /// * `questions_version` - Stored question set version (`"3"`). Results are
    ///   labelled with the set's own `version` field when it has one, else `"v3"`.
    /// * `since` - Keep only notes created or modified at or after this instant
    ///
    /// # Returns
    ///
    /// * `Ok(BatchReport)` - Every candidate was handled
    /// * `Err(HarvestError::QuotaExhausted)` - Quota ran out; nothing after that note was attempted
    pub async fn run(
        &mut self,
        questions_version: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<BatchReport> {
        let questions = load_question_set(&*self.storage, questions_version)?;
        // A label inside the question file wins over the stored version key
        let label = questions
            .version
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| version_label(questions_version));
        let model = self.client.model().to_string();

        let candidates = select_candidates(self.storage.enrichment_candidates()?, since);
        let mut report = BatchReport {
            candidates: candidates.len(),
            ..BatchReport::default()
        };
        tracing::info!(
            "Enriching {} notes with question set {} on {}",
            candidates.len(),
            label,
            model
        );

        let start = Instant::now();
        for (index, node) in candidates.iter().enumerate() {
            if self.storage.has_enrichment(&node.id, &label, &model)? {
                tracing::debug!("{} already enriched for {} / {}", node.id, label, model);
                report.skipped_existing += 1;
                continue;
            }

            tracing::info!(
                "[{}/{}] Enriching {} ({} chars)",
                index + 1,
                candidates.len(),
                node.id,
                node.content_length
            );
            let content = node.content.as_deref().unwrap_or_default();
            let result = self
                .client
                .enrich(content, &questions, &label, self.max_attempts)
                .await;

            if let Some(dir) = &self.outputs_dir {
                write_artifact(dir, &node.id, &result)?;
            }

            match result.outcome {
                EnrichmentOutcome::Answered(answers) => {
                    self.storage.upsert_enrichment(&EnrichmentRow {
                        note_id: node.id.clone(),
                        questions_version: result.questions_version,
                        model: result.model,
                        date_executed: result.date_executed,
                        answers,
                    })?;
                    report.enriched += 1;
                }
                EnrichmentOutcome::Failed(EnrichmentFailure::QuotaExhausted { message }) => {
                    tracing::error!("Quota exhausted on {}. Stopping batch.", node.id);
                    return Err(HarvestError::QuotaExhausted {
                        node_id: node.id.clone(),
                        message,
                    });
                }
                EnrichmentOutcome::Failed(failure) => {
                    tracing::warn!("Skipping {}: {}", node.id, failure);
                    report.skipped_errors += 1;
                }
            }
        }

        tracing::info!("{} in {:.1}s", report, start.elapsed().as_secs_f64());
        Ok(report)
    }
}

/// Applies the `since` cutoff, keeping the store's longest-first order
///
/// A note matches when either watermark parses and is at or after the
/// cutoff; unknown or malformed watermarks never match.
pub fn select_candidates(nodes: Vec<NodeRecord>, since: Option<DateTime<Utc>>) -> Vec<NodeRecord> {
    let Some(cutoff) = since else {
        return nodes;
    };

    nodes
        .into_iter()
        .filter(|node| {
            [&node.created_at, &node.modified_at]
                .into_iter()
                .flatten()
                .filter_map(|w| w.as_datetime())
                .any(|t| t >= cutoff)
        })
        .collect()
}
