//! Enrichment result files
//!
//! Each result is written as `gemini_{node_id}_v{version}_{model}.json` so a
//! batch can be inspected, shared, or reloaded into a fresh store.

use crate::enrich::client::{EnrichmentOutcome, EnrichmentResult};
use crate::enrich::questions::version_label;
use crate::state::UNKNOWN_SENTINEL;
use crate::storage::{EnrichmentRow, Storage};
use crate::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};

const PREFIX: &str = "gemini_";
const EXTENSION: &str = ".json";

/// Identifiers recovered from an artifact file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    pub note_id: String,
    /// Bare version number, without the `v`
    pub version: String,
    pub model: String,
}

/// Builds the artifact file name for one result
pub fn artifact_file_name(note_id: &str, version: &str, model: &str) -> String {
    let version = version.strip_prefix('v').unwrap_or(version);
    format!("{}{}_v{}_{}{}", PREFIX, note_id, version, model, EXTENSION)
}

/// Splits an artifact file name back into its key
///
/// The note id ends at the first `_v`; the version ends at the next `_`.
/// Underscores in the model part are read back as hyphens.
///
/// # Example
///
/// ```
/// use notion_harvest::enrich::parse_artifact_file_name;
///
/// let key = parse_artifact_file_name("gemini_abc123_v2_gemini-2.0-flash.json").unwrap();
/// assert_eq!(key.note_id, "abc123");
/// assert_eq!(key.version, "2");
/// assert_eq!(key.model, "gemini-2.0-flash");
/// ```
pub fn parse_artifact_file_name(name: &str) -> Option<ArtifactKey> {
    let stem = name.strip_prefix(PREFIX)?.strip_suffix(EXTENSION)?;
    let (note_id, rest) = stem.split_once("_v")?;
    let (version, model) = rest.split_once('_')?;

    if note_id.is_empty() || version.is_empty() || model.is_empty() {
        return None;
    }

    Some(ArtifactKey {
        note_id: note_id.to_string(),
        version: version.to_string(),
        model: model.replace('_', "-"),
    })
}

/// Writes a result as pretty-printed JSON
///
/// # Returns
///
/// Path of the written file
pub fn write_artifact(
    outputs_dir: &Path,
    note_id: &str,
    result: &EnrichmentResult,
) -> Result<PathBuf> {
    std::fs::create_dir_all(outputs_dir)?;
    let path = outputs_dir.join(artifact_file_name(
        note_id,
        &result.questions_version,
        &result.model,
    ));
    std::fs::write(&path, serde_json::to_string_pretty(&result.to_json())?)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(path)
}

/// Loads result files into the `gemini_analysis` table
///
/// Unparsable names, unreadable or malformed JSON, and error records are
/// skipped with a warning.
///
/// # Returns
///
/// Number of rows upserted
pub fn load_outputs<S: Storage + ?Sized>(storage: &mut S, outputs_dir: &Path) -> Result<usize> {
    if !outputs_dir.is_dir() {
        tracing::warn!("Outputs directory {} does not exist", outputs_dir.display());
        return Ok(0);
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(outputs_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(EXTENSION) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    let mut loaded = 0;
    for name in names {
        let Some(key) = parse_artifact_file_name(&name) else {
            tracing::warn!("Skipping {}: unrecognized file name", name);
            continue;
        };

        let value = match std::fs::read_to_string(outputs_dir.join(&name))
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|e| e.to_string()))
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", name, e);
                continue;
            }
        };

        let Some(result) = EnrichmentResult::from_json(&value) else {
            tracing::warn!("Skipping {}: not a JSON object", name);
            continue;
        };

        let answers = match result.outcome {
            EnrichmentOutcome::Answered(answers) => answers,
            EnrichmentOutcome::Failed(failure) => {
                tracing::warn!("Skipping {}: error record ({})", name, failure);
                continue;
            }
        };

        let date_executed = if result.date_executed.is_empty() {
            UNKNOWN_SENTINEL.to_string()
        } else {
            result.date_executed
        };

        storage.upsert_enrichment(&EnrichmentRow {
            note_id: key.note_id,
            questions_version: version_label(&key.version),
            model: key.model,
            date_executed,
            answers,
        })?;
        loaded += 1;
    }

    tracing::info!("Loaded {} results from {}", loaded, outputs_dir.display());
    Ok(loaded)
}
