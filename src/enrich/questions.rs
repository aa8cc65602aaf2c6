//! Versioned question sets and prompt construction
//!
//! Question sets live on disk as `questions_v{N}.json`:
//!
//! ```json
//! {
//!   "instructions": "You are reviewing a personal note...",
//!   "questions": ["What is the main topic?", "Which people are mentioned?"],
//!   "version": "v2"
//! }
//! ```
//!
//! `sync_questions` copies them into the `questions` table; enrichment always
//! reads the stored copy.

use crate::storage::{QuestionSetRecord, Storage};
use crate::{HarvestError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

const FILE_PREFIX: &str = "questions_v";
const FILE_SUFFIX: &str = ".json";

/// Instructions plus an ordered list of questions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub instructions: String,
    pub questions: Vec<String>,
    /// Free-form label carried over from the source file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl QuestionSet {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Builds the generation prompt for one note
    ///
    /// The model is asked to answer inside a fenced JSON block keyed `q1..qN`.
    pub fn build_prompt(&self, note_content: &str) -> String {
        let numbered = self
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {}", i + 1, q))
            .collect::<Vec<_>>()
            .join("\n");

        let last = self.questions.len().max(1);
        let mut format_lines = vec!["  \"q1\": \"Answer to question 1\"".to_string()];
        if last > 1 {
            format_lines.push("  ...".to_string());
            format_lines.push(format!("  \"q{}\": \"Answer to question {}\"", last, last));
        }

        format!(
            "\n{}\n\nQuestions:\n{}\n\nInput note:\n{}\n\nOutput format:\n```json\n{{\n{}\n}}\n```\n",
            self.instructions,
            numbered,
            note_content,
            format_lines.join(",\n")
        )
    }
}

/// Label under which results for a version are stored (`"3"` -> `"v3"`)
pub fn version_label(version: &str) -> String {
    if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{}", version)
    }
}

/// File name of a question set source file
pub fn question_file_name(version: &str) -> String {
    format!("{}{}{}", FILE_PREFIX, version, FILE_SUFFIX)
}

/// Extracts the numeric version from `questions_v{N}.json`
pub fn parse_question_file_name(name: &str) -> Option<&str> {
    let version = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    (!version.is_empty() && version.chars().all(|c| c.is_ascii_digit())).then_some(version)
}

/// Copies question set files into the store
///
/// # Arguments
///
/// * `storage` - The store to write into
/// * `questions_dir` - Directory holding `questions_v{N}.json` files
/// * `version` - Sync only this version (all versions when `None`)
/// * `force` - Replace versions that are already stored
///
/// # Returns
///
/// Number of question sets written
pub fn sync_questions<S: Storage + ?Sized>(
    storage: &mut S,
    questions_dir: &Path,
    version: Option<&str>,
    force: bool,
) -> Result<usize> {
    let versions: Vec<String> = match version {
        Some(v) => {
            if !questions_dir.join(question_file_name(v)).is_file() {
                return Err(HarvestError::QuestionSetNotFound(v.to_string()));
            }
            vec![v.to_string()]
        }
        None => {
            let mut found = Vec::new();
            for entry in std::fs::read_dir(questions_dir)? {
                let entry = entry?;
                if let Some(v) = entry.file_name().to_str().and_then(parse_question_file_name) {
                    found.push(v.to_string());
                }
            }
            found.sort_by_key(|v| v.parse::<u64>().unwrap_or(u64::MAX));
            found
        }
    };

    let mut written = 0;
    for v in versions {
        let raw = std::fs::read_to_string(questions_dir.join(question_file_name(&v)))?;
        let set = QuestionSet::from_json(&raw)?;

        let record = QuestionSetRecord {
            version: v.clone(),
            date_updated: Utc::now().to_rfc3339(),
            questions_json: set.to_json()?,
        };

        if storage.insert_question_set(&record, force)? {
            tracing::info!(
                "Stored question set v{} ({} questions)",
                v,
                set.questions.len()
            );
            written += 1;
        } else {
            tracing::info!("Question set v{} already stored. Skipping.", v);
        }
    }

    Ok(written)
}

/// Loads a stored question set
///
/// # Returns
///
/// `HarvestError::QuestionSetNotFound` if the version was never synced
pub fn load_question_set<S: Storage + ?Sized>(storage: &S, version: &str) -> Result<QuestionSet> {
    let record = storage
        .get_question_set(version)?
        .ok_or_else(|| HarvestError::QuestionSetNotFound(version.to_string()))?;
    Ok(QuestionSet::from_json(&record.questions_json)?)
}
