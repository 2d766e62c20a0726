//! Proof record and the `results.json` writer.

use crate::scoring::EntryScore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the proof record inside the output directory.
pub const RESULTS_FILE: &str = "results.json";

/// Failures writing the proof record.
#[derive(Debug, Error)]
pub enum ResultsError {
    /// Filesystem failure.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Serialization failure.
    #[error("failed to serialize proof: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Provenance and partition counts reported alongside the scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofAttributes {
    /// Entries in the current submission.
    pub total_tokens: usize,
    /// Entries absent from history.
    pub novel_tokens: usize,
    /// Entries already present in history.
    pub historical_tokens: usize,
    /// Historical submissions assembled.
    pub history_submissions: usize,
    /// Mapping entries served from cache.
    pub cache_hits: usize,
    /// Mapping entries served by secure retrieval.
    pub retrieved: usize,
    /// Mapping entries contributing nothing.
    pub skipped: usize,
    /// Signature ownership verdict; `None` when not checked.
    pub signature_verified: Option<bool>,
}

/// Reward metadata and per-entry scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofMetadata {
    /// Data liquidity pool identifier.
    pub dlp_id: u64,
    /// When the proof was produced.
    pub submission_time: DateTime<Utc>,
    /// Tokens granted for the novel entries.
    pub token_rewarded: u64,
    /// Scores of the novel entries that passed the allowlists.
    pub metadata: Vec<EntryScore>,
}

/// The proof record written to `results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofResponse {
    /// Data liquidity pool identifier.
    pub dlp_id: u64,
    /// False only when the run failed.
    pub valid: bool,
    /// Reward score in `[0, 1]`.
    pub score: f64,
    /// Mean authenticity of scored entries.
    pub authenticity: f64,
    /// Mean ownership of scored entries.
    pub ownership: f64,
    /// Mean quality of scored entries.
    pub quality: f64,
    /// Novelty ratio of the submission.
    pub uniqueness: f64,
    /// Counts and provenance.
    pub attributes: ProofAttributes,
    /// Reward metadata.
    pub metadata: ProofMetadata,
    /// Cause of a failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProofResponse {
    /// Record reporting a failed run: invalid, all scores zero.
    pub fn failed(dlp_id: u64, cause: impl ToString) -> Self {
        Self {
            dlp_id,
            valid: false,
            score: 0.0,
            authenticity: 0.0,
            ownership: 0.0,
            quality: 0.0,
            uniqueness: 0.0,
            attributes: ProofAttributes::default(),
            metadata: ProofMetadata {
                dlp_id,
                submission_time: Utc::now(),
                token_rewarded: 0,
                metadata: Vec::new(),
            },
            error: Some(cause.to_string()),
        }
    }
}

/// Writes `response` pretty-printed to `output_dir/results.json`.
pub fn write_results(
    output_dir: impl AsRef<Path>,
    response: &ProofResponse,
) -> Result<PathBuf, ResultsError> {
    let dir = output_dir.as_ref();
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ResultsError::Io { path, source }
    };
    create_dir_all(dir).map_err(io_err(dir))?;
    let path = dir.join(RESULTS_FILE);
    let file = File::create(&path).map_err(io_err(&path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, response)?;
    writer.write_all(b"\n").map_err(io_err(&path))?;
    writer.flush().map_err(io_err(&path))?;
    tracing::info!(path = %path.display(), valid = response.valid, score = response.score, "wrote proof");
    Ok(path)
}
