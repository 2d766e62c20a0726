//! Local ingestion of the submission being proved.
//!
//! Unlike history, the current submission is ground truth: anything we cannot
//! read is fatal for the run.

use crate::asset::{AssetEntry, Submission};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures reading the current submission.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Input directory missing or unreadable.
    #[error("failed to read input directory {path}: {source}")]
    InputDir {
        /// Directory that was scanned.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// No `.json` file to ingest.
    #[error("no submission files found in {0}")]
    NoSubmission(PathBuf),
    /// A submission file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A submission file is not a well-formed submission.
    #[error("malformed submission {path}: {source}")]
    Malformed {
        /// Offending file.
        path: PathBuf,
        /// Parse error.
        source: serde_json::Error,
    },
    /// The first submission file does not name its wallet.
    #[error("submission {0} has no userAddress")]
    MissingWallet(PathBuf),
}

/// The current run's submission, flattened.
#[derive(Debug, Clone)]
pub struct LocalSubmission {
    /// Lower-cased wallet identity taken from the first submission file.
    pub wallet: String,
    /// Every entry of every submission file, in file then entry order.
    pub entries: Vec<AssetEntry>,
    /// Files that were ingested, sorted by name.
    pub files: Vec<PathBuf>,
}

/// Lists the `.json` files directly inside `dir`, sorted by file name.
pub fn submission_files(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let read_dir = fs::read_dir(dir).map_err(|source| IngestError::InputDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().map_or(false, |ext| ext == "json")
        })
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

/// Parses one submission file.
pub fn read_submission(path: &Path) -> Result<Submission, IngestError> {
    let bytes = fs::read(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Submission::from_slice(&bytes).map_err(|source| IngestError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads every submission file in `dir` and flattens their entries.
pub fn load_current_submission(dir: &Path) -> Result<LocalSubmission, IngestError> {
    let files = submission_files(dir)?;
    let first = files
        .first()
        .cloned()
        .ok_or_else(|| IngestError::NoSubmission(dir.to_path_buf()))?;

    let mut wallet = None;
    let mut entries = Vec::new();
    for path in &files {
        let submission = read_submission(path)?;
        if wallet.is_none() {
            wallet = Some(
                submission
                    .user_address
                    .as_deref()
                    .map(str::trim)
                    .filter(|addr| !addr.is_empty())
                    .map(str::to_lowercase)
                    .ok_or_else(|| IngestError::MissingWallet(first.clone()))?,
            );
        }
        tracing::debug!(file = %path.display(), tokens = submission.tokens.len(), "ingested submission file");
        entries.extend(submission.tokens);
    }

    let wallet = wallet.ok_or(IngestError::MissingWallet(first))?;
    tracing::info!(wallet = %wallet, files = files.len(), tokens = entries.len(), "loaded current submission");
    Ok(LocalSubmission {
        wallet,
        entries,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("token_proof_ingest_{name}_{unique}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const A: &str = r#"{"userAddress":"0xABCdef","tokens":[
        {"token_metadata":{"chain":"base","contract":"0x1"}},
        {"token_metadata":{"chain":"base","contract":"0x2"}}]}"#;
    const B: &str = r#"{"userAddress":"0xother","tokens":[
        {"token_metadata":{"chain":"vana","contract":"0x3"}}]}"#;

    #[test]
    fn flattens_files_in_name_order() {
        let dir = temp_dir("flatten");
        fs::write(dir.join("b.json"), B).unwrap();
        fs::write(dir.join("a.json"), A).unwrap();
        fs::write(dir.join("readme.txt"), "not json").unwrap();

        let local = load_current_submission(&dir).unwrap();
        assert_eq!(local.wallet, "0xabcdef");
        let contracts: Vec<_> = local.entries.iter().map(|e| e.contract()).collect();
        assert_eq!(contracts, vec!["0x1", "0x2", "0x3"]);
        assert_eq!(local.files.len(), 2);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn malformed_file_is_fatal() {
        let dir = temp_dir("malformed");
        fs::write(dir.join("a.json"), A).unwrap();
        fs::write(dir.join("b.json"), r#"{"userAddress":"0x1","tokens":[{"token_metadata":{}}]}"#)
            .unwrap();
        assert!(matches!(
            load_current_submission(&dir),
            Err(IngestError::Malformed { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_wallet_is_fatal() {
        let dir = temp_dir("wallet");
        fs::write(dir.join("a.json"), r#"{"tokens":[]}"#).unwrap();
        assert!(matches!(
            load_current_submission(&dir),
            Err(IngestError::MissingWallet(_))
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_directory_is_fatal() {
        let dir = temp_dir("empty");
        assert!(matches!(
            load_current_submission(&dir),
            Err(IngestError::NoSubmission(_))
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = std::env::temp_dir().join("token_proof_ingest_does_not_exist_0");
        assert!(matches!(
            load_current_submission(&dir),
            Err(IngestError::InputDir { .. })
        ));
    }
}
