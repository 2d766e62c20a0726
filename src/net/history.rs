//! Assembles a wallet's historical corpus from its mapping entries.
//!
//! Per entry: cache first, secure retrieval on a miss, nothing on failure.
//! Entries run through a bounded order-preserving stream so the corpus lists
//! submissions in mapping order whatever the completion order.

use crate::asset::{AssetEntry, MappingEntry, Submission, SubmissionId};
use crate::net::cache::CacheClient;
use crate::net::retrieval::SecureRetrieval;
use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;

/// Fatal assembly failures. Per-entry degradation is never an error.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Retrieval was needed but no shared secret is configured.
    #[error("SIGNATURE is required to decrypt history upload {submission_id}")]
    MissingSecret {
        /// Upload that needed retrieval.
        submission_id: SubmissionId,
    },
}

/// The wallet's historical submissions for this run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalCorpus {
    /// Submissions in mapping order, records in container order.
    pub submissions: Vec<Submission>,
    /// Mapping entries served from cache.
    pub cache_hits: usize,
    /// Mapping entries served by secure retrieval.
    pub retrieved: usize,
    /// Mapping entries that contributed nothing.
    pub skipped: usize,
}

impl HistoricalCorpus {
    /// Every historical entry.
    pub fn entries(&self) -> impl Iterator<Item = &AssetEntry> {
        self.submissions.iter().flat_map(|s| s.tokens.iter())
    }

    /// Clones every historical entry into one sequence.
    pub fn flatten(&self) -> Vec<AssetEntry> {
        self.entries().cloned().collect()
    }
}

enum Outcome {
    Cached(Vec<Submission>),
    Retrieved(Vec<Submission>),
    Skipped,
}

/// Cache-then-retrieval history assembler.
#[derive(Clone)]
pub struct HistoryAssembler {
    cache: CacheClient,
    retrieval: SecureRetrieval,
    secret: Option<String>,
    concurrency: usize,
}

impl HistoryAssembler {
    /// Assembler decrypting with `secret`, processing `concurrency` entries at once.
    pub fn new(
        cache: CacheClient,
        retrieval: SecureRetrieval,
        secret: Option<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            cache,
            retrieval,
            secret: secret.filter(|s| !s.trim().is_empty()),
            concurrency: concurrency.max(1),
        }
    }

    /// Builds the corpus reachable from `mapping`.
    pub async fn assemble(&self, mapping: &[MappingEntry]) -> Result<HistoricalCorpus, HistoryError> {
        let outcomes: Vec<Outcome> = stream::iter(mapping.iter().map(|entry| self.resolve_entry(entry)))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut corpus = HistoricalCorpus::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Cached(submissions) => {
                    corpus.cache_hits += 1;
                    corpus.submissions.extend(submissions);
                }
                Outcome::Retrieved(submissions) => {
                    corpus.retrieved += 1;
                    corpus.submissions.extend(submissions);
                }
                Outcome::Skipped => corpus.skipped += 1,
            }
        }
        tracing::info!(
            mapping_entries = mapping.len(),
            submissions = corpus.submissions.len(),
            cache_hits = corpus.cache_hits,
            retrieved = corpus.retrieved,
            skipped = corpus.skipped,
            "assembled history"
        );
        Ok(corpus)
    }

    async fn resolve_entry(&self, entry: &MappingEntry) -> Result<Outcome, HistoryError> {
        let id = &entry.submission_id;
        if let Some(submissions) = self.cache.lookup(id).await {
            tracing::debug!(submission_id = %id, submissions = submissions.len(), "history served from cache");
            return Ok(Outcome::Cached(submissions));
        }
        let Some(locator) = entry.usable_locator() else {
            tracing::warn!(submission_id = %id, "mapping entry has no locator, skipping");
            return Ok(Outcome::Skipped);
        };
        let secret = self.secret.as_deref().ok_or_else(|| HistoryError::MissingSecret {
            submission_id: id.clone(),
        })?;
        match self.retrieval.fetch(locator, secret).await {
            Ok(records) => Ok(Outcome::Retrieved(parse_records(id, records))),
            Err(err) => {
                tracing::warn!(submission_id = %id, error = %err, "history retrieval failed, skipping");
                Ok(Outcome::Skipped)
            }
        }
    }
}

fn parse_records(id: &SubmissionId, records: Vec<Vec<u8>>) -> Vec<Submission> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, bytes)| match Submission::from_historical_slice(&bytes) {
            Ok(submission) => Some(submission),
            Err(err) => {
                tracing::warn!(submission_id = %id, record = index, error = %err, "skipping malformed history record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::tests::build_zip;
    use crate::dedupe::dedupe;
    use crate::envelope::{seal, tests::TEST_PARAMS};
    use crate::net::cache::tests::MemoryBackend;
    use crate::net::retrieval::tests::MemoryFetcher;
    use crate::net::retrieval::HttpFetcher;
    use crate::net::testing::TestServer;
    use reqwest::Client;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    const SECRET: &str = "0xsignature";

    fn doc(contracts: &[&str]) -> String {
        let tokens = contracts
            .iter()
            .map(|c| format!(r#"{{"token_metadata":{{"chain":"base","contract":"{c}"}}}}"#))
            .collect::<Vec<_>>()
            .join(",");
        format!(r#"{{"userAddress":"0xw","tokens":[{tokens}]}}"#)
    }

    fn retrieval(routes: Vec<(&str, Vec<u8>)>) -> SecureRetrieval {
        let map: HashMap<String, Vec<u8>> = routes
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        SecureRetrieval::new(Arc::new(MemoryFetcher(map)))
    }

    fn contracts(corpus: &HistoricalCorpus) -> Vec<String> {
        corpus.entries().map(|e| e.contract().to_string()).collect()
    }

    #[tokio::test]
    async fn cached_entry_survives_failed_download() {
        let cache = CacheClient::from_backend(Arc::new(MemoryBackend::with(&[("1", doc(&["0xAAA"]).as_str())])));
        let assembler = HistoryAssembler::new(cache, retrieval(vec![]), Some(SECRET.into()), 4);
        let mapping = vec![
            MappingEntry::new("1", "mem://one"),
            MappingEntry::new("2", "mem://unreachable"),
        ];

        let corpus = assembler.assemble(&mapping).await.unwrap();
        assert_eq!(contracts(&corpus), vec!["0xAAA"]);
        assert_eq!((corpus.cache_hits, corpus.retrieved, corpus.skipped), (1, 0, 1));
    }

    #[tokio::test]
    async fn cache_does_not_change_the_outcome() {
        let first = doc(&["0x1", "0x2"]);
        let second = doc(&["0x3"]);
        let routes = || {
            vec![
                ("mem://1", seal(first.as_bytes(), SECRET, TEST_PARAMS).unwrap()),
                (
                    "mem://2",
                    seal(&build_zip(&[("s.json", second.as_bytes())]), SECRET, TEST_PARAMS).unwrap(),
                ),
            ]
        };
        let mapping = vec![MappingEntry::new("1", "mem://1"), MappingEntry::new("2", "mem://2")];
        let current = vec![
            AssetEntry::new("base", "0X2"),
            AssetEntry::new("base", "0x9"),
            AssetEntry::new("BASE", "0x3"),
        ];

        let uncached = HistoryAssembler::new(CacheClient::disabled(), retrieval(routes()), Some(SECRET.into()), 2)
            .assemble(&mapping)
            .await
            .unwrap();
        let cache = CacheClient::from_backend(Arc::new(MemoryBackend::with(&[("1", first.as_str()), ("2", second.as_str())])));
        let cached = HistoryAssembler::new(cache, retrieval(routes()), Some(SECRET.into()), 2)
            .assemble(&mapping)
            .await
            .unwrap();

        assert_eq!(uncached.retrieved, 2);
        assert_eq!(cached.cache_hits, 2);
        assert_eq!(contracts(&uncached), contracts(&cached));
        assert_eq!(
            dedupe(&current, &uncached.flatten()),
            dedupe(&current, &cached.flatten())
        );
    }

    #[tokio::test]
    async fn partial_failure_keeps_the_rest_in_mapping_order() {
        let routes = vec![
            ("mem://a", seal(doc(&["0xa"]).as_bytes(), SECRET, TEST_PARAMS).unwrap()),
            ("mem://bad-key", seal(doc(&["0xb"]).as_bytes(), "other", TEST_PARAMS).unwrap()),
            ("mem://c", seal(doc(&["0xc"]).as_bytes(), SECRET, TEST_PARAMS).unwrap()),
        ];
        let mapping = vec![
            MappingEntry::new("a", "mem://a"),
            MappingEntry::new("b", "mem://bad-key"),
            MappingEntry::new("x", "mem://missing"),
            MappingEntry::new("c", "mem://c"),
        ];
        let assembler = HistoryAssembler::new(CacheClient::disabled(), retrieval(routes), Some(SECRET.into()), 3);
        let corpus = assembler.assemble(&mapping).await.unwrap();
        assert_eq!(contracts(&corpus), vec!["0xa", "0xc"]);
        assert_eq!((corpus.retrieved, corpus.skipped), (2, 2));
    }

    #[tokio::test]
    async fn malformed_member_does_not_discard_siblings() {
        let zip = build_zip(&[
            ("good.json", doc(&["0x1"]).as_bytes()),
            ("bad.json", b"{not json"),
            ("also-good.json", doc(&["0x2"]).as_bytes()),
        ]);
        let routes = vec![("mem://z", seal(&zip, SECRET, TEST_PARAMS).unwrap())];
        let assembler = HistoryAssembler::new(CacheClient::disabled(), retrieval(routes), Some(SECRET.into()), 1);
        let corpus = assembler
            .assemble(&[MappingEntry::new("z", "mem://z")])
            .await
            .unwrap();
        assert_eq!(contracts(&corpus), vec!["0x1", "0x2"]);
        assert_eq!(corpus.submissions.len(), 2);
    }

    #[tokio::test]
    async fn missing_secret_is_fatal_only_when_retrieval_is_needed() {
        let cache = CacheClient::from_backend(Arc::new(MemoryBackend::with(&[("1", doc(&["0x1"]).as_str())])));
        let assembler = HistoryAssembler::new(cache, retrieval(vec![]), None, 4);

        let corpus = assembler
            .assemble(&[MappingEntry::new("1", "mem://1")])
            .await
            .unwrap();
        assert_eq!(corpus.cache_hits, 1);

        let err = assembler
            .assemble(&[MappingEntry::new("1", "mem://1"), MappingEntry::new("2", "mem://2")])
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::MissingSecret { submission_id } if submission_id.as_str() == "2"));
    }

    #[tokio::test]
    async fn entry_without_locator_is_skipped() {
        let entry: MappingEntry = serde_json::from_str(r#"{"fileId": 5}"#).unwrap();
        let assembler = HistoryAssembler::new(CacheClient::disabled(), retrieval(vec![]), None, 4);
        let corpus = assembler.assemble(&[entry]).await.unwrap();
        assert_eq!(corpus.skipped, 1);
        assert!(corpus.submissions.is_empty());
    }

    #[tokio::test]
    async fn empty_cached_array_needs_no_retrieval() {
        let cache = CacheClient::from_backend(Arc::new(MemoryBackend::with(&[("1", "[]")])));
        let assembler = HistoryAssembler::new(cache, retrieval(vec![]), None, 2);

        let corpus = assembler
            .assemble(&[MappingEntry::new("1", "mem://one")])
            .await
            .unwrap();
        assert!(corpus.submissions.is_empty());
        assert_eq!((corpus.cache_hits, corpus.retrieved, corpus.skipped), (1, 0, 0));
    }

    #[tokio::test]
    async fn timed_out_download_is_skipped() {
        let silent = TestServer::silent().await;
        let sealed = seal(doc(&["0x1"]).as_bytes(), SECRET, TEST_PARAMS).unwrap();
        let live = TestServer::start(vec![("/h", 200, sealed)]).await;
        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let retrieval = SecureRetrieval::new(Arc::new(HttpFetcher::new(client)));
        let assembler = HistoryAssembler::new(CacheClient::disabled(), retrieval, Some(SECRET.into()), 2);

        let corpus = assembler
            .assemble(&[
                MappingEntry::new("slow", silent.url("/h")),
                MappingEntry::new("ok", live.url("/h")),
            ])
            .await
            .unwrap();
        assert_eq!(contracts(&corpus), vec!["0x1"]);
        assert_eq!((corpus.retrieved, corpus.skipped), (1, 1));
    }

    #[tokio::test]
    async fn empty_mapping_is_empty_history() {
        let assembler = HistoryAssembler::new(CacheClient::disabled(), retrieval(vec![]), None, 4);
        assert_eq!(assembler.assemble(&[]).await.unwrap(), HistoricalCorpus::default());
    }
}
