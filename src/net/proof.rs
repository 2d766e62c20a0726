//! End-to-end proof run: ingest, discover history, dedupe, score.

use crate::config::ProofConfig;
use crate::container::{self, ContainerError};
use crate::dedupe::{dedupe_with_index, HistoryIndex, NoveltyResult};
use crate::ingest::{self, IngestError};
use crate::io::{ProofAttributes, ProofMetadata, ProofResponse};
use crate::net::balance::{BalanceOracle, RpcBalanceOracle};
use crate::net::cache::CacheClient;
use crate::net::history::{HistoryAssembler, HistoryError};
use crate::net::mapping::{HttpMappingResolver, MappingSource};
use crate::net::retrieval::{HttpFetcher, SecureRetrieval};
use crate::ownership::{verify_wallet_signature, OwnershipError};
use crate::scoring::{aggregate, assess_entry, EntryScore};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;

/// Failures that end a run without a valid proof.
#[derive(Debug, Error)]
pub enum ProofError {
    /// An input archive could not be expanded.
    #[error("failed to expand input archives: {0}")]
    Container(#[from] ContainerError),
    /// The current submission is unreadable or malformed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// History needed configuration that is missing.
    #[error(transparent)]
    History(#[from] HistoryError),
    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(String),
}

/// A proof run with its collaborators injected.
pub struct ProofPipeline {
    config: ProofConfig,
    mapping: Arc<dyn MappingSource>,
    history: HistoryAssembler,
    balances: Arc<dyn BalanceOracle>,
}

impl ProofPipeline {
    /// Pipeline over explicit collaborators.
    pub fn new(
        config: ProofConfig,
        mapping: Arc<dyn MappingSource>,
        history: HistoryAssembler,
        balances: Arc<dyn BalanceOracle>,
    ) -> Self {
        Self {
            config,
            mapping,
            history,
            balances,
        }
    }

    /// Pipeline over the production collaborators described by `config`.
    pub async fn from_config(config: ProofConfig) -> Result<Self, ProofError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ProofError::Http(e.to_string()))?;
        let cache = CacheClient::connect(&config.cache, config.cache_timeout).await;
        let mapping = HttpMappingResolver::new(client.clone(), config.validator_base_api_url.as_deref());
        let retrieval = SecureRetrieval::new(Arc::new(HttpFetcher::new(client.clone())));
        let history = HistoryAssembler::new(
            cache,
            retrieval,
            config.signature.clone(),
            config.retrieval_concurrency,
        );
        let balances = RpcBalanceOracle::new(client, config.chain_endpoints.clone());
        Ok(Self::new(config, Arc::new(mapping), history, Arc::new(balances)))
    }

    /// Runs the proof over the configured input directory.
    pub async fn run(&self) -> Result<ProofResponse, ProofError> {
        let cfg = &self.config;
        let expanded = container::expand_archives(&cfg.input_dir)?;
        if !expanded.is_empty() {
            tracing::info!(files = expanded.len(), "expanded input archives");
        }
        let local = ingest::load_current_submission(&cfg.input_dir)?;

        let mapping = self.mapping.resolve(&local.wallet).await;
        let corpus = self.history.assemble(&mapping).await?;
        let index = HistoryIndex::build(corpus.entries());
        let novelty = dedupe_with_index(&local.entries, &index);
        tracing::info!(
            total = novelty.total(),
            novel = novelty.novel.len(),
            historical = novelty.historical.len(),
            ratio = novelty.ratio,
            "computed novelty"
        );

        let signature_verified = match (cfg.fixed_message.as_deref(), cfg.signature.as_deref()) {
            (Some(message), Some(signature)) => {
                Some(verify_wallet_signature(&local.wallet, message, signature))
            }
            _ => {
                tracing::info!("signature or message not configured, skipping signature check");
                None
            }
        };

        let scores = self.score_novel(&novelty, &local.wallet).await;
        let means = aggregate(&scores);
        let novel = novelty.novel.len();
        let response = ProofResponse {
            dlp_id: cfg.dlp_id,
            valid: true,
            score: cfg.reward.score(novel),
            authenticity: means.authenticity,
            ownership: means.ownership,
            quality: means.quality,
            uniqueness: novelty.ratio,
            attributes: ProofAttributes {
                total_tokens: novelty.total(),
                novel_tokens: novel,
                historical_tokens: novelty.historical.len(),
                history_submissions: corpus.submissions.len(),
                cache_hits: corpus.cache_hits,
                retrieved: corpus.retrieved,
                skipped: corpus.skipped,
                signature_verified,
            },
            metadata: ProofMetadata {
                dlp_id: cfg.dlp_id,
                submission_time: Utc::now(),
                token_rewarded: cfg.reward.tokens_rewarded(novel),
                metadata: scores,
            },
            error: None,
        };
        Ok(response)
    }

    async fn score_novel(&self, novelty: &NoveltyResult, wallet: &str) -> Vec<EntryScore> {
        let assessed = novelty
            .novel
            .iter()
            .filter_map(|entry| assess_entry(entry, true).map(|score| (entry, score)));
        stream::iter(assessed)
            .map(|(entry, mut score)| async move {
                let owned = match self.balances.holds(entry.chain(), entry.contract(), wallet).await {
                    Ok(owned) => owned,
                    Err(OwnershipError::UnsupportedChain(chain)) => {
                        tracing::debug!(chain = %chain, contract = entry.contract(), "no balance oracle for chain");
                        false
                    }
                    Err(err) => {
                        tracing::warn!(contract = entry.contract(), error = %err, "balance check failed");
                        false
                    }
                };
                score.set_ownership(owned);
                score
            })
            .buffered(self.config.retrieval_concurrency.max(1))
            .collect()
            .await
    }
}
