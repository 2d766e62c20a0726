//! Networked stages of the proof run.
//!
//! Gated behind the `net` Cargo feature. Every stage here degrades instead of
//! failing when its remote dependency misbehaves; only missing configuration
//! for a retrieval that is actually needed stops a run.

#![cfg(feature = "net")]

/// On-chain holding checks over JSON-RPC.
pub mod balance;
/// Redis-backed submission cache.
pub mod cache;
/// Cache-then-retrieval assembly of the historical corpus.
pub mod history;
/// Wallet → upload mapping via the metadata API.
pub mod mapping;
/// The end-to-end proof run.
pub mod proof;
/// Download, decrypt and unpack one upload.
pub mod retrieval;
#[cfg(test)]
pub(crate) mod testing;

pub use balance::{BalanceOracle, RpcBalanceOracle};
pub use cache::{CacheBackend, CacheClient, CacheError, RedisBackend};
pub use history::{HistoricalCorpus, HistoryAssembler, HistoryError};
pub use mapping::{HttpMappingResolver, MappingSource};
pub use proof::{ProofError, ProofPipeline};
pub use retrieval::{ByteFetcher, HttpFetcher, RetrievalError, SecureRetrieval};
