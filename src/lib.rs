#![deny(missing_docs)]

//! # token_proof
//!
//! **token_proof** decides, for one wallet-scoped submission of token entries,
//! which entries are new relative to everything that wallet submitted before,
//! and folds the answer into a proof record.
//!
//! History is never stored locally. Each run rediscovers it: a metadata API
//! lists the wallet's previous uploads, a Redis cache short-circuits the ones
//! it already knows, and the rest are downloaded, decrypted with the
//! submission's signature and unpacked.
//!
//! ## Features
//!
//! * **Data model** in [`asset`]: typed identity fields, opaque payload.
//! * **Novelty check** in [`dedupe`]: set membership over normalised
//!   `(chain, contract)` keys, order preserving.
//! * **Containers and envelopes**: [`container`] sniffs ZIP payloads,
//!   [`envelope`] seals and opens Argon2id + AES-256-GCM payloads.
//! * **Local ingestion** in [`ingest`], **scoring rules** in [`scoring`],
//!   **signature ownership** in [`ownership`].
//! * **Network pipeline** in `net` (feature `net`, on by default): cache
//!   client, mapping resolver, secure retrieval, history assembler, balance
//!   oracle and the [`net::ProofPipeline`] that ties them together.
//!
//! ## Usage
//!
//! ```rust
//! use token_proof::{dedupe::dedupe, AssetEntry};
//!
//! let current = vec![AssetEntry::new("base", "0xAAA"), AssetEntry::new("base", "0xBBB")];
//! let history = vec![AssetEntry::new("Base", "0xaaa")];
//!
//! let result = dedupe(&current, &history);
//! assert_eq!(result.novel, vec![AssetEntry::new("base", "0xBBB")]);
//! assert_eq!(result.ratio, 0.5);
//! ```

pub mod asset;
pub mod config;
pub mod container;
pub mod dedupe;
pub mod envelope;
pub mod ingest;
pub mod io;
pub mod net;
pub mod ownership;
pub mod scoring;

pub use asset::{AssetEntry, IdentityKey, MappingEntry, Submission, SubmissionId, TokenMetadata};
pub use config::{ChainEndpoints, ProofConfig};
pub use container::{expand_archives, extract_records, is_archive, ContainerError};
pub use dedupe::{dedupe, novelty_ratio, HistoryIndex, NoveltyResult};
pub use envelope::{open, seal, EnvelopeError, KdfParams};
pub use ingest::{load_current_submission, IngestError, LocalSubmission};
pub use io::{write_results, ProofAttributes, ProofMetadata, ProofResponse, ResultsError};
pub use ownership::{recover_signer, verify_wallet_signature, OwnershipError};
pub use scoring::{EntryScore, RewardPolicy};
