//! Submission data model.
//!
//! Asset entries arrive as loosely shaped JSON. Only the fields that decide
//! asset identity are typed; everything else rides along untouched so the
//! scoring layer and the result file see exactly what the submitter sent.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Typed view of the `token_metadata` object inside an asset entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Chain slug the asset lives on (e.g. `base`).
    pub chain: String,
    /// Contract address of the asset on `chain`.
    pub contract: String,
    /// Remaining metadata (metrics and friends), kept verbatim.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// One submitted token/asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Identity-bearing metadata.
    pub token_metadata: TokenMetadata,
    /// Opaque payload consumed by scoring (category, attributes, ...).
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl AssetEntry {
    /// Builds an entry with an empty payload. Mostly useful for fixtures.
    pub fn new(chain: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            token_metadata: TokenMetadata {
                chain: chain.into(),
                contract: contract.into(),
                attributes: Map::new(),
            },
            payload: Map::new(),
        }
    }

    /// Chain as submitted.
    pub fn chain(&self) -> &str {
        &self.token_metadata.chain
    }

    /// Contract address as submitted.
    pub fn contract(&self) -> &str {
        &self.token_metadata.contract
    }

    /// Normalized identity key of this entry.
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(self.chain(), self.contract())
    }
}

/// Normalized `(chain, contract)` pair deciding whether two entries are the same asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    chain: String,
    contract: String,
}

impl IdentityKey {
    /// Lower-cases both components; surrounding whitespace is significant.
    pub fn new(chain: &str, contract: &str) -> Self {
        Self {
            chain: chain.to_lowercase(),
            contract: contract.to_lowercase(),
        }
    }

    /// Normalized chain.
    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Normalized contract address.
    pub fn contract(&self) -> &str {
        &self.contract
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.contract)
    }
}

/// An ordered collection of asset entries produced by one wallet at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Submitting wallet, when the record carries it.
    #[serde(
        rename = "userAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_address: Option<String>,
    /// Submitted entries in submission order.
    pub tokens: Vec<AssetEntry>,
    /// Any other top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Submission {
    /// Builds a submission from entries alone.
    pub fn from_entries(tokens: Vec<AssetEntry>) -> Self {
        Self {
            user_address: None,
            tokens,
            extra: Map::new(),
        }
    }

    /// Parses a current-run submission; `tokens` is required.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Parses a historical record; a missing `tokens` array reads as empty.
    pub fn from_historical_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let record: HistoricalRecord = serde_json::from_slice(bytes)?;
        Ok(record.into())
    }
}

#[derive(Deserialize)]
struct HistoricalRecord {
    #[serde(rename = "userAddress", default)]
    user_address: Option<String>,
    #[serde(default)]
    tokens: Vec<AssetEntry>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<HistoricalRecord> for Submission {
    fn from(record: HistoricalRecord) -> Self {
        Self {
            user_address: record.user_address,
            tokens: record.tokens,
            extra: record.extra,
        }
    }
}

/// Opaque identifier of a historical upload.
///
/// The metadata API emits it as either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    /// Wraps an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as used for cache keys.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SubmissionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Unsigned(n) => Self(n.to_string()),
            RawId::Signed(n) => Self(n.to_string()),
        })
    }
}

/// One historical upload of a wallet: where its ciphertext lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Identifier of the upload; doubles as the cache key.
    #[serde(rename = "fileId")]
    pub submission_id: SubmissionId,
    /// Retrieval locator of the ciphertext, usually a URL.
    #[serde(rename = "fileUrl", default)]
    pub locator: Option<String>,
}

impl MappingEntry {
    /// Builds an entry with a locator.
    pub fn new(submission_id: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            submission_id: SubmissionId::new(submission_id),
            locator: Some(locator.into()),
        }
    }

    /// The locator, if present and non-blank.
    pub fn usable_locator(&self) -> Option<&str> {
        self.locator
            .as_deref()
            .map(str::trim)
            .filter(|loc| !loc.is_empty())
    }
}
