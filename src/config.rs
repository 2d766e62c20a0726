//! Run configuration.
//!
//! Read once by the binary and handed to every component; nothing below the
//! binary touches the process environment.

use crate::scoring::RewardPolicy;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default DLP identifier stamped on proofs.
pub const DEFAULT_DLP_ID: u64 = 31;
/// Default timeout for HTTP calls (metadata, downloads, RPC).
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;
/// Default timeout for cache connect and commands.
pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 5_000;
/// Default number of mapping entries resolved concurrently.
pub const DEFAULT_RETRIEVAL_CONCURRENCY: usize = 4;
/// Default Redis port.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// `(chain slug, environment variable)` pairs for balance RPC endpoints.
pub const CHAIN_RPC_VARS: &[(&str, &str)] = &[
    ("vana", "VANA_RPC_URL"),
    ("ethereum", "ETH_RPC_URL"),
    ("base", "BASE_RPC_URL"),
    ("optimistic-ethereum", "OPTIMISM_RPC_URL"),
    ("binance-smart-chain", "BSC_RPC_URL"),
    ("polygon-pos", "POLYGON_RPC_URL"),
    ("opbnb", "OPBNB_RPC_URL"),
    ("zksync", "ZK_RPC_URL"),
    ("mantle", "MANTLE_RPC_URL"),
    ("scroll", "SCROLL_RPC_URL"),
    ("arbitrum-one", "ARBITRUM_RPC_URL"),
    ("avalanche", "AVALANCHE_RPC_URL"),
    ("linea", "LINEA_RPC_URL"),
    ("blast", "BLAST_RPC_URL"),
    ("solana", "SOLANA_RPC_URL"),
    ("xdai", "GNOSIS_RPC_URL"),
    ("fantom", "FANTOM_RPC_URL"),
    ("zklink-nova", "ZKLINK_RPC_URL"),
    ("tron", "TRON_RPC_URL"),
    ("kucoin-community-chain", "KCC_RPC_URL"),
    ("manta-pacific", "MANTA_RPC_URL"),
    ("x-layer", "XLAYER_RPC_URL"),
    ("merlin-chain", "MERLIN_RPC_URL"),
    ("bitlayer", "BITLAYER_RPC_URL"),
    ("cronos", "CRONOS_RPC_URL"),
];

/// Chain slug → JSON-RPC endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainEndpoints {
    endpoints: BTreeMap<String, String>,
}

impl ChainEndpoints {
    /// Builds a table from `(chain, url)` pairs; chains are lower-cased.
    pub fn from_pairs<I, C, U>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, U)>,
        C: Into<String>,
        U: Into<String>,
    {
        Self {
            endpoints: pairs
                .into_iter()
                .map(|(chain, url)| (chain.into().to_lowercase(), url.into()))
                .collect(),
        }
    }

    /// Endpoint for `chain`, if configured.
    pub fn get(&self, chain: &str) -> Option<&str> {
        self.endpoints
            .get(&chain.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Configured chains, sorted.
    pub fn chains(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// Number of configured chains.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True when no endpoint is configured.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Redis connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Host name.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Optional password.
    pub password: Option<String>,
}

impl CacheSettings {
    /// `redis://` URL for database 0.
    pub fn url(&self) -> String {
        match &self.password {
            Some(pwd) => format!("redis://:{}@{}:{}/0", pwd, self.host, self.port),
            None => format!("redis://{}:{}/0", self.host, self.port),
        }
    }
}

impl fmt::Debug for CacheSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything a proof run needs from its environment.
#[derive(Clone)]
pub struct ProofConfig {
    /// Directory holding the current submission.
    pub input_dir: PathBuf,
    /// Directory receiving `results.json`.
    pub output_dir: PathBuf,
    /// Data liquidity pool identifier.
    pub dlp_id: u64,
    /// Base URL of the metadata API resolving wallet history.
    pub validator_base_api_url: Option<String>,
    /// Ownership signature; also the passphrase of historical uploads.
    pub signature: Option<String>,
    /// Message the ownership signature was produced over.
    pub fixed_message: Option<String>,
    /// Identifier of the upload being proved, informational.
    pub file_id: Option<String>,
    /// Reward parameters.
    pub reward: RewardPolicy,
    /// Cache backend settings.
    pub cache: CacheSettings,
    /// Timeout for every HTTP call.
    pub http_timeout: Duration,
    /// Timeout for cache connect and commands.
    pub cache_timeout: Duration,
    /// Mapping entries resolved concurrently.
    pub retrieval_concurrency: usize,
    /// Balance RPC endpoints per chain.
    pub chain_endpoints: ChainEndpoints,
}

impl ProofConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let development = get("NODE_ENV").map_or(false, |v| v == "development");
        let (input_dir, output_dir) = if development {
            ("./demo/input", "./demo/output")
        } else {
            ("/input", "/output")
        };
        let defaults = RewardPolicy::default();
        let chain_endpoints = ChainEndpoints::from_pairs(
            CHAIN_RPC_VARS
                .iter()
                .filter_map(|&(chain, var)| get(var).map(|url| (chain, url))),
        );

        Self {
            input_dir: PathBuf::from(input_dir),
            output_dir: PathBuf::from(output_dir),
            dlp_id: parse_or(&get, "DLP_ID", DEFAULT_DLP_ID),
            validator_base_api_url: get("VALIDATOR_BASE_API_URL"),
            signature: get("SIGNATURE"),
            fixed_message: get("FIXED_MESSAGE"),
            file_id: get("FILE_ID"),
            reward: RewardPolicy {
                reward_per_token: parse_or(&get, "REWARD_PER_TOKEN", defaults.reward_per_token),
                max_token_reward: parse_or(&get, "MAX_TOKEN_REWARD", defaults.max_token_reward),
            },
            cache: CacheSettings {
                host: get("REDIS_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: parse_or(&get, "REDIS_PORT", DEFAULT_REDIS_PORT),
                password: get("REDIS_PWD"),
            },
            http_timeout: Duration::from_millis(parse_or(
                &get,
                "PROOF_HTTP_TIMEOUT_MS",
                DEFAULT_HTTP_TIMEOUT_MS,
            )),
            cache_timeout: Duration::from_millis(parse_or(
                &get,
                "PROOF_CACHE_TIMEOUT_MS",
                DEFAULT_CACHE_TIMEOUT_MS,
            )),
            retrieval_concurrency: parse_or(
                &get,
                "PROOF_RETRIEVAL_CONCURRENCY",
                DEFAULT_RETRIEVAL_CONCURRENCY,
            )
            .max(1),
            chain_endpoints,
        }
    }

    /// Logs the effective configuration with secrets redacted.
    pub fn log_summary(&self) {
        tracing::info!(
            input_dir = %self.input_dir.display(),
            output_dir = %self.output_dir.display(),
            dlp_id = self.dlp_id,
            validator_base_api_url = self.validator_base_api_url.as_deref().unwrap_or("<unset>"),
            signature = redact(&self.signature),
            fixed_message = self.fixed_message.is_some(),
            file_id = self.file_id.as_deref().unwrap_or("<unset>"),
            reward_per_token = self.reward.reward_per_token,
            max_token_reward = self.reward.max_token_reward,
            cache = ?self.cache,
            http_timeout_ms = self.http_timeout.as_millis() as u64,
            cache_timeout_ms = self.cache_timeout.as_millis() as u64,
            retrieval_concurrency = self.retrieval_concurrency,
            rpc_chains = self.chain_endpoints.len(),
            "using config"
        );
    }
}

impl fmt::Debug for ProofConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("dlp_id", &self.dlp_id)
            .field("validator_base_api_url", &self.validator_base_api_url)
            .field("signature", &redact(&self.signature))
            .field("fixed_message", &self.fixed_message)
            .field("file_id", &self.file_id)
            .field("reward", &self.reward)
            .field("cache", &self.cache)
            .field("http_timeout", &self.http_timeout)
            .field("cache_timeout", &self.cache_timeout)
            .field("retrieval_concurrency", &self.retrieval_concurrency)
            .field("chain_endpoints", &self.chain_endpoints)
            .finish()
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> T
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    match get(key) {
        None => default,
        Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparsable value, using default");
            default
        }),
    }
}
