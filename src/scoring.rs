//! Business rules folding a novelty result into proof scores.
//!
//! These are threshold tables, not engineering: a chain/category allowlist,
//! a metrics sanity check for authenticity, risk bands for quality, and a
//! linear reward.

use crate::asset::AssetEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chains whose submissions are scored.
pub const SUPPORTED_CHAINS: &[&str] = &[
    "ethereum",
    "optimistic-ethereum",
    "cronos",
    "binance-smart-chain",
    "xdai",
    "polygon-pos",
    "manta-pacific",
    "x-layer",
    "opbnb",
    "fantom",
    "kucoin-community-chain",
    "zksync",
    "merlin-chain",
    "mantle",
    "base",
    "arbitrum-one",
    "avalanche",
    "linea",
    "blast",
    "bitlayer",
    "scroll",
    "zklink-nova",
    "tron",
    "vana",
    "solana",
];

/// Accepted `tokenCategory` values.
pub const TOKEN_CATEGORIES: &[&str] = &[
    "MemeCoins",
    "Web3Gaming",
    "BlueChipDeFi",
    "AIAgent",
    "Layer1",
    "Layer2Layer3",
    "RWA",
    "DecentralizedAI",
    "DecentralizedFinance",
    "DePIN",
    "LiquidStakingRestaking",
    "BlockchainServiceInfra",
];

/// Suggestion/recommendation attributes that make an entry eligible for authenticity.
pub const TOKEN_ATTRIBUTES: &[&str] = &[
    "momentum-surge",
    "high-liquidity",
    "utility-driven",
    "backed-by-major-investors",
    "community-powered",
    "verified-contracts",
    "disruptive-tech",
    "major-integrations",
    "limited-supply",
];

/// Ownership score when the wallet holds the asset.
pub const OWNED: f64 = 1.0;
/// Ownership score when holding could not be confirmed.
pub const NOT_OWNED: f64 = 0.95;

/// Market-cap deviation tolerated before metrics count as inconsistent.
const MARKET_CAP_TOLERANCE: f64 = 0.05;
/// 24h volatility (percent) above which metrics count as fabricated.
const MAX_VOLATILITY_24H: f64 = 100.0;

/// Metrics block read from `token_metadata.metrics`. Missing values read as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenMetrics {
    /// Unit price.
    pub price: f64,
    /// Circulating supply.
    pub circulating_supply: f64,
    /// Reported market capitalisation.
    pub market_cap: f64,
    /// 24h volatility in percent.
    #[serde(rename = "volatility24h")]
    pub volatility_24h: f64,
    /// Risk score, 0..=10.
    pub risk_score: f64,
}

impl TokenMetrics {
    /// Extracts metrics from an entry, tolerating absent or odd shapes.
    pub fn of(entry: &AssetEntry) -> Self {
        entry
            .token_metadata
            .attributes
            .get("metrics")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }
}

/// Per-entry scores, written into the proof metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryScore {
    /// Contract address as submitted.
    pub token_submitted: String,
    /// Lower-cased chain.
    pub chain: String,
    /// 1 when metrics are consistent and attributes are recognised.
    pub authenticity: f64,
    /// Risk-band quality, zeroed by failed authenticity.
    pub quality: f64,
    /// 1 when the asset is absent from history.
    pub uniqueness: f64,
    /// [`OWNED`] or [`NOT_OWNED`].
    pub ownership: f64,
    /// Mean of the four components.
    pub score: f64,
}

impl EntryScore {
    /// Records the ownership verdict and refreshes the combined score.
    pub fn set_ownership(&mut self, owned: bool) {
        self.ownership = if owned { OWNED } else { NOT_OWNED };
        self.score = (self.authenticity + self.quality + self.uniqueness + self.ownership) / 4.0;
    }
}

/// Quality band for a risk score.
pub fn quality_for_risk(risk_score: f64) -> f64 {
    if risk_score > 8.0 && risk_score <= 10.0 {
        0.75
    } else if risk_score > 5.0 && risk_score <= 8.0 {
        0.85
    } else if risk_score > 3.0 && risk_score <= 5.0 {
        0.95
    } else {
        1.0
    }
}

/// 1 when the metrics are internally consistent, 0 otherwise.
pub fn authenticity_for_metrics(metrics: &TokenMetrics) -> f64 {
    if metrics.circulating_supply > 0.0 {
        let expected = metrics.price * metrics.circulating_supply;
        if (expected - metrics.market_cap).abs() > MARKET_CAP_TOLERANCE * expected {
            return 0.0;
        }
    }
    if metrics.volatility_24h > MAX_VOLATILITY_24H {
        return 0.0;
    }
    1.0
}

fn string_field<'a>(entry: &'a AssetEntry, key: &str) -> &'a str {
    entry
        .payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn has_known_attribute(entry: &AssetEntry) -> bool {
    ["suggestionAttributes", "recommendationAttributes"]
        .iter()
        .filter_map(|key| entry.payload.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .any(|attr| TOKEN_ATTRIBUTES.contains(&attr))
}

/// Scores one entry, or `None` when its chain or category is not accepted.
///
/// Ownership starts at [`NOT_OWNED`]; call [`EntryScore::set_ownership`] once known.
pub fn assess_entry(entry: &AssetEntry, is_novel: bool) -> Option<EntryScore> {
    let chain = entry.chain().trim().to_lowercase();
    if !SUPPORTED_CHAINS.contains(&chain.as_str()) {
        tracing::info!(contract = entry.contract(), chain = %chain, "skipping entry on unsupported chain");
        return None;
    }
    let category = string_field(entry, "tokenCategory");
    if !TOKEN_CATEGORIES.contains(&category) {
        tracing::info!(contract = entry.contract(), category, "skipping entry with unknown category");
        return None;
    }

    let metrics = TokenMetrics::of(entry);
    let authenticity = if has_known_attribute(entry) {
        authenticity_for_metrics(&metrics)
    } else {
        0.0
    };
    let quality = quality_for_risk(metrics.risk_score) * authenticity;
    let mut score = EntryScore {
        token_submitted: entry.contract().to_string(),
        chain,
        authenticity,
        quality,
        uniqueness: if is_novel { 1.0 } else { 0.0 },
        ownership: NOT_OWNED,
        score: 0.0,
    };
    score.set_ownership(false);
    Some(score)
}

/// Mean component scores over the scored entries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateScores {
    /// Mean authenticity.
    pub authenticity: f64,
    /// Mean quality.
    pub quality: f64,
    /// Mean ownership.
    pub ownership: f64,
}

/// Averages entry scores; all zero when nothing was scored.
pub fn aggregate(scores: &[EntryScore]) -> AggregateScores {
    if scores.is_empty() {
        return AggregateScores::default();
    }
    let n = scores.len() as f64;
    AggregateScores {
        authenticity: scores.iter().map(|s| s.authenticity).sum::<f64>() / n,
        quality: scores.iter().map(|s| s.quality).sum::<f64>() / n,
        ownership: scores.iter().map(|s| s.ownership).sum::<f64>() / n,
    }
}

/// Linear reward for novel entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardPolicy {
    /// Tokens granted per novel entry.
    pub reward_per_token: u64,
    /// Reward at which the proof score saturates at 1.
    pub max_token_reward: u64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            reward_per_token: 1,
            max_token_reward: 5,
        }
    }
}

impl RewardPolicy {
    /// Tokens granted for `novel` entries.
    pub fn tokens_rewarded(&self, novel: usize) -> u64 {
        (novel as u64).saturating_mul(self.reward_per_token)
    }

    /// Proof score in `[0, 1]`.
    pub fn score(&self, novel: usize) -> f64 {
        if self.max_token_reward == 0 {
            return 0.0;
        }
        (self.tokens_rewarded(novel) as f64 / self.max_token_reward as f64).min(1.0)
    }
}
