//! Cross-submission novelty check.
//!
//! An entry of the current submission is novel iff its [`IdentityKey`] does not
//! occur anywhere in the wallet's history. Entries are never compared against
//! other entries of the same submission: two identical entries submitted
//! together are both kept.

use crate::asset::{AssetEntry, IdentityKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Outcome of comparing a submission against its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyResult {
    /// Current entries with no match in history, in submission order.
    pub novel: Vec<AssetEntry>,
    /// Current entries already present in history, in submission order.
    pub historical: Vec<AssetEntry>,
    /// `novel.len() / (novel.len() + historical.len())`, or 0 for an empty submission.
    pub ratio: f64,
}

impl NoveltyResult {
    /// Number of entries examined.
    pub fn total(&self) -> usize {
        self.novel.len() + self.historical.len()
    }
}

/// Set of identity keys seen in history.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
    keys: HashSet<IdentityKey>,
}

impl HistoryIndex {
    /// Indexes every entry of the historical corpus.
    pub fn build<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a AssetEntry>,
    {
        Self {
            keys: entries.into_iter().map(AssetEntry::identity_key).collect(),
        }
    }

    /// Whether the asset has been submitted before.
    pub fn contains(&self, entry: &AssetEntry) -> bool {
        self.keys.contains(&entry.identity_key())
    }

    /// Number of distinct historical assets.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when history holds no assets.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Partitions `current` into novel and already-seen entries.
pub fn dedupe(current: &[AssetEntry], historical: &[AssetEntry]) -> NoveltyResult {
    let index = HistoryIndex::build(historical);
    dedupe_with_index(current, &index)
}

/// Same as [`dedupe`] against a prebuilt index.
pub fn dedupe_with_index(current: &[AssetEntry], index: &HistoryIndex) -> NoveltyResult {
    let (novel, historical): (Vec<AssetEntry>, Vec<AssetEntry>) = current
        .iter()
        .cloned()
        .partition(|entry| !index.contains(entry));
    let ratio = novelty_ratio(novel.len(), current.len());
    NoveltyResult {
        novel,
        historical,
        ratio,
    }
}

/// `novel / total`, defined as 0 when `total` is 0.
pub fn novelty_ratio(novel: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        novel as f64 / total as f64
    }
}
