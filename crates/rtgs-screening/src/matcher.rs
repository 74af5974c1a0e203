//! Fuzzy sanctions matcher
//!
//! Two passes over the same normalized form:
//!
//! 1. **BK-tree prefilter** over the curated high-risk subset
//!    (risk_score >= the configured floor, or OFAC/UN listings). The tree
//!    sits behind an atomically swapped `Arc`; `refresh()` rebuilds it from
//!    the provider and readers observe either the old or the new tree.
//! 2. **Provider similarity fallback** over the full table; the provider
//!    contract is to return candidates whose similarity meets the
//!    threshold.
//!
//! Results merge by sanction id keeping the higher score, sort descending,
//! and cap at 50.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rtgs_types::{SanctionEntry, SanctionId, SanctionSource};

use crate::levenshtein::similarity;
use crate::normalize::normalize;
use crate::{BkTree, ComplianceError, ComplianceResult};

/// Which pass produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchAlgorithm {
    BkTree,
    DbSimilarity,
}

/// One screening hit
#[derive(Debug, Clone)]
pub struct SanctionMatch {
    pub sanction: SanctionEntry,
    /// Similarity in [0, 100]
    pub score: u8,
    pub algorithm: MatchAlgorithm,
}

/// Fuzzy matcher configuration
#[derive(Debug, Clone)]
pub struct FuzzyConfig {
    /// Minimum similarity to report a match
    pub levenshtein_threshold: u8,
    pub bk_tree_enabled: bool,
    /// Chunk size for batch screening
    pub batch_size: usize,
    /// Entries at or above this risk score join the BK-tree subset
    pub high_risk_min_score: u8,
    /// Result cap after merge
    pub max_results: usize,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            levenshtein_threshold: 85,
            bk_tree_enabled: true,
            batch_size: 100,
            high_risk_min_score: 75,
            max_results: 50,
        }
    }
}

impl FuzzyConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            levenshtein_threshold: std::env::var("FUZZY_LEVENSHTEIN_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.levenshtein_threshold),
            bk_tree_enabled: std::env::var("FUZZY_BK_TREE_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.bk_tree_enabled),
            batch_size: std::env::var("FUZZY_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            high_risk_min_score: defaults.high_risk_min_score,
            max_results: defaults.max_results,
        }
    }
}

/// Read seam over the sanctions table
#[async_trait]
pub trait SanctionsProvider: Send + Sync {
    /// The curated subset the BK-tree is built from
    async fn high_risk_entries(&self) -> ComplianceResult<Vec<SanctionEntry>>;

    /// Full-table candidates with similarity >= `min_similarity` against
    /// `normalized` (trigram similarity in PostgreSQL, linear scan in memory)
    async fn similar_candidates(
        &self,
        normalized: &str,
        min_similarity: u8,
    ) -> ComplianceResult<Vec<SanctionEntry>>;

    /// Entry lookup for audit enrichment
    async fn entry(&self, id: SanctionId) -> ComplianceResult<Option<SanctionEntry>>;
}

/// Decide BK-tree membership for one entry
pub(crate) fn is_high_risk(entry: &SanctionEntry, min_score: u8) -> bool {
    entry.risk_score >= min_score
        || matches!(entry.source, SanctionSource::Ofac | SanctionSource::Un)
}

/// In-memory sanctions provider, deduplicated on `(normalized_name, source)`
pub struct MemorySanctionsProvider {
    entries: RwLock<Vec<SanctionEntry>>,
    high_risk_min_score: u8,
}

impl Default for MemorySanctionsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySanctionsProvider {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            high_risk_min_score: FuzzyConfig::default().high_risk_min_score,
        }
    }

    /// Insert or update; the raw name is normalized here so ingestion and
    /// screening share one normal form.
    pub fn upsert(
        &self,
        name: &str,
        source: SanctionSource,
        risk_score: u8,
    ) -> SanctionEntry {
        let normalized = normalize(name);
        let mut entries = self.entries.write();
        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.normalized_name == normalized && e.source == source)
        {
            existing.risk_score = risk_score;
            return existing.clone();
        }
        let entry = SanctionEntry {
            id: SanctionId::new(),
            name: name.to_string(),
            normalized_name: normalized,
            source,
            risk_score,
            listed_at: chrono::Utc::now(),
        };
        entries.push(entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SanctionsProvider for MemorySanctionsProvider {
    async fn high_risk_entries(&self) -> ComplianceResult<Vec<SanctionEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| is_high_risk(e, self.high_risk_min_score))
            .cloned()
            .collect())
    }

    async fn similar_candidates(
        &self,
        normalized: &str,
        min_similarity: u8,
    ) -> ComplianceResult<Vec<SanctionEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| similarity(normalized, &e.normalized_name) >= min_similarity)
            .cloned()
            .collect())
    }

    async fn entry(&self, id: SanctionId) -> ComplianceResult<Option<SanctionEntry>> {
        Ok(self.entries.read().iter().find(|e| e.id == id).cloned())
    }
}

/// Two-pass fuzzy matcher with an atomically refreshed BK-tree
pub struct FuzzyMatcher {
    provider: Arc<dyn SanctionsProvider>,
    config: FuzzyConfig,
    tree: RwLock<Arc<BkTree>>,
    /// Normalized name -> entries carrying it (tree terms are names only)
    by_name: RwLock<Arc<HashMap<String, Vec<SanctionEntry>>>>,
}

impl FuzzyMatcher {
    pub fn new(provider: Arc<dyn SanctionsProvider>, config: FuzzyConfig) -> Self {
        Self {
            provider,
            config,
            tree: RwLock::new(Arc::new(BkTree::new())),
            by_name: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &FuzzyConfig {
        &self.config
    }

    /// Rebuild the BK-tree from the provider's high-risk subset and swap it
    /// in. Readers mid-query keep the tree they already hold.
    pub async fn refresh(&self) -> ComplianceResult<usize> {
        let entries = self.provider.high_risk_entries().await?;
        let mut index: HashMap<String, Vec<SanctionEntry>> = HashMap::new();
        for entry in entries {
            index
                .entry(entry.normalized_name.clone())
                .or_default()
                .push(entry);
        }
        let tree: BkTree = index.keys().cloned().collect();
        let count = tree.len();

        *self.tree.write() = Arc::new(tree);
        *self.by_name.write() = Arc::new(index);
        info!(terms = count, "sanctions BK-tree refreshed");
        Ok(count)
    }

    /// Find sanctions matching `name` at or above `threshold_pct`
    pub async fn find(
        &self,
        name: &str,
        threshold_pct: u8,
    ) -> ComplianceResult<Vec<SanctionMatch>> {
        let normalized = normalize(name);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let mut merged: HashMap<SanctionId, SanctionMatch> = HashMap::new();

        if self.config.bk_tree_enabled {
            let tree = self.tree.read().clone();
            let by_name = self.by_name.read().clone();
            let radius = Self::radius(&normalized, threshold_pct);
            for (term, _distance) in tree.query(&normalized, radius) {
                let score = similarity(&normalized, &term);
                if score < threshold_pct {
                    continue;
                }
                if let Some(entries) = by_name.get(&term) {
                    for entry in entries {
                        merge_match(
                            &mut merged,
                            SanctionMatch {
                                sanction: entry.clone(),
                                score,
                                algorithm: MatchAlgorithm::BkTree,
                            },
                        );
                    }
                }
            }
        }

        // Full-table pass widens coverage beyond the curated subset.
        for entry in self
            .provider
            .similar_candidates(&normalized, threshold_pct)
            .await?
        {
            let score = similarity(&normalized, &entry.normalized_name);
            if score < threshold_pct {
                continue;
            }
            merge_match(
                &mut merged,
                SanctionMatch {
                    sanction: entry,
                    score,
                    algorithm: MatchAlgorithm::DbSimilarity,
                },
            );
        }

        let mut matches: Vec<SanctionMatch> = merged.into_values().collect();
        matches.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.sanction.normalized_name.cmp(&b.sanction.normalized_name))
        });
        matches.truncate(self.config.max_results);

        debug!(
            name = %name,
            threshold = threshold_pct,
            matches = matches.len(),
            "sanctions lookup complete"
        );
        Ok(matches)
    }

    /// Batch variant, processed in `batch_size` chunks
    pub async fn find_all(
        &self,
        names: &[String],
        threshold_pct: u8,
    ) -> ComplianceResult<Vec<Vec<SanctionMatch>>> {
        let mut results = Vec::with_capacity(names.len());
        for chunk in names.chunks(self.config.batch_size.max(1)) {
            for name in chunk {
                results.push(self.find(name, threshold_pct).await?);
            }
        }
        Ok(results)
    }

    /// Maximum edit distance compatible with `threshold_pct` for this query
    /// length, rounded up so borderline candidates are scored rather than
    /// pruned.
    fn radius(normalized: &str, threshold_pct: u8) -> usize {
        let len = normalized.chars().count();
        let slack = 100usize.saturating_sub(threshold_pct as usize);
        (len * slack).div_ceil(100)
    }
}

fn merge_match(merged: &mut HashMap<SanctionId, SanctionMatch>, candidate: SanctionMatch) {
    match merged.get_mut(&candidate.sanction.id) {
        Some(existing) if existing.score >= candidate.score => {}
        Some(existing) => *existing = candidate,
        None => {
            merged.insert(candidate.sanction.id, candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn matcher_with(entries: &[(&str, SanctionSource, u8)]) -> FuzzyMatcher {
        let provider = Arc::new(MemorySanctionsProvider::new());
        for (name, source, score) in entries {
            provider.upsert(name, *source, *score);
        }
        let matcher = FuzzyMatcher::new(provider, FuzzyConfig::default());
        matcher.refresh().await.unwrap();
        matcher
    }

    #[tokio::test]
    async fn test_exact_match_scores_100() {
        let matcher = matcher_with(&[("Osama bin Laden", SanctionSource::Ofac, 95)]).await;
        let matches = matcher.find("Osama bin Laden", 85).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 100);
    }

    #[tokio::test]
    async fn test_near_match_found_above_threshold() {
        let matcher = matcher_with(&[("Osama bin Laden", SanctionSource::Ofac, 95)]).await;
        // One substitution across 15 characters: 93% similar.
        let matches = matcher.find("Usama bin Laden", 85).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score >= 85);
    }

    #[tokio::test]
    async fn test_unrelated_name_no_match() {
        let matcher = matcher_with(&[("Osama bin Laden", SanctionSource::Ofac, 95)]).await;
        let matches = matcher.find("Clean Sender", 85).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_empty_name_no_match() {
        let matcher = matcher_with(&[("Osama bin Laden", SanctionSource::Ofac, 95)]).await;
        assert!(matcher.find("", 85).await.unwrap().is_empty());
        assert!(matcher.find(" .,- ", 85).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_low_risk_entry_still_found_via_fallback() {
        // Below the BK-tree floor and not OFAC/UN, so only the provider
        // pass can find it.
        let matcher = matcher_with(&[("Shady Import Export", SanctionSource::Other, 40)]).await;
        let matches = matcher.find("Shady Import Export", 85).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].algorithm, MatchAlgorithm::DbSimilarity);
    }

    #[tokio::test]
    async fn test_merge_prefers_higher_score_and_dedupes() {
        // High-risk entry is reachable by both passes; it must appear once.
        let matcher = matcher_with(&[("Saddam Hussein", SanctionSource::Un, 90)]).await;
        let matches = matcher.find("Saddam Hussein", 80).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 100);
    }

    #[tokio::test]
    async fn test_results_sorted_descending_and_capped() {
        let provider = Arc::new(MemorySanctionsProvider::new());
        for i in 0..60 {
            provider.upsert(&format!("ACME CORP {i:02}"), SanctionSource::Eu, 80);
        }
        let matcher = FuzzyMatcher::new(provider, FuzzyConfig::default());
        matcher.refresh().await.unwrap();

        let matches = matcher.find("ACME CORP 00", 70).await.unwrap();
        assert!(matches.len() <= 50);
        for pair in matches.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_refresh_swaps_tree() {
        let provider = Arc::new(MemorySanctionsProvider::new());
        let matcher = FuzzyMatcher::new(provider.clone(), FuzzyConfig::default());
        matcher.refresh().await.unwrap();
        assert!(matcher.find("Osama bin Laden", 85).await.unwrap().is_empty());

        provider.upsert("Osama bin Laden", SanctionSource::Ofac, 95);
        matcher.refresh().await.unwrap();
        assert_eq!(matcher.find("Osama bin Laden", 85).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_find() {
        let matcher = matcher_with(&[("Osama bin Laden", SanctionSource::Ofac, 95)]).await;
        let names = vec!["Clean Sender".to_string(), "Osama bin Laden".to_string()];
        let results = matcher.find_all(&names, 85).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_empty());
        assert_eq!(results[1].len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_dedup_key() {
        let provider = MemorySanctionsProvider::new();
        provider.upsert("ACME Trading", SanctionSource::Eu, 50);
        provider.upsert("acme  trading!", SanctionSource::Eu, 70);
        provider.upsert("ACME Trading", SanctionSource::Ofac, 50);
        // Same normalized name + source collapses; different source doesn't.
        assert_eq!(provider.len(), 2);
    }
}
