//! Risk rule engine
//!
//! Turns the best-scoring sanction match plus transfer context into a
//! screening decision. The table applies top-down, first row wins:
//!
//! | Condition | Plus | Decision |
//! |---|---|---|
//! | score >= high threshold | — | BLOCKED |
//! | score >= medium threshold | risk adds >= 5 | BLOCKED |
//! | score >= medium threshold | otherwise | MANUAL_REVIEW |
//! | any match >= low bar | amount > amount threshold | MANUAL_REVIEW |
//! | no qualifying match | — | CLEARED |

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rtgs_types::SanctionSource;

use crate::SanctionMatch;

/// Screening decision for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScreeningDecision {
    /// No compliance concern; the transfer stays PENDING for posting
    Cleared,
    /// Hard block; held for review
    Blocked,
    /// Suspicious; held for review
    ManualReview,
}

impl ScreeningDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cleared => "CLEARED",
            Self::Blocked => "BLOCKED",
            Self::ManualReview => "MANUAL_REVIEW",
        }
    }

    /// Anything but CLEARED parks the transfer in BLOCKED_AML
    pub fn holds_transfer(&self) -> bool {
        !matches!(self, Self::Cleared)
    }
}

impl std::fmt::Display for ScreeningDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rule thresholds; every default is explicit
#[derive(Debug, Clone)]
pub struct RuleConfig {
    pub high_risk_threshold: u8,
    pub medium_risk_threshold: u8,
    /// Any match at or above this participates in the amount rule
    pub low_match_bar: u8,
    /// Amounts above this raise scrutiny
    pub amount_threshold: Decimal,
    /// Risk-add sum at which a medium-band match hard-blocks
    pub risk_add_block_level: i32,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            high_risk_threshold: 90,
            medium_risk_threshold: 75,
            low_match_bar: 50,
            amount_threshold: Decimal::from(10_000),
            risk_add_block_level: 5,
        }
    }
}

impl RuleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            high_risk_threshold: std::env::var("RULES_HIGH_RISK_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.high_risk_threshold),
            medium_risk_threshold: std::env::var("RULES_MEDIUM_RISK_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.medium_risk_threshold),
            low_match_bar: defaults.low_match_bar,
            amount_threshold: std::env::var("RULES_AMOUNT_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.amount_threshold),
            risk_add_block_level: defaults.risk_add_block_level,
        }
    }
}

/// Risk-tier decisions from matches, amount, and source list
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: RuleConfig,
}

impl RuleEngine {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Apply the decision table to the union of matches for one transfer
    pub fn decide(&self, amount: Decimal, matches: &[SanctionMatch]) -> ScreeningDecision {
        let Some(best) = matches.iter().max_by_key(|m| m.score) else {
            return ScreeningDecision::Cleared;
        };

        if best.score >= self.config.high_risk_threshold {
            return ScreeningDecision::Blocked;
        }

        if best.score >= self.config.medium_risk_threshold {
            if self.risk_adds(amount, best) >= self.config.risk_add_block_level {
                return ScreeningDecision::Blocked;
            }
            return ScreeningDecision::ManualReview;
        }

        let any_low = matches
            .iter()
            .any(|m| m.score >= self.config.low_match_bar);
        if any_low && amount > self.config.amount_threshold {
            return ScreeningDecision::ManualReview;
        }

        ScreeningDecision::Cleared
    }

    /// Additive risk factors for a medium-band match
    fn risk_adds(&self, amount: Decimal, best: &SanctionMatch) -> i32 {
        let mut adds = 0;
        if amount > self.config.amount_threshold {
            adds += 2;
        }
        adds += match best.sanction.source {
            SanctionSource::Ofac | SanctionSource::Un => 3,
            SanctionSource::Eu => 2,
            SanctionSource::Other => 1,
        };
        if best.sanction.risk_score >= 90 {
            adds += 3;
        } else if best.sanction.risk_score >= 75 {
            adds += 2;
        }
        adds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MatchAlgorithm;
    use rtgs_types::{SanctionEntry, SanctionId};
    use rust_decimal_macros::dec;

    fn hit(score: u8, source: SanctionSource, risk_score: u8) -> SanctionMatch {
        SanctionMatch {
            sanction: SanctionEntry {
                id: SanctionId::new(),
                name: "Listed Party".to_string(),
                normalized_name: "LISTED PARTY".to_string(),
                source,
                risk_score,
                listed_at: chrono::Utc::now(),
            },
            score,
            algorithm: MatchAlgorithm::BkTree,
        }
    }

    fn engine() -> RuleEngine {
        RuleEngine::new(RuleConfig::default())
    }

    #[test]
    fn test_no_matches_clears() {
        assert_eq!(engine().decide(dec!(100), &[]), ScreeningDecision::Cleared);
    }

    #[test]
    fn test_high_score_blocks_unconditionally() {
        let decision = engine().decide(dec!(1), &[hit(90, SanctionSource::Other, 10)]);
        assert_eq!(decision, ScreeningDecision::Blocked);
    }

    #[test]
    fn test_medium_score_with_heavy_risk_adds_blocks() {
        // OFAC (+3) and sanction risk 90 (+3) clear the block level.
        let decision = engine().decide(dec!(100), &[hit(80, SanctionSource::Ofac, 95)]);
        assert_eq!(decision, ScreeningDecision::Blocked);
    }

    #[test]
    fn test_medium_score_with_light_risk_adds_goes_to_review() {
        // Other source (+1), low sanction risk (0), small amount (0): 1 < 5.
        let decision = engine().decide(dec!(100), &[hit(80, SanctionSource::Other, 10)]);
        assert_eq!(decision, ScreeningDecision::ManualReview);
    }

    #[test]
    fn test_amount_rule_tips_medium_band() {
        // EU (+2) + large amount (+2) is still below 5: review.
        let review = engine().decide(dec!(20000), &[hit(80, SanctionSource::Eu, 10)]);
        assert_eq!(review, ScreeningDecision::ManualReview);
        // EU (+2) + large amount (+2) + risk 75 (+2) = 6: blocked.
        let blocked = engine().decide(dec!(20000), &[hit(80, SanctionSource::Eu, 75)]);
        assert_eq!(blocked, ScreeningDecision::Blocked);
    }

    #[test]
    fn test_low_match_with_large_amount_reviews() {
        let decision = engine().decide(dec!(10001), &[hit(55, SanctionSource::Other, 10)]);
        assert_eq!(decision, ScreeningDecision::ManualReview);
    }

    #[test]
    fn test_low_match_with_small_amount_clears() {
        let decision = engine().decide(dec!(10000), &[hit(55, SanctionSource::Other, 10)]);
        assert_eq!(decision, ScreeningDecision::Cleared);
    }

    #[test]
    fn test_sub_bar_matches_clear_regardless_of_amount() {
        let decision = engine().decide(dec!(1000000), &[hit(40, SanctionSource::Ofac, 95)]);
        assert_eq!(decision, ScreeningDecision::Cleared);
    }

    #[test]
    fn test_best_match_drives_the_table() {
        let matches = vec![
            hit(60, SanctionSource::Other, 10),
            hit(92, SanctionSource::Eu, 50),
            hit(75, SanctionSource::Ofac, 80),
        ];
        assert_eq!(engine().decide(dec!(10), &matches), ScreeningDecision::Blocked);
    }
}
