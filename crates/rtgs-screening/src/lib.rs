//! RTGS Screening - Sanctions screening and risk-based compliance
//!
//! Screening runs before posting: every debtor and creditor name is matched
//! against the sanctions set, a risk rule table turns the matches into a
//! decision, and the screener translates the decision into transfer state.
//!
//! Matching is two-pass: a BK-tree over the curated high-risk subset cuts
//! the hot path; a provider-side similarity query over the full table
//! guarantees completeness. Both passes score against the same normalized
//! form, so their scores are directly comparable.
//!
//! The screener never writes CLEARED. Clearing is reserved to the payment
//! engine, whose atomic posting is the only thing that can make
//! "CLEARED implies ledger entries exist" true.

pub mod bktree;
pub mod error;
pub mod levenshtein;
pub mod matcher;
pub mod normalize;
pub mod rules;
pub mod screener;

pub use bktree::BkTree;
pub use error::{ComplianceError, ComplianceResult};
pub use levenshtein::{levenshtein, similarity};
pub use matcher::{
    FuzzyConfig, FuzzyMatcher, MatchAlgorithm, MemorySanctionsProvider, SanctionMatch,
    SanctionsProvider,
};
pub use normalize::normalize;
pub use rules::{RuleConfig, RuleEngine, ScreeningDecision};
pub use screener::{ComplianceScreener, ScreeningOutcome};
