//! Canonical feature catalogue.
//!
//! The order of [`FEATURES`] is the order the classifier was trained on.
//! Both the probability call and the contribution decomposition are
//! order-sensitive, so every feature row handed to a model is materialised
//! by iterating this slice.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Broad family a feature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Financial,
    Macro,
    Text,
    RiskModel,
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Financial => write!(f, "financial"),
            Self::Macro => write!(f, "macro"),
            Self::Text => write!(f, "text"),
            Self::RiskModel => write!(f, "risk-model"),
        }
    }
}

/// Which end of a feature's range is healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureDefinition {
    pub name: &'static str,
    pub kind: FeatureKind,
    /// Default direction. The active direction comes from `RiskConfig`,
    /// which is seeded from this value.
    pub direction: Direction,
    pub description: &'static str,
}

const fn feature(
    name: &'static str,
    kind: FeatureKind,
    direction: Direction,
    description: &'static str,
) -> FeatureDefinition {
    FeatureDefinition {
        name,
        kind,
        direction,
        description,
    }
}

use Direction::{HigherIsBetter, LowerIsBetter};
use FeatureKind::{Financial, Macro, RiskModel, Text};

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

pub const FEATURES: &[FeatureDefinition] = &[
    feature(
        "F1_ROA",
        Financial,
        HigherIsBetter,
        "Return on assets. Efficiency of generating profit from the asset base",
    ),
    feature(
        "F1_ROE",
        Financial,
        HigherIsBetter,
        "Return on equity. Efficiency of shareholder capital",
    ),
    feature(
        "F1_Equity_Growth",
        Financial,
        HigherIsBetter,
        "Equity growth rate. Higher means steadier growth",
    ),
    feature(
        "F1_Retained_Earnings_Ratio",
        Financial,
        HigherIsBetter,
        "Retained earnings ratio. Share of retained earnings within equity",
    ),
    feature(
        "F1_Debt_Ratio",
        Financial,
        LowerIsBetter,
        "Debt ratio. Direct bankruptcy indicator (higher is riskier)",
    ),
    feature(
        "F1_Current_Ratio",
        Financial,
        HigherIsBetter,
        "Current ratio. Ability to meet short-term obligations (lower is riskier)",
    ),
    feature(
        "F1_Interest_Coverage",
        Financial,
        HigherIsBetter,
        "Interest coverage. Below 1 the company cannot cover its interest",
    ),
    feature(
        "F2_KMV_DD",
        RiskModel,
        HigherIsBetter,
        "Distance to default (KMV). Lower means default is more likely",
    ),
    feature(
        "F3_Z_Score",
        RiskModel,
        HigherIsBetter,
        "Altman Z-score. Lower means bankruptcy is more likely",
    ),
    feature(
        "F4_M_Score",
        RiskModel,
        LowerIsBetter,
        "Beneish M-score. Higher means earnings manipulation is more likely",
    ),
    feature(
        "M_Short_Term_Rate",
        Macro,
        LowerIsBetter,
        "Short-term interest rate. Rises weigh on fragile companies",
    ),
    feature(
        "M_Long_Term_Rate",
        Macro,
        LowerIsBetter,
        "Long-term interest rate. Rises dampen investment",
    ),
    feature(
        "M_Rate_Spread",
        Macro,
        LowerIsBetter,
        "Term spread between long and short rates. Recession signal",
    ),
    feature(
        "M_Nominal_GDP_Growth",
        Macro,
        HigherIsBetter,
        "Nominal GDP growth. Lower means slowing revenue",
    ),
    feature(
        "M_Exchange_Rate",
        Macro,
        LowerIsBetter,
        "Exchange rate. Rises hurt companies with foreign-currency debt",
    ),
    feature(
        "lex_sent_mean",
        Text,
        HigherIsBetter,
        "Mean document sentiment. Lower means a more negative tone",
    ),
    feature(
        "lex_sent_sum",
        Text,
        HigherIsBetter,
        "Cumulative sentiment. Strongly negative totals signal widening risk",
    ),
    feature(
        "lex_abs_mean",
        Text,
        LowerIsBetter,
        "Mean absolute sentiment intensity. Higher means more uncertainty",
    ),
    feature(
        "lex_neg_cnt",
        Text,
        LowerIsBetter,
        "Number of negative sentences. Direct risk signal",
    ),
    feature(
        "koelectra_prob_default",
        Text,
        LowerIsBetter,
        "Default probability from the KoELECTRA text model. Reflects document nuance and context",
    ),
    feature(
        "koe_doc_cnt",
        Text,
        HigherIsBetter,
        "Number of documents analysed",
    ),
];

pub const NO_DESCRIPTION: &str = "No description available";

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

pub fn feature_names() -> impl Iterator<Item = &'static str> {
    FEATURES.iter().map(|f| f.name)
}

pub fn find_feature(name: &str) -> Option<&'static FeatureDefinition> {
    FEATURES.iter().find(|f| f.name == name)
}

pub fn describe(name: &str) -> &'static str {
    find_feature(name).map_or(NO_DESCRIPTION, |f| f.description)
}

pub fn position(name: &str) -> Option<usize> {
    FEATURES.iter().position(|f| f.name == name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<&str> = feature_names().collect();
        assert_eq!(names.len(), FEATURES.len());
    }

    #[test]
    fn test_catalogue_has_twenty_one_features() {
        assert_eq!(FEATURES.len(), 21);
    }

    #[test]
    fn test_canonical_order_starts_with_financial_ratios() {
        assert_eq!(FEATURES[0].name, "F1_ROA");
        assert_eq!(position("F3_Z_Score"), Some(8));
        assert_eq!(FEATURES.last().map(|f| f.name), Some("koe_doc_cnt"));
    }

    #[test]
    fn test_unknown_feature_gets_placeholder_description() {
        assert_eq!(describe("X_Unknown"), NO_DESCRIPTION);
        assert!(describe("F1_Debt_Ratio").starts_with("Debt ratio"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(RiskModel.to_string(), "risk-model");
        assert_eq!(Financial.to_string(), "financial");
    }
}
