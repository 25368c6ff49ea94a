//! Category aggregation of attribution weights.
//!
//! Feature names are routed to a [`RiskCategory`] by an ordered rule table
//! ([`ROUTING_RULES`]); the first matching rule wins and unmatched names fall
//! through to [`FALLBACK_CATEGORY`]. Weights are summed per category and the
//! sum is classified against that category's own thresholds.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::types::Weight;

// ---------------------------------------------------------------------------
// Categories and verdicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    FinancialRatios,
    Macro,
    DefaultModel,
    FraudModel,
    TextNlp,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 5] = [
        RiskCategory::FinancialRatios,
        RiskCategory::Macro,
        RiskCategory::DefaultModel,
        RiskCategory::FraudModel,
        RiskCategory::TextNlp,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::FinancialRatios => "Financial ratios",
            Self::Macro => "Macroeconomic environment",
            Self::DefaultModel => "Default model",
            Self::FraudModel => "Fraud / manipulation model",
            Self::TextNlp => "Text / NLP",
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FinancialRatios => write!(f, "financial_ratios"),
            Self::Macro => write!(f, "macro"),
            Self::DefaultModel => write!(f, "default_model"),
            Self::FraudModel => write!(f, "fraud_model"),
            Self::TextNlp => write!(f, "text_nlp"),
        }
    }
}

/// Ordered: `Ok < Caution < Alert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Ok,
    Caution,
    Alert,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Caution => write!(f, "caution"),
            Self::Alert => write!(f, "alert"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryThresholds {
    pub alert: Decimal,
    pub caution: Decimal,
}

impl CategoryThresholds {
    pub fn classify(&self, total: Decimal) -> Verdict {
        if total > self.alert {
            Verdict::Alert
        } else if total > self.caution {
            Verdict::Caution
        } else {
            Verdict::Ok
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVerdict {
    pub category: RiskCategory,
    pub verdict: Verdict,
    pub total_weight: Weight,
    pub feature_count: usize,
    pub thresholds: CategoryThresholds,
}

// ---------------------------------------------------------------------------
// Routing rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum NameMatch {
    Prefix(&'static str),
    Contains(&'static str),
}

impl NameMatch {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameMatch::Prefix(p) => name.starts_with(p),
            NameMatch::Contains(s) => name.contains(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoutingRule {
    pub matcher: NameMatch,
    pub category: RiskCategory,
}

const fn rule(matcher: NameMatch, category: RiskCategory) -> RoutingRule {
    RoutingRule { matcher, category }
}

/// Evaluated top to bottom; first match wins.
pub const ROUTING_RULES: &[RoutingRule] = &[
    rule(NameMatch::Prefix("F1"), RiskCategory::FinancialRatios),
    rule(NameMatch::Prefix("M_"), RiskCategory::Macro),
    rule(NameMatch::Prefix("F2"), RiskCategory::DefaultModel),
    rule(NameMatch::Prefix("F3"), RiskCategory::DefaultModel),
    rule(NameMatch::Prefix("F4"), RiskCategory::FraudModel),
    rule(NameMatch::Contains("prob"), RiskCategory::TextNlp),
    rule(NameMatch::Contains("lex"), RiskCategory::TextNlp),
];

pub const FALLBACK_CATEGORY: RiskCategory = RiskCategory::TextNlp;

pub fn route(feature_name: &str) -> RiskCategory {
    ROUTING_RULES
        .iter()
        .find(|r| r.matcher.matches(feature_name))
        .map_or(FALLBACK_CATEGORY, |r| r.category)
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Sum weights per category and classify each sum.
///
/// A `None` weight counts as zero. Every category in [`RiskCategory::ALL`]
/// appears in the result, so a category nothing routed to reads as `Ok`.
pub fn aggregate<'a, I>(weights: I, config: &RiskConfig) -> BTreeMap<RiskCategory, CategoryVerdict>
where
    I: IntoIterator<Item = (&'a str, Option<Weight>)>,
{
    let mut totals: BTreeMap<RiskCategory, (Decimal, usize)> = RiskCategory::ALL
        .iter()
        .map(|&c| (c, (Decimal::ZERO, 0)))
        .collect();

    for (name, weight) in weights {
        let entry = totals.entry(route(name)).or_insert((Decimal::ZERO, 0));
        entry.0 += weight.unwrap_or(Decimal::ZERO);
        entry.1 += 1;
    }

    totals
        .into_iter()
        .map(|(category, (total, count))| {
            let thresholds = config.thresholds(category);
            let verdict = CategoryVerdict {
                category,
                verdict: thresholds.classify(total),
                total_weight: total,
                feature_count: count,
                thresholds,
            };
            (category, verdict)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Dashboard lights
// ---------------------------------------------------------------------------

/// The three summary lights of the dashboard header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardLight {
    FinancialMarket,
    TextAnalysis,
    MacroEnvironment,
}

impl DashboardLight {
    pub fn members(&self) -> &'static [RiskCategory] {
        match self {
            Self::FinancialMarket => &[
                RiskCategory::FinancialRatios,
                RiskCategory::DefaultModel,
                RiskCategory::FraudModel,
            ],
            Self::TextAnalysis => &[RiskCategory::TextNlp],
            Self::MacroEnvironment => &[RiskCategory::Macro],
        }
    }
}

/// Each light shows the worst verdict among its member categories.
pub fn dashboard_lights(
    verdicts: &BTreeMap<RiskCategory, CategoryVerdict>,
) -> BTreeMap<DashboardLight, Verdict> {
    [
        DashboardLight::FinancialMarket,
        DashboardLight::TextAnalysis,
        DashboardLight::MacroEnvironment,
    ]
    .into_iter()
    .map(|light| {
        let worst = light
            .members()
            .iter()
            .filter_map(|c| verdicts.get(c).map(|v| v.verdict))
            .max()
            .unwrap_or(Verdict::Ok);
        (light, worst)
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
