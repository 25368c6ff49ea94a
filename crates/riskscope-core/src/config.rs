//! Versioned scoring configuration.
//!
//! One table drives both the aggregator (per-category thresholds) and the
//! normalizer (which features are lower-is-better). The built-in table is
//! [`RiskConfig::default`]; a TOML file with the same shape replaces it.

use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::aggregator::{route, CategoryThresholds, RiskCategory};
use crate::features::{self, Direction, FEATURES};
use crate::{RiskScopeError, RiskScopeResult};

pub const CONFIG_VERSION: &str = "2025.1";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub version: String,
    #[serde(default)]
    pub table: TableSchema,
    pub categories: Vec<CategoryConfig>,
    #[serde(default)]
    pub narrative: NarrativeSettings,
}

/// Per-category verdict thresholds and feature directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub category: RiskCategory,
    /// Summed weight above which the category is in alert.
    pub alert_threshold: Decimal,
    /// Summed weight above which the category is in caution.
    pub caution_threshold: Decimal,
    /// Features of this category whose healthy end is the low end.
    #[serde(default)]
    pub lower_is_better: Vec<String>,
}

/// Column and file names of the three feature tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSchema {
    pub company_file: String,
    pub industry_file: String,
    pub population_file: String,
    pub key_column: String,
    pub name_column: String,
    pub sector_column: String,
    pub label_column: String,
    /// Entity codes are left zero-padded to this width before matching.
    pub identifier_width: usize,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            company_file: "company_features.csv".to_string(),
            industry_file: "industry_features.csv".to_string(),
            population_file: "population_features.csv".to_string(),
            key_column: "stock_code".to_string(),
            name_column: "corp_name".to_string(),
            sector_column: "sector".to_string(),
            label_column: "label".to_string(),
            identifier_width: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeSettings {
    /// Cap on each of the top-risk and top-mitigating factor lists.
    pub top_factor_limit: usize,
    pub model: String,
}

impl Default for NarrativeSettings {
    fn default() -> Self {
        Self {
            top_factor_limit: 5,
            model: "gemini-flash-latest".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_thresholds(category: RiskCategory) -> CategoryThresholds {
    let (alert, caution) = match category {
        RiskCategory::FinancialRatios => (dec!(0.08), dec!(0.02)),
        RiskCategory::Macro => (dec!(0.05), dec!(0.01)),
        RiskCategory::DefaultModel => (dec!(0.06), dec!(0.02)),
        RiskCategory::FraudModel => (dec!(0.04), dec!(0.01)),
        RiskCategory::TextNlp => (dec!(0.08), dec!(0.02)),
    };
    CategoryThresholds { alert, caution }
}

impl Default for RiskConfig {
    fn default() -> Self {
        let categories = RiskCategory::ALL
            .iter()
            .map(|&category| {
                let thresholds = default_thresholds(category);
                let lower_is_better = FEATURES
                    .iter()
                    .filter(|f| f.direction == Direction::LowerIsBetter && route(f.name) == category)
                    .map(|f| f.name.to_string())
                    .collect();
                CategoryConfig {
                    category,
                    alert_threshold: thresholds.alert,
                    caution_threshold: thresholds.caution,
                    lower_is_better,
                }
            })
            .collect();

        Self {
            version: CONFIG_VERSION.to_string(),
            table: TableSchema::default(),
            categories,
            narrative: NarrativeSettings::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and lookups
// ---------------------------------------------------------------------------

impl RiskConfig {
    pub fn from_toml_str(contents: &str) -> RiskScopeResult<Self> {
        let config: RiskConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> RiskScopeResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RiskScopeError::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!(version = %config.version, path = %path.display(), "loaded risk config");
        Ok(config)
    }

    /// Every category exactly once, alert strictly above caution, and
    /// direction overrides only for known features routed to that category.
    pub fn validate(&self) -> RiskScopeResult<()> {
        if self.version.trim().is_empty() {
            return Err(RiskScopeError::Config("version must not be empty".into()));
        }
        for category in RiskCategory::ALL {
            let count = self
                .categories
                .iter()
                .filter(|c| c.category == category)
                .count();
            if count != 1 {
                return Err(RiskScopeError::Config(format!(
                    "category '{}' must be configured exactly once (found {})",
                    category, count
                )));
            }
        }
        for entry in &self.categories {
            if entry.alert_threshold <= entry.caution_threshold {
                return Err(RiskScopeError::Config(format!(
                    "category '{}': alert_threshold ({}) must exceed caution_threshold ({})",
                    entry.category, entry.alert_threshold, entry.caution_threshold
                )));
            }
            for name in &entry.lower_is_better {
                if features::find_feature(name).is_none() {
                    return Err(RiskScopeError::Config(format!(
                        "category '{}': unknown feature '{}'",
                        entry.category, name
                    )));
                }
                if route(name) != entry.category {
                    return Err(RiskScopeError::Config(format!(
                        "feature '{}' is listed under '{}' but routes to '{}'",
                        name,
                        entry.category,
                        route(name)
                    )));
                }
            }
        }
        if self.table.identifier_width == 0 {
            return Err(RiskScopeError::Config(
                "table.identifier_width must be positive".into(),
            ));
        }
        if self.narrative.top_factor_limit == 0 {
            return Err(RiskScopeError::Config(
                "narrative.top_factor_limit must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn thresholds(&self, category: RiskCategory) -> CategoryThresholds {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| CategoryThresholds {
                alert: c.alert_threshold,
                caution: c.caution_threshold,
            })
            .unwrap_or_else(|| default_thresholds(category))
    }

    pub fn direction(&self, feature: &str) -> Direction {
        let lower = self
            .categories
            .iter()
            .any(|c| c.lower_is_better.iter().any(|n| n == feature));
        if lower {
            Direction::LowerIsBetter
        } else {
            Direction::HigherIsBetter
        }
    }

    /// Replace one category's thresholds. Used by callers that tune a
    /// single category without writing a whole TOML file.
    pub fn with_thresholds(
        mut self,
        category: RiskCategory,
        alert: Decimal,
        caution: Decimal,
    ) -> RiskScopeResult<Self> {
        if let Some(entry) = self.categories.iter_mut().find(|c| c.category == category) {
            entry.alert_threshold = alert;
            entry.caution_threshold = caution;
        }
        self.validate()?;
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        RiskConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_directions_follow_catalogue() {
        let config = RiskConfig::default();
        for f in FEATURES {
            assert_eq!(config.direction(f.name), f.direction, "{}", f.name);
        }
    }

    #[test]
    fn test_thresholds_are_per_category() {
        let config = RiskConfig::default();
        let fin = config.thresholds(RiskCategory::FinancialRatios);
        let fraud = config.thresholds(RiskCategory::FraudModel);
        assert_eq!(fin.alert, dec!(0.08));
        assert_eq!(fraud.alert, dec!(0.04));
        assert_ne!(fin, fraud);
    }

    #[test]
    fn test_toml_round_trip_preserves_table() {
        let config = RiskConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed = RiskConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_reject_alert_not_above_caution() {
        let err = RiskConfig::default()
            .with_thresholds(RiskCategory::Macro, dec!(0.01), dec!(0.02))
            .unwrap_err();
        assert!(matches!(err, RiskScopeError::Config(_)));
    }

    #[test]
    fn test_reject_missing_category() {
        let mut config = RiskConfig::default();
        config.categories.retain(|c| c.category != RiskCategory::TextNlp);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_direction_override_in_wrong_category() {
        let mut config = RiskConfig::default();
        config.categories[0]
            .lower_is_better
            .push("M_Exchange_Rate".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_schema_defaults() {
        let text = r#"
            version = "test-1"

            [[categories]]
            category = "financial_ratios"
            alert_threshold = "0.4"
            caution_threshold = "0.1"

            [[categories]]
            category = "macro"
            alert_threshold = "0.05"
            caution_threshold = "0.01"

            [[categories]]
            category = "default_model"
            alert_threshold = "0.06"
            caution_threshold = "0.02"

            [[categories]]
            category = "fraud_model"
            alert_threshold = "0.04"
            caution_threshold = "0.01"
            lower_is_better = ["F4_M_Score"]

            [[categories]]
            category = "text_nlp"
            alert_threshold = "0.08"
            caution_threshold = "0.02"
        "#;
        let config = RiskConfig::from_toml_str(text).unwrap();
        assert_eq!(config.table, TableSchema::default());
        assert_eq!(config.narrative.top_factor_limit, 5);
        assert_eq!(config.direction("F4_M_Score"), Direction::LowerIsBetter);
        // Not listed in this file, so it falls back to higher-is-better.
        assert_eq!(config.direction("F1_Debt_Ratio"), Direction::HigherIsBetter);
        assert_eq!(
            config.thresholds(RiskCategory::FinancialRatios).alert,
            dec!(0.4)
        );
    }
}
