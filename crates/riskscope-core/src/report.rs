//! Report assembly: the single entry point of the pipeline.
//!
//! `assemble(entity_id)` resolves the company and its baselines, scores the
//! company with the classifier, benchmarks every feature three ways against
//! the company population, and rolls the attribution weights up into
//! category verdicts.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::aggregator::{self, CategoryVerdict, DashboardLight, RiskCategory, Verdict};
use crate::config::RiskConfig;
use crate::features::{self, Direction, FeatureKind};
use crate::model::{self, ModelContext, Prediction};
use crate::normalizer::{ReferencePopulation, ScoringNormalizer};
use crate::pricing::{self, DateRange, PriceSource};
use crate::tables::{BaselineBasis, FeatureSource, FeatureTableAccess, FeatureVector};
use crate::types::{with_metadata, ComputationOutput, Probability, Score, Warnings, Weight};
use crate::RiskScopeResult;

const BAR_SCALE: Decimal = dec!(500);
const BAR_MAX: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Risk,
    Mitigating,
    Neutral,
}

impl Effect {
    fn of(weight: Weight) -> Self {
        if weight > Decimal::ZERO {
            Effect::Risk
        } else if weight < Decimal::ZERO {
            Effect::Mitigating
        } else {
            Effect::Neutral
        }
    }
}

/// One feature's value, benchmark scores and attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub name: String,
    pub category: RiskCategory,
    pub kind: Option<FeatureKind>,
    pub direction: Direction,
    /// Signed attribution; positive raises risk.
    pub weight: Weight,
    pub effect: Effect,
    pub entity_score: Score,
    pub industry_score: Score,
    pub population_score: Score,
    pub raw_value: Decimal,
    pub industry_value: Decimal,
    pub population_value: Decimal,
    pub description: String,
    /// Attribution bar length for display, 0-100.
    pub bar_width: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub entity_id: String,
    pub company_name: String,
    pub sector: Option<String>,
    /// Latest close; zero when no quote was available.
    pub price: Decimal,
    pub probability: Probability,
    /// `round(probability * 100)`.
    pub risk_score: u8,
    pub model: String,
    pub category_verdicts: BTreeMap<RiskCategory, CategoryVerdict>,
    pub dashboard: BTreeMap<DashboardLight, Verdict>,
    /// Sorted by descending absolute weight.
    pub features: Vec<FeatureContribution>,
    pub industry_basis: BaselineBasis,
    pub population_basis: BaselineBasis,
}

impl RiskReport {
    pub fn verdict(&self, category: RiskCategory) -> Verdict {
        self.category_verdicts
            .get(&category)
            .map_or(Verdict::Ok, |v| v.verdict)
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureContribution> {
        self.features.iter().find(|f| f.name == name)
    }
}

/// The capped factor subsets handed to narrative generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeFactors {
    /// Positive weights, largest first.
    pub top_risk: Vec<FeatureContribution>,
    /// Negative weights, largest magnitude first.
    pub top_mitigating: Vec<FeatureContribution>,
}

pub fn narrative_factors(report: &RiskReport, limit: usize) -> NarrativeFactors {
    let mut top_risk: Vec<FeatureContribution> = report
        .features
        .iter()
        .filter(|f| f.weight > Decimal::ZERO)
        .cloned()
        .collect();
    top_risk.sort_by(|a, b| b.weight.cmp(&a.weight));
    top_risk.truncate(limit);

    let mut top_mitigating: Vec<FeatureContribution> = report
        .features
        .iter()
        .filter(|f| f.weight < Decimal::ZERO)
        .cloned()
        .collect();
    top_mitigating.sort_by(|a, b| b.weight.abs().cmp(&a.weight.abs()));
    top_mitigating.truncate(limit);

    NarrativeFactors {
        top_risk,
        top_mitigating,
    }
}

#[derive(Debug, Serialize)]
struct ReportAssumptions<'a> {
    config_version: &'a str,
    as_of: NaiveDate,
    price_window: DateRange,
    reference_population_size: usize,
    thresholds: Vec<(RiskCategory, Decimal, Decimal)>,
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

pub struct ReportAssembler<'a> {
    models: &'a ModelContext,
    source: &'a dyn FeatureSource,
    prices: &'a dyn PriceSource,
    config: &'a RiskConfig,
    as_of: NaiveDate,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(
        models: &'a ModelContext,
        source: &'a dyn FeatureSource,
        prices: &'a dyn PriceSource,
        config: &'a RiskConfig,
    ) -> Self {
        Self {
            models,
            source,
            prices,
            config,
            as_of: chrono::Local::now().date_naive(),
        }
    }

    /// Pin the price window's end date.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    /// Build the full report for one entity. Only `NotFound` (or an
    /// unusable classifier) ends the query early.
    pub fn assemble(&self, entity_id: &str) -> RiskScopeResult<ComputationOutput<RiskReport>> {
        let start = Instant::now();
        let mut warnings = Warnings::new();

        let resolved = FeatureTableAccess::new(self.source, &self.config.table)
            .resolve(entity_id, &mut warnings)?;

        let classifier = self.models.classifier()?;
        let prediction = model::score(classifier, &resolved.entity)?;

        let reference = ReferencePopulation::from_table(&resolved.company_table);
        let features = benchmark(
            &prediction,
            &resolved.entity,
            &resolved.industry,
            &resolved.population,
            &reference,
            self.config,
        );

        let category_verdicts = aggregator::aggregate(
            prediction
                .contributions
                .iter()
                .map(|c| (c.feature.as_str(), Some(c.weight))),
            self.config,
        );
        let dashboard = aggregator::dashboard_lights(&category_verdicts);

        let window = DateRange::trailing_year(self.as_of);
        let price = pricing::latest_price_or_zero(self.prices, &resolved.entity_id, window, &mut warnings);

        let report = RiskReport {
            risk_score: prediction.risk_score(),
            probability: prediction.probability,
            model: prediction.model.clone(),
            entity_id: resolved.entity_id.clone(),
            company_name: resolved.company_name.clone(),
            sector: resolved.sector.clone(),
            price,
            category_verdicts,
            dashboard,
            features,
            industry_basis: resolved.industry_basis.clone(),
            population_basis: resolved.population_basis.clone(),
        };

        tracing::info!(
            entity_id = %report.entity_id,
            risk_score = report.risk_score,
            warnings = warnings.len(),
            "assembled risk report"
        );

        let assumptions = ReportAssumptions {
            config_version: &self.config.version,
            as_of: self.as_of,
            price_window: window,
            reference_population_size: resolved.company_table.len(),
            thresholds: threshold_table(self.config),
        };

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Logistic default classifier with additive feature attribution; \
             percentile benchmarks against the company population",
            &assumptions,
            warnings.into_vec(),
            elapsed,
            report,
        ))
    }
}

fn threshold_table(config: &RiskConfig) -> Vec<(RiskCategory, Decimal, Decimal)> {
    RiskCategory::ALL
        .iter()
        .map(|&c| {
            let t = config.thresholds(c);
            (c, t.alert, t.caution)
        })
        .collect()
}

/// Score each feature three ways and attach its weight, in the
/// prediction's importance order.
pub fn benchmark(
    prediction: &Prediction,
    entity: &FeatureVector,
    industry: &FeatureVector,
    population: &FeatureVector,
    reference: &ReferencePopulation,
    config: &RiskConfig,
) -> Vec<FeatureContribution> {
    let normalizer = ScoringNormalizer::new(config);
    prediction
        .contributions
        .iter()
        .map(|c| {
            let name = c.feature.as_str();
            let raw = entity.get(name).unwrap_or(Decimal::ZERO);
            let ind = industry.get(name).unwrap_or(Decimal::ZERO);
            let pop = population.get(name).unwrap_or(Decimal::ZERO);
            FeatureContribution {
                name: name.to_string(),
                category: aggregator::route(name),
                kind: features::find_feature(name).map(|f| f.kind),
                direction: config.direction(name),
                weight: c.weight,
                effect: Effect::of(c.weight),
                entity_score: normalizer.normalize_against(raw, name, reference),
                industry_score: normalizer.normalize_against(ind, name, reference),
                population_score: normalizer.normalize_against(pop, name, reference),
                raw_value: raw,
                industry_value: ind,
                population_value: pop,
                description: features::describe(name).to_string(),
                bar_width: c
                    .weight
                    .abs()
                    .checked_mul(BAR_SCALE)
                    .map_or(BAR_MAX, |w| w.min(BAR_MAX)),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Direct vector scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorScore {
    pub probability: Probability,
    pub risk_score: u8,
    pub model: String,
    pub contributions: Vec<model::FeatureWeight>,
    pub category_verdicts: BTreeMap<RiskCategory, CategoryVerdict>,
}

/// Score a feature vector supplied directly, without table lookups or
/// benchmarking.
pub fn score_vector(
    models: &ModelContext,
    vector: &FeatureVector,
    config: &RiskConfig,
) -> RiskScopeResult<ComputationOutput<VectorScore>> {
    let start = Instant::now();
    let prediction = model::score(models.classifier()?, vector)?;
    let category_verdicts = aggregator::aggregate(
        prediction
            .contributions
            .iter()
            .map(|c| (c.feature.as_str(), Some(c.weight))),
        config,
    );
    let result = VectorScore {
        risk_score: prediction.risk_score(),
        probability: prediction.probability,
        model: prediction.model,
        contributions: prediction.contributions,
        category_verdicts,
    };
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Logistic default classifier with additive feature attribution",
        &serde_json::json!({ "config_version": config.version }),
        Vec::new(),
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeatureWeight;
    use pretty_assertions::assert_eq;

    fn contribution(name: &str, weight: Decimal) -> FeatureContribution {
        FeatureContribution {
            name: name.to_string(),
            category: aggregator::route(name),
            kind: features::find_feature(name).map(|f| f.kind),
            direction: Direction::HigherIsBetter,
            weight,
            effect: Effect::of(weight),
            entity_score: dec!(50),
            industry_score: dec!(50),
            population_score: dec!(50),
            raw_value: Decimal::ZERO,
            industry_value: Decimal::ZERO,
            population_value: Decimal::ZERO,
            description: features::describe(name).to_string(),
            bar_width: Decimal::ZERO,
        }
    }

    fn report_with(features: Vec<FeatureContribution>) -> RiskReport {
        RiskReport {
            entity_id: "005930".into(),
            company_name: "Sample".into(),
            sector: None,
            price: Decimal::ZERO,
            probability: dec!(0.5),
            risk_score: 50,
            model: "m".into(),
            category_verdicts: BTreeMap::new(),
            dashboard: BTreeMap::new(),
            features,
            industry_basis: BaselineBasis::NonDefaultSegment,
            population_basis: BaselineBasis::NonDefaultSegment,
        }
    }

    #[test]
    fn test_factor_split_and_ordering() {
        let report = report_with(vec![
            contribution("F1_ROA", dec!(0.02)),
            contribution("F1_Debt_Ratio", dec!(0.156)),
            contribution("F1_Interest_Coverage", dec!(-0.02)),
            contribution("F3_Z_Score", dec!(0.142)),
            contribution("M_Exchange_Rate", dec!(-0.3)),
            contribution("koe_doc_cnt", Decimal::ZERO),
        ]);
        let f = narrative_factors(&report, 5);
        let risk: Vec<&str> = f.top_risk.iter().map(|c| c.name.as_str()).collect();
        let mitigating: Vec<&str> = f.top_mitigating.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(risk, vec!["F1_Debt_Ratio", "F3_Z_Score", "F1_ROA"]);
        assert_eq!(mitigating, vec!["M_Exchange_Rate", "F1_Interest_Coverage"]);
    }

    #[test]
    fn test_factor_lists_are_capped() {
        let features = features::FEATURES
            .iter()
            .enumerate()
            .map(|(i, f)| contribution(f.name, Decimal::from(i as u64 + 1) / dec!(100)))
            .collect();
        let f = narrative_factors(&report_with(features), 5);
        assert_eq!(f.top_risk.len(), 5);
        assert_eq!(f.top_risk[0].name, "koe_doc_cnt");
        assert!(f.top_mitigating.is_empty());
    }

    #[test]
    fn test_bar_width_is_capped() {
        let prediction = Prediction {
            model: "m".into(),
            probability: dec!(0.5),
            contributions: vec![
                FeatureWeight {
                    feature: "F1_Debt_Ratio".into(),
                    weight: dec!(0.5),
                },
                FeatureWeight {
                    feature: "F1_ROA".into(),
                    weight: dec!(-0.1),
                },
            ],
        };
        let v = FeatureVector::zeros();
        let out = benchmark(
            &prediction,
            &v,
            &v,
            &v,
            &ReferencePopulation::default(),
            &RiskConfig::default(),
        );
        assert_eq!(out[0].bar_width, dec!(100));
        assert_eq!(out[1].bar_width, dec!(50));
        assert_eq!(out[1].effect, Effect::Mitigating);
        // No reference column at all: neutral scores.
        assert_eq!(out[0].entity_score, dec!(50));
    }

    #[test]
    fn test_bar_width_saturates_for_extreme_weights() {
        let prediction = Prediction {
            model: "m".into(),
            probability: dec!(0.5),
            contributions: vec![
                FeatureWeight {
                    feature: "F1_Debt_Ratio".into(),
                    weight: Decimal::MAX,
                },
                FeatureWeight {
                    feature: "F3_Z_Score".into(),
                    weight: Decimal::MIN,
                },
            ],
        };
        let v = FeatureVector::zeros();
        let out = benchmark(
            &prediction,
            &v,
            &v,
            &v,
            &ReferencePopulation::default(),
            &RiskConfig::default(),
        );
        assert_eq!(out[0].bar_width, BAR_MAX);
        assert_eq!(out[1].bar_width, BAR_MAX);
        assert_eq!(out[1].effect, Effect::Mitigating);
    }
}
