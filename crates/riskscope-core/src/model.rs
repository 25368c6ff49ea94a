//! Classifier interface, bundled logistic artifact, and the prediction engine.
//!
//! The classifier is opaque to the pipeline: anything implementing
//! [`RiskClassifier`] can be plugged in. It is loaded at most once per
//! [`ModelContext`] and shared read-only afterwards.
//!
//! The bundled [`LogisticModel`] is a standardised logistic regression:
//!
//! ```text
//! z_i   = (x_i - mean_i) / scale_i
//! logit = intercept + sum(coef_i * z_i)
//! p     = 1 / (1 + exp(-logit))
//! ```
//!
//! Its contribution for feature i is the log-odds term `coef_i * z_i`
//! rescaled into probability space:
//!
//! ```text
//! w_i = coef_i * z_i * (p - sigmoid(intercept)) / sum(coef_j * z_j)
//! ```
//!
//! The factor is never negative, so signs and ordering survive, and the
//! weights sum to `p - sigmoid(intercept)`: the same units as the category
//! thresholds. When the terms cancel exactly, the slope of the sigmoid at
//! the intercept stands in for the factor.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::features::FEATURES;
use crate::tables::FeatureVector;
use crate::types::{Probability, Weight};
use crate::{RiskScopeError, RiskScopeResult};

// ---------------------------------------------------------------------------
// Classifier interface
// ---------------------------------------------------------------------------

/// A pre-trained default classifier with an additive attribution method.
///
/// Both methods take the feature row in the order of `feature_names()`.
pub trait RiskClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn feature_names(&self) -> &[String];

    /// `[p_negative, p_positive]`; positive is the default class.
    fn predict_probability(&self, row: &[Decimal]) -> RiskScopeResult<[Probability; 2]>;

    /// Signed per-feature weights; positive raises predicted risk.
    fn contributions(&self, row: &[Decimal]) -> RiskScopeResult<Vec<Weight>>;
}

/// Fail unless `names` is exactly the canonical feature order.
pub fn verify_feature_order(names: &[String]) -> RiskScopeResult<()> {
    if names.len() != FEATURES.len() {
        return Err(RiskScopeError::ModelArtifact(format!(
            "model expects {} features, catalogue has {}",
            names.len(),
            FEATURES.len()
        )));
    }
    for (position, (found, expected)) in names.iter().zip(FEATURES.iter()).enumerate() {
        if found != expected.name {
            return Err(RiskScopeError::FeatureOrderMismatch {
                position,
                expected: expected.name.to_string(),
                found: found.clone(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Logistic artifact
// ---------------------------------------------------------------------------

/// Keeps `exp` well inside Decimal range; sigmoid is flat out here anyway.
const LOGIT_CLAMP: Decimal = dec!(40);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub name: String,
    pub version: String,
    pub feature_names: Vec<String>,
    pub intercept: Decimal,
    pub coefficients: Vec<Decimal>,
    pub means: Vec<Decimal>,
    pub scales: Vec<Decimal>,
}

impl LogisticModel {
    pub fn from_json_str(json: &str) -> RiskScopeResult<Self> {
        let model: LogisticModel = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> RiskScopeResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RiskScopeError::ModelArtifact(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> RiskScopeResult<()> {
        let n = self.feature_names.len();
        for (field, len) in [
            ("coefficients", self.coefficients.len()),
            ("means", self.means.len()),
            ("scales", self.scales.len()),
        ] {
            if len != n {
                return Err(RiskScopeError::InvalidInput {
                    field: field.into(),
                    reason: format!("has {} entries, feature_names has {}", len, n),
                });
            }
        }
        if let Some(i) = self.scales.iter().position(|s| *s <= Decimal::ZERO) {
            return Err(RiskScopeError::InvalidInput {
                field: format!("scales[{}]", i),
                reason: "Must be positive".into(),
            });
        }
        verify_feature_order(&self.feature_names)
    }

    fn check_row(&self, row: &[Decimal]) -> RiskScopeResult<()> {
        if row.len() != self.feature_names.len() {
            return Err(RiskScopeError::InvalidInput {
                field: "row".into(),
                reason: format!(
                    "has {} values, model expects {}",
                    row.len(),
                    self.feature_names.len()
                ),
            });
        }
        Ok(())
    }

    /// `coef * (x - mean) / scale` per feature. Values that leave the
    /// Decimal range are an input error, not a panic.
    fn terms(&self, row: &[Decimal]) -> RiskScopeResult<Vec<Decimal>> {
        row.iter()
            .zip(&self.feature_names)
            .zip(self.coefficients.iter().zip(self.means.iter().zip(&self.scales)))
            .map(|((x, name), (coef, (mean, scale)))| {
                x.checked_sub(*mean)
                    .and_then(|d| coef.checked_mul(d))
                    .and_then(|t| t.checked_div(*scale))
                    .ok_or_else(|| out_of_range(name))
            })
            .collect()
    }

    /// Factor taking summed log-odds terms to the probability shift they cause.
    fn probability_scale(&self, total: Decimal) -> RiskScopeResult<Decimal> {
        let base = sigmoid(self.intercept);
        if total.is_zero() {
            return Ok(base * (Decimal::ONE - base));
        }
        let logit = self
            .intercept
            .checked_add(total)
            .ok_or_else(|| out_of_range("logit"))?;
        (sigmoid(logit) - base)
            .checked_div(total)
            .ok_or_else(|| out_of_range("logit"))
    }

    pub fn logit(&self, row: &[Decimal]) -> RiskScopeResult<Decimal> {
        self.check_row(row)?;
        self.terms(row)?
            .into_iter()
            .try_fold(self.intercept, |acc, t| acc.checked_add(t))
            .ok_or_else(|| out_of_range("logit"))
    }
}

fn out_of_range(field: &str) -> RiskScopeError {
    RiskScopeError::InvalidInput {
        field: field.to_string(),
        reason: "value overflows the decimal range".into(),
    }
}

pub fn sigmoid(z: Decimal) -> Decimal {
    let z = z.max(-LOGIT_CLAMP).min(LOGIT_CLAMP);
    Decimal::ONE / (Decimal::ONE + (-z).exp())
}

impl RiskClassifier for LogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_probability(&self, row: &[Decimal]) -> RiskScopeResult<[Probability; 2]> {
        let p = sigmoid(self.logit(row)?);
        Ok([Decimal::ONE - p, p])
    }

    fn contributions(&self, row: &[Decimal]) -> RiskScopeResult<Vec<Weight>> {
        self.check_row(row)?;
        let terms = self.terms(row)?;
        let total = terms
            .iter()
            .try_fold(Decimal::ZERO, |acc, t| acc.checked_add(*t))
            .ok_or_else(|| out_of_range("logit"))?;
        let factor = self.probability_scale(total)?;
        terms
            .iter()
            .zip(&self.feature_names)
            .map(|(t, name)| t.checked_mul(factor).ok_or_else(|| out_of_range(name)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Process-scoped model context
// ---------------------------------------------------------------------------

pub type ModelLoader = Box<dyn Fn() -> RiskScopeResult<Box<dyn RiskClassifier>> + Send + Sync>;

/// Owns the classifier and loads it on first use.
///
/// A failed load is not cached; the next call tries again. A successful
/// load is kept for the lifetime of the context and never reloaded.
pub struct ModelContext {
    loader: ModelLoader,
    cell: OnceCell<Box<dyn RiskClassifier>>,
}

impl ModelContext {
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            loader,
            cell: OnceCell::new(),
        }
    }

    /// Load a [`LogisticModel`] JSON artifact from `path` on first use.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        Self::new(Box::new(move || {
            let model = LogisticModel::load(&path)?;
            tracing::info!(
                model = %model.name,
                version = %model.version,
                path = %path.display(),
                "loaded classifier artifact"
            );
            Ok(Box::new(model) as Box<dyn RiskClassifier>)
        }))
    }

    /// A context whose classifier is already in hand.
    pub fn preloaded(classifier: impl RiskClassifier + 'static) -> Self {
        let classifier: Box<dyn RiskClassifier> = Box::new(classifier);
        Self {
            loader: Box::new(|| {
                Err(RiskScopeError::ModelArtifact(
                    "preloaded context has no loader".into(),
                ))
            }),
            cell: OnceCell::with_value(classifier),
        }
    }

    pub fn classifier(&self) -> RiskScopeResult<&dyn RiskClassifier> {
        if self.cell.get().is_some() {
            tracing::debug!("classifier cache hit");
        }
        self.cell
            .get_or_try_init(|| (self.loader)())
            .map(|c| c.as_ref())
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl std::fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelContext")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Prediction engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub weight: Weight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub model: String,
    /// Positive-class (default) probability, 0-1.
    pub probability: Probability,
    /// Sorted by descending absolute weight.
    pub contributions: Vec<FeatureWeight>,
}

impl Prediction {
    /// `round(probability * 100)`, half away from zero.
    pub fn risk_score(&self) -> u8 {
        (self.probability * dec!(100))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u8()
            .unwrap_or(0)
            .min(100)
    }

    pub fn weight_of(&self, feature: &str) -> Option<Weight> {
        self.contributions
            .iter()
            .find(|c| c.feature == feature)
            .map(|c| c.weight)
    }
}

/// Run the classifier and its decomposition on one vector.
///
/// The vector is already in canonical order; the classifier's own feature
/// order is checked against it before either call.
pub fn score(classifier: &dyn RiskClassifier, vector: &FeatureVector) -> RiskScopeResult<Prediction> {
    verify_feature_order(classifier.feature_names())?;
    let row = vector.as_slice();

    let [_, probability] = classifier.predict_probability(row)?;
    if probability < Decimal::ZERO || probability > Decimal::ONE {
        return Err(RiskScopeError::ModelArtifact(format!(
            "{} returned probability {} outside [0, 1]",
            classifier.name(),
            probability
        )));
    }

    let weights = classifier.contributions(row)?;
    if weights.len() != FEATURES.len() {
        return Err(RiskScopeError::ModelArtifact(format!(
            "{} returned {} contributions for {} features",
            classifier.name(),
            weights.len(),
            FEATURES.len()
        )));
    }

    let mut contributions: Vec<FeatureWeight> = FEATURES
        .iter()
        .zip(weights)
        .map(|(f, weight)| FeatureWeight {
            feature: f.name.to_string(),
            weight,
        })
        .collect();
    contributions.sort_by(|a, b| {
        b.weight
            .abs()
            .cmp(&a.weight.abs())
            .then_with(|| a.feature.cmp(&b.feature))
    });

    tracing::debug!(model = classifier.name(), %probability, "scored feature vector");
    Ok(Prediction {
        model: classifier.name().to_string(),
        probability,
        contributions,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn canonical_names() -> Vec<String> {
        FEATURES.iter().map(|f| f.name.to_string()).collect()
    }

    /// Debt ratio pushes risk up, Z-score pulls it down, everything else is inert.
    fn sample_model() -> LogisticModel {
        let n = FEATURES.len();
        let mut coefficients = vec![Decimal::ZERO; n];
        coefficients[4] = dec!(0.8); // F1_Debt_Ratio
        coefficients[8] = dec!(-0.5); // F3_Z_Score
        LogisticModel {
            name: "sample-logit".into(),
            version: "1".into(),
            feature_names: canonical_names(),
            intercept: dec!(-1.0),
            coefficients,
            means: vec![Decimal::ZERO; n],
            scales: vec![Decimal::ONE; n],
        }
    }

    fn vector_with(values: &[(&str, Decimal)]) -> FeatureVector {
        let mut map = serde_json::Map::new();
        for (k, v) in values {
            map.insert(k.to_string(), serde_json::Value::String(v.to_string()));
        }
        FeatureVector::from_json_map(&map)
    }

    #[test]
    fn test_sigmoid_midpoint_and_bounds() {
        assert_eq!(sigmoid(Decimal::ZERO), dec!(0.5));
        assert!(sigmoid(dec!(1000)) <= Decimal::ONE);
        assert!(sigmoid(dec!(-1000)) >= Decimal::ZERO);
        assert!(sigmoid(dec!(2)) > sigmoid(dec!(1)));
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let model = sample_model();
        let v = vector_with(&[("F1_Debt_Ratio", dec!(2))]);
        let [neg, pos] = model.predict_probability(v.as_slice()).unwrap();
        assert_eq!(neg + pos, Decimal::ONE);
    }

    #[test]
    fn test_contribution_signs_follow_risk_direction() {
        let model = sample_model();
        let v = vector_with(&[("F1_Debt_Ratio", dec!(2)), ("F3_Z_Score", dec!(3))]);
        let pred = score(&model, &v).unwrap();
        let debt = pred.weight_of("F1_Debt_Ratio").unwrap();
        let z = pred.weight_of("F3_Z_Score").unwrap();
        assert!(debt > Decimal::ZERO);
        assert!(z < Decimal::ZERO);
        assert!(debt.abs() > z.abs());
        // log-odds terms 1.6 and -1.5 share one scale factor
        let ratio = debt / z;
        assert!((ratio + dec!(1.6) / dec!(1.5)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_contributions_sum_to_probability_shift() {
        let model = sample_model();
        let v = vector_with(&[("F1_Debt_Ratio", dec!(2)), ("F3_Z_Score", dec!(3))]);
        let total: Decimal = model.contributions(v.as_slice()).unwrap().iter().copied().sum();
        let [_, p] = model.predict_probability(v.as_slice()).unwrap();
        let shift = p - sigmoid(model.intercept);
        assert!((total - shift).abs() < dec!(0.000000001), "{} vs {}", total, shift);
    }

    #[test]
    fn test_contributions_are_probability_sized() {
        let model = sample_model();
        let v = vector_with(&[("F1_Debt_Ratio", dec!(2)), ("F3_Z_Score", dec!(3))]);
        for w in model.contributions(v.as_slice()).unwrap() {
            assert!(w.abs() < Decimal::ONE);
        }
    }

    #[test]
    fn test_cancelling_terms_use_sigmoid_slope() {
        let model = sample_model();
        // 0.8 * 1.875 == 0.5 * 3
        let v = vector_with(&[("F1_Debt_Ratio", dec!(1.875)), ("F3_Z_Score", dec!(3))]);
        let weights = model.contributions(v.as_slice()).unwrap();
        let base = sigmoid(model.intercept);
        let slope = base * (Decimal::ONE - base);
        assert_eq!(weights[4], dec!(1.5) * slope);
        assert_eq!(weights[8], dec!(-1.5) * slope);
    }

    #[test]
    fn test_huge_cell_is_an_error_not_a_panic() {
        let mut model = sample_model();
        model.coefficients[4] = dec!(3);
        let v = vector_with(&[("F1_Debt_Ratio", dec!(50000000000000000000000000000))]);
        let err = score(&model, &v).unwrap_err();
        assert!(matches!(err, RiskScopeError::InvalidInput { ref field, .. } if field == "F1_Debt_Ratio"));
    }

    #[test]
    fn test_tiny_scale_is_an_error_not_a_panic() {
        let mut model = sample_model();
        model.scales[4] = Decimal::new(1, 28);
        model.coefficients[4] = dec!(1000);
        assert!(model.validate().is_ok());
        let v = vector_with(&[("F1_Debt_Ratio", dec!(1000000))]);
        assert!(matches!(
            model.logit(v.as_slice()),
            Err(RiskScopeError::InvalidInput { .. })
        ));
        assert!(score(&model, &v).is_err());
    }

    #[test]
    fn test_contributions_sorted_by_absolute_weight() {
        let model = sample_model();
        let v = vector_with(&[("F1_Debt_Ratio", dec!(1)), ("F3_Z_Score", dec!(3))]);
        let pred = score(&model, &v).unwrap();
        assert_eq!(pred.contributions[0].feature, "F3_Z_Score");
        assert_eq!(pred.contributions[1].feature, "F1_Debt_Ratio");
        for pair in pred.contributions.windows(2) {
            assert!(pair[0].weight.abs() >= pair[1].weight.abs());
        }
    }

    #[test]
    fn test_risk_score_rounds_half_away_from_zero() {
        let pred = Prediction {
            model: "m".into(),
            probability: dec!(0.825),
            contributions: vec![],
        };
        assert_eq!(pred.risk_score(), 83);
        let pred = Prediction {
            probability: dec!(0.8249),
            ..pred
        };
        assert_eq!(pred.risk_score(), 82);
    }

    #[test]
    fn test_reject_reordered_features() {
        let mut model = sample_model();
        model.feature_names.swap(0, 1);
        let err = model.validate().unwrap_err();
        assert!(matches!(
            err,
            RiskScopeError::FeatureOrderMismatch { position: 0, .. }
        ));
    }

    #[test]
    fn test_reject_zero_scale() {
        let mut model = sample_model();
        model.scales[3] = Decimal::ZERO;
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_reject_short_row() {
        let model = sample_model();
        assert!(model.predict_probability(&[Decimal::ONE]).is_err());
    }

    #[test]
    fn test_json_artifact_round_trip() {
        let model = sample_model();
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(LogisticModel::from_json_str(&json).unwrap(), model);
    }

    #[test]
    fn test_context_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ctx = ModelContext::new(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(sample_model()) as Box<dyn RiskClassifier>)
        }));
        assert!(!ctx.is_loaded());
        ctx.classifier().unwrap();
        ctx.classifier().unwrap();
        assert!(ctx.is_loaded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ctx = ModelContext::new(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(RiskScopeError::ModelArtifact("missing".into()))
        }));
        assert!(ctx.classifier().is_err());
        assert!(ctx.classifier().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!ctx.is_loaded());
    }

    #[test]
    fn test_preloaded_context() {
        let ctx = ModelContext::preloaded(sample_model());
        assert!(ctx.is_loaded());
        assert_eq!(ctx.classifier().unwrap().name(), "sample-logit");
    }
}
