//! Percentile-based comparison scores.
//!
//! A value's score is the share of the reference population strictly below
//! it, scaled to 0-100. Lower-is-better features are inverted so that a
//! higher score always reads as "healthier than peers".
//!
//! The entity, its industry baseline and the population baseline are all
//! scored against the same reference column, so their scores are directly
//! comparable.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::RiskConfig;
use crate::features::{Direction, FEATURES};
use crate::tables::{parse_numeric, FeatureTable};
use crate::types::Score;

pub const NEUTRAL_SCORE: Score = dec!(50);
const HUNDRED: Decimal = dec!(100);
const SCORE_DP: u32 = 2;

// ---------------------------------------------------------------------------
// Reference distributions
// ---------------------------------------------------------------------------

/// Why a score fell back to [`NEUTRAL_SCORE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degenerate {
    EmptyReference,
    ZeroVariance,
    NonNumeric,
}

/// Sorted observations of one feature across the company population.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceColumn {
    sorted: Vec<Decimal>,
}

impl ReferenceColumn {
    pub fn new(mut values: Vec<Decimal>) -> Self {
        values.sort();
        Self { sorted: values }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Share of observations strictly below `value`, 0-100.
    pub fn percentile_rank(&self, value: Decimal) -> Result<Score, Degenerate> {
        let (first, last) = match (self.sorted.first(), self.sorted.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return Err(Degenerate::EmptyReference),
        };
        if first == last {
            return Err(Degenerate::ZeroVariance);
        }
        let below = self.sorted.partition_point(|x| *x < value);
        let n = Decimal::from(self.sorted.len() as u64);
        Ok((Decimal::from(below as u64) / n * HUNDRED).round_dp(SCORE_DP))
    }
}

/// Reference columns for every canonical feature, built from the company table.
#[derive(Debug, Clone, Default)]
pub struct ReferencePopulation {
    columns: HashMap<&'static str, ReferenceColumn>,
}

impl ReferencePopulation {
    /// Non-numeric cells are not observations and are left out.
    pub fn from_table(table: &FeatureTable) -> Self {
        let columns = FEATURES
            .iter()
            .map(|f| (f.name, ReferenceColumn::new(table.numeric_column(f.name))))
            .collect();
        Self { columns }
    }

    pub fn column(&self, feature: &str) -> Option<&ReferenceColumn> {
        self.columns.get(feature)
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Direction-adjusted percentile score, or the degenerate reason.
pub fn try_score(value: Decimal, reference: &ReferenceColumn, direction: Direction) -> Result<Score, Degenerate> {
    let pct = reference.percentile_rank(value)?;
    Ok(match direction {
        Direction::HigherIsBetter => pct,
        Direction::LowerIsBetter => HUNDRED - pct,
    })
}

/// Like [`try_score`], but every degenerate case reads as neutral.
pub fn score(value: Decimal, reference: &ReferenceColumn, direction: Direction) -> Score {
    try_score(value, reference, direction).unwrap_or(NEUTRAL_SCORE)
}

/// Scores feature values, looking directions up in the active config.
#[derive(Debug, Clone, Copy)]
pub struct ScoringNormalizer<'a> {
    config: &'a RiskConfig,
}

impl<'a> ScoringNormalizer<'a> {
    pub fn new(config: &'a RiskConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, value: Decimal, feature: &str, reference: &ReferenceColumn) -> Score {
        match try_score(value, reference, self.config.direction(feature)) {
            Ok(s) => s,
            Err(reason) => {
                tracing::debug!(feature, ?reason, "neutral score");
                NEUTRAL_SCORE
            }
        }
    }

    /// Score a raw cell as typed by a user. Text that is not a number is
    /// [`Degenerate::NonNumeric`].
    pub fn try_normalize_cell(
        &self,
        cell: &str,
        feature: &str,
        reference: &ReferenceColumn,
    ) -> Result<Score, Degenerate> {
        let value = parse_numeric(cell).ok_or(Degenerate::NonNumeric)?;
        try_score(value, reference, self.config.direction(feature))
    }

    /// Score `value` against the named column of `population`; a feature
    /// with no column scores neutral.
    pub fn normalize_against(
        &self,
        value: Decimal,
        feature: &str,
        population: &ReferencePopulation,
    ) -> Score {
        match population.column(feature) {
            Some(col) => self.normalize(value, feature, col),
            None => NEUTRAL_SCORE,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn column() -> ReferenceColumn {
        ReferenceColumn::new(vec![dec!(4), dec!(1), dec!(3), dec!(2)])
    }

    #[test]
    fn test_percentile_counts_strictly_below() {
        let col = column();
        assert_eq!(col.percentile_rank(dec!(0)), Ok(dec!(0)));
        assert_eq!(col.percentile_rank(dec!(1)), Ok(dec!(0)));
        assert_eq!(col.percentile_rank(dec!(2.5)), Ok(dec!(50)));
        assert_eq!(col.percentile_rank(dec!(4)), Ok(dec!(75)));
        assert_eq!(col.percentile_rank(dec!(10)), Ok(dec!(100)));
    }

    #[test]
    fn test_lower_is_better_is_inverted() {
        let col = column();
        assert_eq!(score(dec!(4), &col, Direction::LowerIsBetter), dec!(25));
        assert_eq!(score(dec!(4), &col, Direction::HigherIsBetter), dec!(75));
    }

    #[test]
    fn test_empty_reference_is_neutral() {
        let col = ReferenceColumn::default();
        assert_eq!(try_score(dec!(1), &col, Direction::HigherIsBetter), Err(Degenerate::EmptyReference));
        assert_eq!(score(dec!(1), &col, Direction::LowerIsBetter), NEUTRAL_SCORE);
    }

    #[test]
    fn test_zero_variance_is_exactly_fifty() {
        let col = ReferenceColumn::new(vec![dec!(7); 5]);
        for v in [dec!(-100), dec!(7), dec!(100)] {
            assert_eq!(score(v, &col, Direction::HigherIsBetter), dec!(50));
            assert_eq!(score(v, &col, Direction::LowerIsBetter), dec!(50));
        }
    }

    #[test]
    fn test_raw_cell_scoring() {
        let config = RiskConfig::default();
        let n = ScoringNormalizer::new(&config);
        assert_eq!(n.try_normalize_cell("N/A", "F1_ROA", &column()), Err(Degenerate::NonNumeric));
        assert_eq!(n.try_normalize_cell(" 3.5 ", "F1_ROA", &column()), Ok(dec!(75)));
        assert_eq!(n.try_normalize_cell("4", "F1_Debt_Ratio", &column()), Ok(dec!(25)));
    }

    #[test]
    fn test_normalizer_uses_config_direction() {
        let config = RiskConfig::default();
        let n = ScoringNormalizer::new(&config);
        // F1_Debt_Ratio is lower-is-better in the default table.
        assert_eq!(n.normalize(dec!(4), "F1_Debt_Ratio", &column()), dec!(25));
        assert_eq!(n.normalize(dec!(4), "F1_ROA", &column()), dec!(75));
    }

    #[test]
    fn test_scores_round_to_two_places() {
        let col = ReferenceColumn::new(vec![dec!(1), dec!(2), dec!(3)]);
        assert_eq!(col.percentile_rank(dec!(2)), Ok(dec!(33.33)));
        assert_eq!(score(dec!(2), &col, Direction::LowerIsBetter), dec!(66.67));
    }

    #[test]
    fn test_reference_population_skips_non_numeric() {
        let table = FeatureTable::from_records(
            &["stock_code", "F1_ROA"],
            &[&["000001", "0.1"], &["000002", "N/A"], &["000003", "0.3"]],
        )
        .unwrap();
        let pop = ReferencePopulation::from_table(&table);
        assert_eq!(pop.column("F1_ROA").unwrap().len(), 2);
        assert!(pop.column("F2_KMV_DD").unwrap().is_empty());
    }
}
