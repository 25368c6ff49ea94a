use proptest::prelude::*;
use riskscope_core::aggregator::{aggregate, RiskCategory, Verdict};
use riskscope_core::config::RiskConfig;
use riskscope_core::features::{Direction, FEATURES};
use riskscope_core::normalizer::{score, ReferenceColumn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn decimal() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..1_000_000i64).prop_map(|n| Decimal::new(n, 3))
}

fn reference() -> impl Strategy<Value = ReferenceColumn> {
    prop::collection::vec(decimal(), 0..40).prop_map(ReferenceColumn::new)
}

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::HigherIsBetter), Just(Direction::LowerIsBetter)]
}

proptest! {
    #[test]
    fn score_stays_in_range(col in reference(), v in decimal(), dir in direction()) {
        let s = score(v, &col, dir);
        prop_assert!(s >= Decimal::ZERO && s <= dec!(100));
    }

    #[test]
    fn higher_is_better_is_monotonic(col in reference(), a in decimal(), b in decimal()) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            score(lo, &col, Direction::HigherIsBetter) <= score(hi, &col, Direction::HigherIsBetter)
        );
    }

    #[test]
    fn lower_is_better_is_monotonic(col in reference(), a in decimal(), b in decimal()) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            score(lo, &col, Direction::LowerIsBetter) >= score(hi, &col, Direction::LowerIsBetter)
        );
    }

    #[test]
    fn zero_variance_is_neutral(x in decimal(), n in 1usize..20, v in decimal(), dir in direction()) {
        let col = ReferenceColumn::new(vec![x; n]);
        prop_assert_eq!(score(v, &col, dir), dec!(50));
    }

    #[test]
    fn aggregation_ignores_order(
        weights in prop::collection::vec(decimal(), FEATURES.len()),
        seed in any::<u64>(),
    ) {
        let config = RiskConfig::default();
        let pairs: Vec<(&str, Option<Decimal>)> = FEATURES
            .iter()
            .zip(&weights)
            .map(|(f, w)| (f.name, Some(*w / dec!(1000))))
            .collect();

        let mut shuffled = pairs.clone();
        // Deterministic rotate-and-reverse permutation driven by the seed.
        let k = (seed as usize) % shuffled.len();
        shuffled.rotate_left(k);
        if seed % 2 == 0 {
            shuffled.reverse();
        }

        prop_assert_eq!(
            aggregate(pairs.iter().copied(), &config),
            aggregate(shuffled.iter().copied(), &config)
        );
    }
}

#[test]
fn empty_category_is_ok() {
    let config = RiskConfig::default();
    let verdicts = aggregate(std::iter::empty(), &config);
    assert_eq!(verdicts.len(), RiskCategory::ALL.len());
    assert!(verdicts.values().all(|v| v.verdict == Verdict::Ok));
    assert!(verdicts.values().all(|v| v.feature_count == 0));
}

#[test]
fn missing_weight_counts_as_zero() {
    let config = RiskConfig::default();
    let verdicts = aggregate(
        [("F1_Debt_Ratio", None), ("F1_ROA", Some(dec!(0.03)))],
        &config,
    );
    let fin = &verdicts[&RiskCategory::FinancialRatios];
    assert_eq!(fin.total_weight, dec!(0.03));
    assert_eq!(fin.verdict, Verdict::Caution);
}
