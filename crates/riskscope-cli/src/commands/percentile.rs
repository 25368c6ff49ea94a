use clap::Args;
use serde_json::{json, Value};
use std::time::Instant;

use riskscope_core::config::RiskConfig;
use riskscope_core::features;
use riskscope_core::normalizer::{self, ReferencePopulation, ScoringNormalizer};
use riskscope_core::tables::{FeatureSource, TableKind};
use riskscope_core::{with_metadata, RiskScopeError};

use super::DataArgs;

/// Arguments for a single percentile score
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct PercentileArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Canonical feature name, e.g. F1_Debt_Ratio
    #[arg(long)]
    pub feature: String,

    /// Raw value to place against the company population; text that is
    /// not a number scores neutral
    #[arg(long)]
    pub value: String,
}

pub fn run_percentile(args: PercentileArgs, config: &RiskConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    if features::find_feature(&args.feature).is_none() {
        return Err(RiskScopeError::InvalidInput {
            field: "feature".into(),
            reason: format!("'{}' is not a known feature", args.feature),
        }
        .into());
    }

    let ws = args.data.open(config);
    let table = ws.source.fetch(TableKind::Company)?;
    let population = ReferencePopulation::from_table(&table);
    let direction = config.direction(&args.feature);

    let scorer = ScoringNormalizer::new(config);
    let mut warnings = Vec::new();
    let (score, reference_size) = match population.column(&args.feature) {
        Some(col) => {
            let score = match scorer.try_normalize_cell(&args.value, &args.feature, col) {
                Ok(s) => s,
                Err(reason) => {
                    warnings.push(format!("Degenerate input ({:?}); neutral score", reason));
                    normalizer::NEUTRAL_SCORE
                }
            };
            (score, col.len())
        }
        None => (normalizer::NEUTRAL_SCORE, 0),
    };

    let result = json!({
        "feature": args.feature,
        "value": args.value,
        "direction": direction,
        "score": score,
        "reference_size": reference_size,
    });
    let output = with_metadata(
        "Share of the company population strictly below the value, inverted for lower-is-better features",
        &json!({ "config_version": config.version }),
        warnings,
        start.elapsed().as_micros() as u64,
        result,
    );
    Ok(serde_json::to_value(output)?)
}
